//! Live preview reconciliation.
//!
//! The live channel hands back refreshed copies of every watched entry, but
//! each copy still points at the *stale* versions of its children. This
//! module indexes the live copies by identity, applies the locale fallback
//! for translated section lists, and rebuilds the root so every level of the
//! tree is the live version.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use livepage_shared::{
    AppConfig, Entry, EntryId, FieldValue, Fields, LivePageError, Locale, LocalizedEntry, Result,
};

use crate::mapper::is_static_page;
use crate::sections::{
    BOTTOM_SECTIONS_FIELD, LOCALIZED_BOTTOM_SECTIONS_FIELD, LOCALIZED_SECTIONS_FIELD,
    SECTIONS_FIELD,
};

// ---------------------------------------------------------------------------
// Identity index
// ---------------------------------------------------------------------------

/// What to do when two live entries share an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    LastWriteWins,
    FirstWriteWins,
}

/// The live channel is the source of truth for current state, so the latest
/// copy of an identity replaces earlier ones.
pub const INDEX_OVERWRITE_POLICY: OverwritePolicy = OverwritePolicy::LastWriteWins;

/// Live entries keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    entries: HashMap<EntryId, Arc<Entry>>,
}

impl EntryIndex {
    pub fn build<'a>(
        live: impl IntoIterator<Item = &'a Arc<Entry>>,
        policy: OverwritePolicy,
    ) -> Self {
        let mut entries: HashMap<EntryId, Arc<Entry>> = HashMap::new();
        for entry in live {
            match policy {
                OverwritePolicy::LastWriteWins => {
                    entries.insert(entry.id().clone(), Arc::clone(entry));
                }
                OverwritePolicy::FirstWriteWins => {
                    entries
                        .entry(entry.id().clone())
                        .or_insert_with(|| Arc::clone(entry));
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, id: &EntryId) -> Option<&Arc<Entry>> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn replace(&mut self, entry: Arc<Entry>) {
        self.entries.insert(entry.id().clone(), entry);
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings for [`reconcile_live`].
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Roots of these content types get the locale fallback.
    pub static_page_models: Vec<String>,
    /// Deepest entry nesting rebuilt before giving up.
    pub max_depth: usize,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ReconcileOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            static_page_models: config.pages.static_page_models.clone(),
            max_depth: config.live.max_depth,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Produce the fully live, locale-resolved version of `root`.
///
/// `live` holds the live channel's current copies of the watched entries
/// (root included); `shadow` is the live all-locales copy of the root.
/// Entries missing from `live` are kept as found in their parent.
///
/// Fails with [`LivePageError::CycleDetected`] when an entry references one
/// of its ancestors, and [`LivePageError::DepthExceeded`] past
/// `options.max_depth` levels.
#[instrument(skip_all, fields(root = %root.id(), locale = %locale, live = live.len()))]
pub fn reconcile_live(
    root: &Arc<Entry>,
    live: &[Arc<Entry>],
    shadow: Option<&LocalizedEntry>,
    locale: Locale,
    options: &ReconcileOptions,
) -> Result<Arc<Entry>> {
    let mut index = EntryIndex::build(live, INDEX_OVERWRITE_POLICY);

    let mut live_root = match index.get(root.id()) {
        Some(entry) => Arc::clone(entry),
        None => {
            debug!("root missing from live snapshot, using fetched root");
            Arc::clone(root)
        }
    };

    if let Some(shadow) = shadow {
        if shadow.id() != root.id() {
            warn!(shadow = %shadow.id(), "all-locales entry does not match root, ignoring it");
        } else if is_static_page(&live_root, &options.static_page_models) {
            if let Some(patched) = apply_locale_fallback(&live_root, shadow, locale) {
                live_root = Arc::new(patched);
                index.replace(Arc::clone(&live_root));
            }
        }
    }

    let mut rebuilder = Rebuilder {
        index: &index,
        max_depth: options.max_depth,
        ancestors: Vec::new(),
        done: HashMap::new(),
    };
    let rebuilt = rebuilder.rebuild(&live_root)?;
    debug!(rebuilt = rebuilder.done.len(), "live tree rebuilt");
    Ok(rebuilt.entry)
}

/// Swap in the localized section lists when the shadow says the active
/// locale has its own version. Returns `None` when nothing changes.
///
/// The lists are replaced wholesale: a translator-authored list overrides
/// the default list entirely for that locale.
pub fn apply_locale_fallback(
    entry: &Entry,
    shadow: &LocalizedEntry,
    locale: Locale,
) -> Option<Entry> {
    let has_sections = shadow
        .localized_value(LOCALIZED_SECTIONS_FIELD, locale)
        .is_some();
    let has_bottom = shadow
        .localized_value(LOCALIZED_BOTTOM_SECTIONS_FIELD, locale)
        .is_some();

    if !has_sections && !has_bottom {
        return None;
    }

    let mut patched = entry.clone();

    if has_sections {
        let localized = entry
            .field(LOCALIZED_SECTIONS_FIELD)
            .cloned()
            .unwrap_or_else(|| FieldValue::List(Vec::new()));
        patched.fields_mut().insert(SECTIONS_FIELD.to_string(), localized);
        debug!("using localized sections");
    }

    if has_bottom {
        match entry.field(LOCALIZED_BOTTOM_SECTIONS_FIELD).cloned() {
            Some(localized) => {
                patched
                    .fields_mut()
                    .insert(BOTTOM_SECTIONS_FIELD.to_string(), localized);
            }
            None => {
                patched.fields_mut().remove(BOTTOM_SECTIONS_FIELD);
            }
        }
        debug!("using localized bottom sections");
    }

    Some(patched)
}

/// Key of a finished rebuild. Indexed entries are shared by identity;
/// inline copies of unindexed entries only by allocation, since two parents
/// may carry different stale copies under one id.
#[derive(Debug, PartialEq, Eq, Hash)]
enum RebuildKey {
    Indexed(EntryId),
    Inline(*const Entry),
}

/// A rebuilt entry and the number of entry levels in its subtree.
#[derive(Debug, Clone)]
struct Rebuilt {
    entry: Arc<Entry>,
    height: usize,
}

/// One rebuild pass. Each entry is rebuilt once per pass and every parent
/// reaching it shares the same `Arc`, so shared sub-entries stay shared.
struct Rebuilder<'a> {
    index: &'a EntryIndex,
    max_depth: usize,
    ancestors: Vec<EntryId>,
    done: HashMap<RebuildKey, Rebuilt>,
}

impl Rebuilder<'_> {
    /// Rebuild the live copy of `entry`, or `entry` itself when the index
    /// has no live copy.
    fn rebuild(&mut self, entry: &Arc<Entry>) -> Result<Rebuilt> {
        let index = self.index;
        let (entry, key) = match index.get(entry.id()) {
            Some(live) => (live, RebuildKey::Indexed(live.id().clone())),
            None => (entry, RebuildKey::Inline(Arc::as_ptr(entry))),
        };

        if self.ancestors.contains(entry.id()) {
            return Err(LivePageError::CycleDetected {
                id: entry.id().to_string(),
            });
        }
        let depth = self.ancestors.len();
        if let Some(done) = self.done.get(&key) {
            // the deepest level of the shared subtree, seen from here
            if depth + done.height > self.max_depth {
                return Err(LivePageError::DepthExceeded {
                    limit: self.max_depth,
                });
            }
            return Ok(done.clone());
        }
        if depth >= self.max_depth {
            return Err(LivePageError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        let rebuilt = match &entry.fields {
            None => Rebuilt {
                entry: Arc::clone(entry),
                height: 1,
            },
            Some(fields) => {
                self.ancestors.push(entry.id().clone());
                let mut height = 0;
                let rebuilt = fields
                    .iter()
                    .map(|(name, value)| -> Result<(String, FieldValue)> {
                        let (value, below) = self.rebuild_value(value)?;
                        height = height.max(below);
                        Ok((name.clone(), value))
                    })
                    .collect::<Result<Fields>>();
                self.ancestors.pop();

                Rebuilt {
                    entry: Arc::new(Entry {
                        sys: entry.sys.clone(),
                        fields: Some(rebuilt?),
                    }),
                    height: height + 1,
                }
            }
        };

        self.done.insert(key, rebuilt.clone());
        Ok(rebuilt)
    }

    /// Rebuilt value plus the entry levels below it.
    fn rebuild_value(&mut self, value: &FieldValue) -> Result<(FieldValue, usize)> {
        match value {
            FieldValue::Entry(nested) => {
                let rebuilt = self.rebuild(nested)?;
                Ok((FieldValue::Entry(rebuilt.entry), rebuilt.height))
            }
            FieldValue::List(items) => {
                let mut height = 0;
                let items = items
                    .iter()
                    .map(|item| -> Result<FieldValue> {
                        let (item, below) = self.rebuild_value(item)?;
                        height = height.max(below);
                        Ok(item)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((FieldValue::List(items), height))
            }
            FieldValue::Scalar(_) => Ok((value.clone(), 0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::graph::watch_list;

    fn title_of(entry: &Entry, path: &[&str]) -> Option<String> {
        let mut current = entry.clone();
        for name in path {
            current = (**current.field(name)?.as_entry()?).clone();
        }
        current.field_str("title").map(String::from)
    }

    fn replace(live: &mut [Arc<Entry>], entry: Entry) {
        for slot in live.iter_mut() {
            if slot.id() == entry.id() {
                *slot = Arc::new(entry.clone());
            }
        }
    }

    fn page() -> Arc<Entry> {
        let grandchild = Entry::new("gc", "link").with_field("title", "old");
        let child = Entry::new("child", "card")
            .with_field("title", "child")
            .with_field("cta", grandchild);
        Arc::new(
            Entry::new("root", "customStaticPage")
                .with_field("urlPath", "/about")
                .with_field("hero", child)
                .with_field(SECTIONS_FIELD, vec![Entry::new("default", "spHeadingComponent")])
                .with_field(
                    LOCALIZED_SECTIONS_FIELD,
                    vec![Entry::new("localized", "spHeadingComponent")],
                ),
        )
    }

    fn section_ids(entry: &Entry, field: &str) -> Vec<String> {
        entry
            .field(field)
            .and_then(FieldValue::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(FieldValue::as_entry)
                    .map(|e| e.id().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn overwrite_policy_is_last_write_wins() {
        assert_eq!(INDEX_OVERWRITE_POLICY, OverwritePolicy::LastWriteWins);

        let first = Arc::new(Entry::new("a", "x").with_field("title", "first"));
        let second = Arc::new(Entry::new("a", "x").with_field("title", "second"));
        let live = [first, second];

        let last = EntryIndex::build(&live, OverwritePolicy::LastWriteWins);
        assert_eq!(last.len(), 1);
        assert_eq!(last.get(&"a".into()).and_then(|e| e.field_str("title")), Some("second"));

        let first = EntryIndex::build(&live, OverwritePolicy::FirstWriteWins);
        assert_eq!(first.get(&"a".into()).and_then(|e| e.field_str("title")), Some("first"));
    }

    #[test]
    fn deep_live_update_is_visible_from_root() {
        let root = page();
        let mut live = watch_list(&root);
        replace(&mut live, Entry::new("gc", "link").with_field("title", "new"));

        let reconciled =
            reconcile_live(&root, &live, None, Locale::EnUs, &ReconcileOptions::default())
                .expect("reconcile");
        assert_eq!(title_of(&reconciled, &["hero", "cta"]).as_deref(), Some("new"));
        assert_eq!(title_of(&reconciled, &["hero"]).as_deref(), Some("child"));
    }

    #[test]
    fn root_live_copy_wins() {
        let root = page();
        let mut live = watch_list(&root);
        let edited = (*root).clone().with_field("title", "Edited");
        replace(&mut live, edited);

        let reconciled =
            reconcile_live(&root, &live, None, Locale::EnUs, &ReconcileOptions::default())
                .expect("reconcile");
        assert_eq!(reconciled.field_str("title"), Some("Edited"));
    }

    #[test]
    fn localized_sections_override_for_active_locale() {
        let root = page();
        let live = watch_list(&root);
        let shadow = LocalizedEntry::new("root", "customStaticPage").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::DeDe,
            json!([{ "sys": { "type": "Link", "linkType": "Entry", "id": "localized" } }]),
        );

        let options = ReconcileOptions::default();
        let german = reconcile_live(&root, &live, Some(&shadow), Locale::DeDe, &options)
            .expect("reconcile");
        assert_eq!(section_ids(&german, SECTIONS_FIELD), vec!["localized"]);

        let french = reconcile_live(&root, &live, Some(&shadow), Locale::Fr, &options)
            .expect("reconcile");
        assert_eq!(section_ids(&french, SECTIONS_FIELD), vec!["default"]);
    }

    #[test]
    fn localized_override_sees_live_copies() {
        let root = page();
        let mut live = watch_list(&root);
        replace(
            &mut live,
            Entry::new("localized", "spHeadingComponent").with_field("title", "Hallo"),
        );
        let shadow = LocalizedEntry::new("root", "customStaticPage").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::DeDe,
            json!([]),
        );

        let reconciled = reconcile_live(
            &root,
            &live,
            Some(&shadow),
            Locale::DeDe,
            &ReconcileOptions::default(),
        )
        .expect("reconcile");
        let sections = reconciled.field(SECTIONS_FIELD).and_then(FieldValue::as_list).expect("list");
        assert_eq!(sections[0].as_entry().and_then(|e| e.field_str("title")), Some("Hallo"));
    }

    #[test]
    fn localized_bottom_sections_are_independent() {
        let root = Arc::new(
            (*page())
                .clone()
                .with_field(BOTTOM_SECTIONS_FIELD, vec![Entry::new("bottom", "x")]),
        );
        let live = watch_list(&root);
        let shadow = LocalizedEntry::new("root", "customStaticPage").with_localized(
            LOCALIZED_BOTTOM_SECTIONS_FIELD,
            Locale::JaJp,
            json!([]),
        );

        let reconciled = reconcile_live(
            &root,
            &live,
            Some(&shadow),
            Locale::JaJp,
            &ReconcileOptions::default(),
        )
        .expect("reconcile");
        // no localizedBottomSections on the entry itself: bottom list is cleared
        assert!(reconciled.field(BOTTOM_SECTIONS_FIELD).is_none());
        assert_eq!(section_ids(&reconciled, SECTIONS_FIELD), vec!["default"]);
    }

    #[test]
    fn missing_localized_list_falls_back_to_empty() {
        let root = Arc::new(
            Entry::new("root", "customStaticPage")
                .with_field(SECTIONS_FIELD, vec![Entry::new("default", "x")]),
        );
        let shadow = LocalizedEntry::new("root", "customStaticPage").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::Zh,
            json!([]),
        );

        let patched = apply_locale_fallback(&root, &shadow, Locale::Zh).expect("patched");
        assert_eq!(section_ids(&patched, SECTIONS_FIELD), Vec::<String>::new());
        assert!(apply_locale_fallback(&root, &shadow, Locale::EnUs).is_none());
    }

    #[test]
    fn fallback_only_applies_to_static_pages() {
        let root = Arc::new(
            Entry::new("root", "blogPost")
                .with_field(SECTIONS_FIELD, vec![Entry::new("default", "x")]),
        );
        let shadow = LocalizedEntry::new("root", "blogPost").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::DeDe,
            json!([]),
        );

        let reconciled = reconcile_live(
            &root,
            &watch_list(&root),
            Some(&shadow),
            Locale::DeDe,
            &ReconcileOptions::default(),
        )
        .expect("reconcile");
        assert_eq!(section_ids(&reconciled, SECTIONS_FIELD), vec!["default"]);
    }

    #[test]
    fn mismatched_shadow_is_ignored() {
        let root = page();
        let shadow = LocalizedEntry::new("someone-else", "customStaticPage").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::DeDe,
            json!([]),
        );
        let reconciled = reconcile_live(
            &root,
            &watch_list(&root),
            Some(&shadow),
            Locale::DeDe,
            &ReconcileOptions::default(),
        )
        .expect("reconcile");
        assert_eq!(section_ids(&reconciled, SECTIONS_FIELD), vec!["default"]);
    }

    #[test]
    fn root_missing_from_live_uses_fetched_root() {
        let root = page();
        let reconciled =
            reconcile_live(&root, &[], None, Locale::EnUs, &ReconcileOptions::default())
                .expect("reconcile");
        assert_eq!(title_of(&reconciled, &["hero", "cta"]).as_deref(), Some("old"));
    }

    #[test]
    fn cycles_are_reported() {
        let root = Arc::new(
            Entry::new("root", "customStaticPage").with_field("child", Entry::new("child", "x")),
        );
        // the live child now points back at the root
        let looping = Arc::new(
            Entry::new("child", "x").with_field("parent", Entry::new("root", "customStaticPage")),
        );
        let live = vec![Arc::clone(&root), looping];

        let err = reconcile_live(&root, &live, None, Locale::EnUs, &ReconcileOptions::default())
            .expect_err("cycle");
        assert!(matches!(err, LivePageError::CycleDetected { id } if id == "root"));
    }

    #[test]
    fn depth_is_bounded() {
        let mut entry = Entry::new("e0", "x");
        for level in 1..=5 {
            entry = Entry::new(format!("e{level}"), "x").with_field("next", entry);
        }
        let root = Arc::new(entry);
        let options = ReconcileOptions {
            max_depth: 3,
            ..ReconcileOptions::default()
        };

        let err = reconcile_live(&root, &watch_list(&root), None, Locale::EnUs, &options)
            .expect_err("too deep");
        assert!(matches!(err, LivePageError::DepthExceeded { limit: 3 }));
    }

    #[test]
    fn shared_children_are_not_cycles() {
        let shared = Arc::new(Entry::new("shared", "x").with_field("title", "s"));
        let root = Arc::new(
            Entry::new("root", "customStaticPage")
                .with_field("a", Arc::clone(&shared))
                .with_field("b", vec![FieldValue::from(Arc::clone(&shared))]),
        );
        let reconciled = reconcile_live(
            &root,
            &watch_list(&root),
            None,
            Locale::EnUs,
            &ReconcileOptions::default(),
        );
        assert!(reconciled.is_ok());
    }

    fn diamond(levels: usize) -> Arc<Entry> {
        let mut entry = Arc::new(Entry::new("e0", "x").with_field("title", "bottom"));
        for level in 1..=levels {
            entry = Arc::new(
                Entry::new(format!("e{level}"), "x")
                    .with_field("left", Arc::clone(&entry))
                    .with_field("right", Arc::clone(&entry)),
            );
        }
        entry
    }

    #[test]
    fn shared_entries_are_rebuilt_once() {
        let root = diamond(30);
        let mut live = watch_list(&root);
        assert_eq!(live.len(), 31);
        replace(&mut live, Entry::new("e0", "x").with_field("title", "live"));

        let reconciled =
            reconcile_live(&root, &live, None, Locale::EnUs, &ReconcileOptions::default())
                .expect("reconcile");

        let left = reconciled.field("left").and_then(FieldValue::as_entry).expect("left");
        let right = reconciled.field("right").and_then(FieldValue::as_entry).expect("right");
        assert!(Arc::ptr_eq(left, right));

        let mut bottom = Arc::clone(&reconciled);
        for _ in 0..30 {
            let next = Arc::clone(bottom.field("right").and_then(FieldValue::as_entry).expect("next"));
            bottom = next;
        }
        assert_eq!(bottom.id().as_str(), "e0");
        assert_eq!(bottom.field_str("title"), Some("live"));
    }

    #[test]
    fn unindexed_shared_entries_are_rebuilt_once() {
        let root = diamond(30);
        let reconciled =
            reconcile_live(&root, &[], None, Locale::EnUs, &ReconcileOptions::default())
                .expect("reconcile");

        let left = reconciled.field("left").and_then(FieldValue::as_entry).expect("left");
        let right = reconciled.field("right").and_then(FieldValue::as_entry).expect("right");
        assert!(Arc::ptr_eq(left, right));
    }

    #[test]
    fn shared_entry_depth_counts_every_path() {
        // "a_short" reaches the shared entry first; "b_long" reaches it two
        // levels deeper
        let shared = Arc::new(
            Entry::new("shared", "x").with_field("child", Entry::new("leaf", "x")),
        );
        let long = Entry::new("m1", "x").with_field(
            "next",
            Entry::new("m2", "x").with_field("next", Arc::clone(&shared)),
        );
        let root = Arc::new(
            Entry::new("root", "x")
                .with_field("a_short", Arc::clone(&shared))
                .with_field("b_long", long),
        );
        let live = watch_list(&root);

        let tight = ReconcileOptions {
            max_depth: 4,
            ..ReconcileOptions::default()
        };
        let err = reconcile_live(&root, &live, None, Locale::EnUs, &tight).expect_err("too deep");
        assert!(matches!(err, LivePageError::DepthExceeded { limit: 4 }));

        let enough = ReconcileOptions {
            max_depth: 5,
            ..ReconcileOptions::default()
        };
        assert!(reconcile_live(&root, &live, None, Locale::EnUs, &enough).is_ok());
    }
}
