//! Live preview sessions.
//!
//! A [`PreviewSession`] owns the fetched root, the live channel's current
//! copies of every watched entry ([`LiveSnapshot`]), and the rules needed
//! to turn them into [`PageProps`]. Each update re-runs reconciliation and
//! mapping from scratch; nothing but the snapshot carries over.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn};

use livepage_shared::{
    AppConfig, Entry, EntryId, FieldValue, Locale, LocalizedEntry, PageProps, Result,
};

use crate::graph::watch_list;
use crate::mapper::{MapperConfig, map_entry};
use crate::reconcile::{
    EntryIndex, INDEX_OVERWRITE_POLICY, ReconcileOptions, reconcile_live,
};

/// One push from the live channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveUpdate {
    /// Refreshed copies of watched entries.
    Entries(Vec<Entry>),
    /// Refreshed all-locales copy of the root.
    Localized(LocalizedEntry),
}

// ---------------------------------------------------------------------------
// LiveSnapshot
// ---------------------------------------------------------------------------

/// The live channel's current view of the watched entries.
#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    root: EntryId,
    entries: Vec<Arc<Entry>>,
    shadow: Option<LocalizedEntry>,
}

impl LiveSnapshot {
    /// Start watching `root` and every entry reachable from it.
    pub fn watch(root: &Arc<Entry>, shadow: Option<LocalizedEntry>) -> Self {
        Self {
            root: root.id().clone(),
            entries: watch_list(root),
            shadow,
        }
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn shadow(&self) -> Option<&LocalizedEntry> {
        self.shadow.as_ref()
    }

    /// Patch the snapshot in place. Entries replace watched copies with the
    /// same identity; unknown identities start being watched. Afterwards,
    /// entries the live root no longer reaches stop being watched.
    pub fn apply(&mut self, update: LiveUpdate) {
        match update {
            LiveUpdate::Entries(entries) => {
                for entry in entries {
                    let entry = Arc::new(entry);
                    let mut replaced = false;
                    for slot in self.entries.iter_mut().filter(|slot| slot.id() == entry.id()) {
                        *slot = Arc::clone(&entry);
                        replaced = true;
                    }
                    if !replaced {
                        debug!(id = %entry.id(), "watching newly referenced entry");
                        self.entries.push(entry);
                    }
                }
                self.prune();
            }
            LiveUpdate::Localized(shadow) => match &self.shadow {
                Some(current) if current.id() != shadow.id() => {
                    warn!(
                        expected = %current.id(),
                        got = %shadow.id(),
                        "ignoring all-locales update for another entry"
                    );
                }
                _ => self.shadow = Some(shadow),
            },
        }
    }

    /// Drop watched entries that no live copy references any more, walking
    /// from the live root through the live copy of every entry reached.
    fn prune(&mut self) {
        let index = EntryIndex::build(&self.entries, INDEX_OVERWRITE_POLICY);
        let Some(root) = index.get(&self.root) else {
            return;
        };

        let mut reachable = HashSet::from([self.root.clone()]);
        let mut pending = vec![Arc::clone(root)];
        let mut nested = Vec::new();
        while let Some(entry) = pending.pop() {
            for value in entry.fields.iter().flat_map(|fields| fields.values()) {
                direct_entries(value, &mut nested);
            }
            for child in nested.drain(..) {
                if reachable.insert(child.id().clone()) {
                    let live = index.get(child.id()).map(Arc::clone).unwrap_or(child);
                    pending.push(live);
                }
            }
        }

        let before = self.entries.len();
        self.entries.retain(|entry| reachable.contains(entry.id()));
        if self.entries.len() != before {
            debug!(
                dropped = before - self.entries.len(),
                watched = self.entries.len(),
                "stopped watching unreferenced entries"
            );
        }
    }
}

/// Entries directly inside `value`, looking through lists.
fn direct_entries(value: &FieldValue, out: &mut Vec<Arc<Entry>>) {
    match value {
        FieldValue::Entry(entry) => out.push(Arc::clone(entry)),
        FieldValue::List(items) => {
            for item in items {
                direct_entries(item, out);
            }
        }
        FieldValue::Scalar(_) => {}
    }
}

// ---------------------------------------------------------------------------
// PreviewSession
// ---------------------------------------------------------------------------

/// Everything needed to re-render one previewed entry on every live update.
#[derive(Debug, Clone)]
pub struct PreviewSession {
    root: Arc<Entry>,
    locale: Locale,
    snapshot: LiveSnapshot,
    reconcile: ReconcileOptions,
    mapper: MapperConfig,
}

impl PreviewSession {
    pub fn new(
        root: Entry,
        shadow: Option<LocalizedEntry>,
        locale: Locale,
        config: &AppConfig,
    ) -> Self {
        let root = Arc::new(root);
        let snapshot = LiveSnapshot::watch(&root, shadow);
        debug!(
            root = %root.id(),
            watched = snapshot.entries().len(),
            "preview session started"
        );

        Self {
            root,
            locale,
            snapshot,
            reconcile: ReconcileOptions::from(config),
            mapper: MapperConfig::from(config),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn snapshot(&self) -> &LiveSnapshot {
        &self.snapshot
    }

    pub fn apply(&mut self, update: LiveUpdate) {
        self.snapshot.apply(update);
    }

    /// The reconciled root for the current snapshot.
    pub fn reconciled(&self) -> Result<Arc<Entry>> {
        reconcile_live(
            &self.root,
            self.snapshot.entries(),
            self.snapshot.shadow(),
            self.locale,
            &self.reconcile,
        )
    }

    /// Page props for the current snapshot; `None` if the entry does not
    /// map to a page.
    pub fn render(&self) -> Result<Option<PageProps>> {
        let reconciled = self.reconciled()?;
        Ok(map_entry(&reconciled, &self.mapper))
    }
}

/// Drive a session from a live channel until the channel closes.
///
/// The initial render is published before any update is read; a failing
/// initial render aborts the session. Later failures keep the previous
/// render on `output`.
#[instrument(skip_all, fields(root = %session.root.id(), locale = %session.locale))]
pub async fn run_session(
    mut session: PreviewSession,
    mut updates: mpsc::Receiver<LiveUpdate>,
    output: watch::Sender<Option<PageProps>>,
) -> Result<()> {
    output.send_replace(session.render()?);

    let mut applied = 0usize;
    while let Some(update) = updates.recv().await {
        session.apply(update);
        applied += 1;

        match session.render() {
            Ok(props) => {
                output.send_replace(props);
            }
            Err(e) => {
                warn!(error = %e, "live update could not be reconciled, keeping previous render");
            }
        }
    }

    info!(updates = applied, "live channel closed, preview session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::sections::{LOCALIZED_SECTIONS_FIELD, SECTIONS_FIELD};

    fn heading(id: &str, title: &str) -> Entry {
        Entry::new(id, "spHeadingComponent").with_field("title", title)
    }

    fn page() -> Entry {
        Entry::new("page", "customStaticPage")
            .with_field("urlPath", "/about")
            .with_field(SECTIONS_FIELD, vec![heading("h1", "Hello")])
            .with_field(LOCALIZED_SECTIONS_FIELD, vec![heading("h2", "Hallo")])
    }

    fn first_title(props: &PageProps) -> serde_json::Value {
        props.sections[0]["title"].clone()
    }

    #[test]
    fn snapshot_replaces_by_identity() {
        let root = Arc::new(page());
        let mut snapshot = LiveSnapshot::watch(&root, None);
        assert_eq!(snapshot.entries().len(), 3);

        snapshot.apply(LiveUpdate::Entries(vec![heading("h1", "Hi there")]));
        assert_eq!(snapshot.entries().len(), 3);
        let h1 = snapshot
            .entries()
            .iter()
            .find(|e| e.id().as_str() == "h1")
            .expect("h1");
        assert_eq!(h1.field_str("title"), Some("Hi there"));

        snapshot.apply(LiveUpdate::Entries(vec![heading("h3", "New")]));
        assert_eq!(snapshot.entries().len(), 3);
    }

    fn watched(snapshot: &LiveSnapshot) -> Vec<&str> {
        let mut ids: Vec<_> = snapshot.entries().iter().map(|e| e.id().as_str()).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn snapshot_follows_references() {
        let root = Arc::new(page());
        let mut snapshot = LiveSnapshot::watch(&root, None);

        // the live page now links h3 in place of h1
        let relinked = Entry::new("page", "customStaticPage")
            .with_field("urlPath", "/about")
            .with_field(SECTIONS_FIELD, vec![heading("h3", "New")])
            .with_field(LOCALIZED_SECTIONS_FIELD, vec![heading("h2", "Hallo")]);
        snapshot.apply(LiveUpdate::Entries(vec![relinked, heading("h3", "New, live")]));
        assert_eq!(watched(&snapshot), vec!["h2", "h3", "page"]);

        let h3 = snapshot
            .entries()
            .iter()
            .find(|e| e.id().as_str() == "h3")
            .expect("h3");
        assert_eq!(h3.field_str("title"), Some("New, live"));

        // h1 edits after it was unlinked are dropped again
        snapshot.apply(LiveUpdate::Entries(vec![heading("h1", "Orphan")]));
        assert_eq!(watched(&snapshot), vec!["h2", "h3", "page"]);
    }

    #[test]
    fn long_sessions_do_not_accumulate_entries() {
        let mut session = PreviewSession::new(page(), None, Locale::EnUs, &AppConfig::default());
        for n in 0..100 {
            session.apply(LiveUpdate::Entries(vec![heading(&format!("stray{n}"), "x")]));
        }
        assert_eq!(session.snapshot().entries().len(), 3);
        let props = session.render().expect("render").expect("props");
        assert_eq!(first_title(&props), json!("Hello"));
    }

    #[test]
    fn snapshot_ignores_foreign_shadow() {
        let root = Arc::new(page());
        let shadow = LocalizedEntry::new("page", "customStaticPage");
        let mut snapshot = LiveSnapshot::watch(&root, Some(shadow));

        snapshot.apply(LiveUpdate::Localized(LocalizedEntry::new("other", "x")));
        assert_eq!(snapshot.shadow().map(|s| s.id().as_str()), Some("page"));
    }

    #[test]
    fn session_renders_live_edits() {
        let mut session = PreviewSession::new(page(), None, Locale::EnUs, &AppConfig::default());
        let props = session.render().expect("render").expect("props");
        assert_eq!(first_title(&props), json!("Hello"));

        session.apply(LiveUpdate::Entries(vec![heading("h1", "Edited")]));
        let props = session.render().expect("render").expect("props");
        assert_eq!(first_title(&props), json!("Edited"));
    }

    #[test]
    fn session_applies_locale_fallback() {
        let shadow = LocalizedEntry::new("page", "customStaticPage").with_localized(
            LOCALIZED_SECTIONS_FIELD,
            Locale::DeDe,
            json!([]),
        );
        let session = PreviewSession::new(page(), Some(shadow), Locale::DeDe, &AppConfig::default());
        let props = session.render().expect("render").expect("props");
        assert_eq!(first_title(&props), json!("Hallo"));
    }

    #[test]
    fn live_update_deserializes() {
        let update: LiveUpdate = serde_json::from_value(json!({
            "entries": [{
                "sys": { "id": "h1", "type": "Entry", "contentType": { "sys": { "id": "spHeadingComponent" } } },
                "fields": { "title": "From the wire" }
            }]
        }))
        .expect("deserialize");
        assert!(matches!(update, LiveUpdate::Entries(ref entries) if entries.len() == 1));
    }

    #[tokio::test]
    async fn run_session_publishes_each_update() {
        let session = PreviewSession::new(page(), None, Locale::EnUs, &AppConfig::default());
        let (tx, rx) = mpsc::channel(4);
        let (out_tx, mut out_rx) = watch::channel(None);

        let handle = tokio::spawn(run_session(session, rx, out_tx));

        out_rx.changed().await.expect("initial render");
        let initial = out_rx.borrow_and_update().clone().expect("props");
        assert_eq!(first_title(&initial), json!("Hello"));

        tx.send(LiveUpdate::Entries(vec![heading("h1", "Live")]))
            .await
            .expect("send");
        out_rx.changed().await.expect("update render");
        let updated = out_rx.borrow_and_update().clone().expect("props");
        assert_eq!(first_title(&updated), json!("Live"));

        drop(tx);
        handle.await.expect("join").expect("session");
    }
}
