//! Entry graph extraction: every entry reachable from a root.
//!
//! The live channel is subscribed per entry, so preview needs the full set
//! of entries a page pulls in, however deeply nested.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument};

use livepage_shared::{Entry, EntryId, FieldValue};

/// Collect every entry nested in `entry`'s fields, at any depth.
///
/// Entries are returned in depth-first pre-order, each identity once (first
/// occurrence wins). `entry` itself is not included. Revisited identities
/// are not descended into again, so the walk terminates on cyclic graphs.
#[instrument(skip_all, fields(root = %entry.id()))]
pub fn extract_graph(entry: &Entry) -> Vec<Arc<Entry>> {
    let mut seen = HashSet::from([entry.id().clone()]);
    let mut found = Vec::new();
    collect_fields(entry, &mut seen, &mut found);

    debug!(entries = found.len(), "entry graph extracted");
    found
}

/// The root followed by everything [`extract_graph`] finds under it.
pub fn watch_list(root: &Arc<Entry>) -> Vec<Arc<Entry>> {
    let mut entries = vec![Arc::clone(root)];
    entries.extend(extract_graph(root));
    entries
}

fn collect_fields(entry: &Entry, seen: &mut HashSet<EntryId>, found: &mut Vec<Arc<Entry>>) {
    let Some(fields) = &entry.fields else {
        return;
    };
    for value in fields.values() {
        collect_value(value, seen, found);
    }
}

fn collect_value(value: &FieldValue, seen: &mut HashSet<EntryId>, found: &mut Vec<Arc<Entry>>) {
    match value {
        FieldValue::Entry(nested) => {
            if seen.insert(nested.id().clone()) {
                found.push(Arc::clone(nested));
                collect_fields(nested, seen, found);
            }
        }
        FieldValue::List(items) => {
            for item in items {
                collect_value(item, seen, found);
            }
        }
        FieldValue::Scalar(_) => {}
    }
}
