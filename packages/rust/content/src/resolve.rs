//! Link resolution for entry collections.
//!
//! The entries endpoint returns linked entries as bare links
//! (`{ "sys": { "type": "Link", "linkType": "Entry", "id": ... } }`) plus a
//! side table of the linked records under `includes.Entry`. This module
//! builds the nested entry graph from both, converting each linked record
//! once so every parent linking it shares the same `Arc<Entry>`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use livepage_shared::{Entry, EntryId, EntrySys, FieldValue, Fields, LivePageError, Result};

/// Response body of the entries endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryCollection {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub includes: Includes,
}

/// Side-loaded linked records.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default, rename = "Entry")]
    pub entries: Vec<Value>,
}

impl EntryCollection {
    /// The item with `id` as an entry graph, with every resolvable entry
    /// link replaced by the linked entry.
    pub fn resolve(&self, id: &EntryId) -> Result<Entry> {
        let records = self.lookup();
        let root = records
            .get(id.as_str())
            .copied()
            .ok_or_else(|| LivePageError::not_found(id.as_str()))?;

        let mut resolver = Resolver {
            records,
            done: HashMap::new(),
            ancestors: vec![id.as_str()],
        };
        let entry = resolver
            .entry(root)
            .ok_or_else(|| LivePageError::parse(format!("item {id} is not an entry record")))?;

        debug!(linked = resolver.done.len(), "entry links resolved");
        Ok(entry)
    }

    /// The raw item with `id`, links untouched.
    pub fn item(&self, id: &EntryId) -> Result<&Value> {
        self.items
            .iter()
            .find(|item| record_id(item) == Some(id.as_str()))
            .ok_or_else(|| LivePageError::not_found(id.as_str()))
    }

    fn lookup(&self) -> HashMap<&str, &Value> {
        self.includes
            .entries
            .iter()
            .chain(self.items.iter())
            .filter_map(|record| Some((record_id(record)?, record)))
            .collect()
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.pointer("/sys/id")?.as_str()
}

/// The target id if `value` is a link to an entry.
fn entry_link(value: &Value) -> Option<&str> {
    let sys = value.get("sys")?;
    if sys.get("type")?.as_str()? != "Link" || sys.get("linkType")?.as_str()? != "Entry" {
        return None;
    }
    sys.get("id")?.as_str()
}

/// Converts records to entries, one `Arc` per linked id.
///
/// Links that are unresolvable, or that point back at an entry still being
/// converted, stay scalar links. A linked entry on a reference cycle is
/// therefore cut where the cycle first closed, for every parent sharing it.
struct Resolver<'a> {
    records: HashMap<&'a str, &'a Value>,
    done: HashMap<&'a str, Arc<Entry>>,
    ancestors: Vec<&'a str>,
}

impl<'a> Resolver<'a> {
    fn entry(&mut self, record: &'a Value) -> Option<Entry> {
        let sys = EntrySys::from_json(record)?;
        let fields = record
            .get("fields")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(name, value)| (name.clone(), self.value(value)))
                    .collect::<Fields>()
            });
        Some(Entry { sys, fields })
    }

    fn value(&mut self, value: &'a Value) -> FieldValue {
        if let Some(target) = entry_link(value) {
            return self
                .linked(target)
                .map(FieldValue::Entry)
                .unwrap_or_else(|| FieldValue::Scalar(value.clone()));
        }
        if let Some(entry) = self.entry(value) {
            return FieldValue::Entry(Arc::new(entry));
        }
        match value {
            Value::Array(items) => {
                FieldValue::List(items.iter().map(|item| self.value(item)).collect())
            }
            other => FieldValue::Scalar(other.clone()),
        }
    }

    fn linked(&mut self, target: &str) -> Option<Arc<Entry>> {
        if let Some(entry) = self.done.get(target) {
            return Some(Arc::clone(entry));
        }
        let Some((&id, &record)) = self.records.get_key_value(target) else {
            trace!(id = target, "link target not included");
            return None;
        };
        if self.ancestors.contains(&id) {
            trace!(id, "link back to ancestor left unresolved");
            return None;
        }

        self.ancestors.push(id);
        let entry = self.entry(record).map(Arc::new);
        self.ancestors.pop();

        let entry = entry?;
        self.done.insert(id, Arc::clone(&entry));
        Some(entry)
    }
}
