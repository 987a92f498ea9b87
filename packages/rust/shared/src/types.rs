//! Content model types for entries fetched from the content store, plus the
//! render-ready page output.
//!
//! Entries arrive as loosely-typed JSON (`{ sys, fields }`). Field values are
//! classified once, at the boundary, into the tagged [`FieldValue`] union so
//! the rest of the pipeline never sniffs JSON shapes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

use crate::error::LivePageError;

/// `sys.type` marker carried by every entry.
pub const ENTRY_TYPE: &str = "Entry";

// ---------------------------------------------------------------------------
// Locale
// ---------------------------------------------------------------------------

/// Locales supported by the content space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    #[serde(rename = "en-US")]
    EnUs,
    #[serde(rename = "de-DE")]
    DeDe,
    #[serde(rename = "fr")]
    Fr,
    #[serde(rename = "zh")]
    Zh,
    #[serde(rename = "es-ES")]
    EsEs,
    #[serde(rename = "ja-JP")]
    JaJp,
}

impl Locale {
    /// Every supported locale, default locale first.
    pub const ALL: [Locale; 6] = [
        Locale::EnUs,
        Locale::DeDe,
        Locale::Fr,
        Locale::Zh,
        Locale::EsEs,
        Locale::JaJp,
    ];

    /// The locale code as used by the content store.
    pub fn code(self) -> &'static str {
        match self {
            Locale::EnUs => "en-US",
            Locale::DeDe => "de-DE",
            Locale::Fr => "fr",
            Locale::Zh => "zh",
            Locale::EsEs => "es-ES",
            Locale::JaJp => "ja-JP",
        }
    }
}

impl std::fmt::Display for Locale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Locale {
    type Err = LivePageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Locale::ALL
            .into_iter()
            .find(|locale| locale.code() == s)
            .ok_or_else(|| LivePageError::validation(format!("unsupported locale '{s}'")))
    }
}

/// Locale selector for a fetch: one locale, or every locale at once (`*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleQuery {
    Single(Locale),
    All,
}

impl LocaleQuery {
    /// Value of the `locale` query parameter.
    pub fn as_param(self) -> &'static str {
        match self {
            LocaleQuery::Single(locale) => locale.code(),
            LocaleQuery::All => "*",
        }
    }
}

// ---------------------------------------------------------------------------
// EntryId
// ---------------------------------------------------------------------------

/// Identity of an entry. Stable across default-locale, all-locales and live copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// EntrySys
// ---------------------------------------------------------------------------

/// The `sys` block of an entry, reduced to what the pipeline reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EntrySys {
    pub id: EntryId,
    /// `sys.contentType.sys.id`.
    pub content_type: String,
    /// Locale the fields were resolved in (absent for all-locales fetches).
    pub locale: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EntrySys {
    pub fn new(id: impl Into<EntryId>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            locale: None,
            updated_at: None,
        }
    }

    /// Read `sys` from a JSON record. Returns `None` unless the record is
    /// marked `sys.type == "Entry"` and carries an id and a content type.
    pub fn from_json(record: &Value) -> Option<Self> {
        let sys = record.get("sys")?;
        if sys.get("type")?.as_str()? != ENTRY_TYPE {
            return None;
        }

        let id = sys.get("id")?.as_str()?;
        let content_type = sys.pointer("/contentType/sys/id")?.as_str()?;
        let locale = sys.get("locale").and_then(Value::as_str).map(String::from);
        let updated_at = sys
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Some(Self {
            id: EntryId::from(id),
            content_type: content_type.to_string(),
            locale,
            updated_at,
        })
    }

    pub fn to_json(&self) -> Value {
        let mut sys = json!({
            "id": self.id.as_str(),
            "type": ENTRY_TYPE,
            "contentType": {
                "sys": { "type": "Link", "linkType": "ContentType", "id": self.content_type }
            },
        });
        if let Some(locale) = &self.locale {
            sys["locale"] = json!(locale);
        }
        if let Some(updated_at) = &self.updated_at {
            sys["updatedAt"] = json!(updated_at.to_rfc3339_opts(SecondsFormat::Millis, true));
        }
        sys
    }
}

// ---------------------------------------------------------------------------
// Entry / FieldValue
// ---------------------------------------------------------------------------

/// Field name → value map of an entry.
pub type Fields = BTreeMap<String, FieldValue>;

/// A content record: identity, content type and (optionally) fields.
///
/// Entries are shared by reference; two parents may point at the same
/// `Arc<Entry>`. Identity, not structure, is what makes two entries "the same".
#[derive(Debug, Clone)]
pub struct Entry {
    pub sys: EntrySys,
    /// `None` when the store returned the entry without a field map
    /// (e.g. unpublished or filtered by `select`).
    pub fields: Option<Fields>,
}

/// A field value, classified by variant rather than by shape.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Any JSON value that is neither an entry nor an array.
    Scalar(Value),
    /// A nested entry.
    Entry(Arc<Entry>),
    /// An ordered sequence; elements may mix entries and scalars.
    List(Vec<FieldValue>),
}

impl Entry {
    /// New entry with an empty field map.
    pub fn new(id: impl Into<EntryId>, content_type: impl Into<String>) -> Self {
        Self {
            sys: EntrySys::new(id, content_type),
            fields: Some(Fields::new()),
        }
    }

    /// New entry with no field map at all.
    pub fn without_fields(id: impl Into<EntryId>, content_type: impl Into<String>) -> Self {
        Self {
            sys: EntrySys::new(id, content_type),
            fields: None,
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields_mut().insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &EntryId {
        &self.sys.id
    }

    pub fn content_type(&self) -> &str {
        &self.sys.content_type
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.as_ref()?.get(name)
    }

    /// String value of a scalar field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name)?.as_str()
    }

    /// Boolean value of a scalar field.
    pub fn field_bool(&self, name: &str) -> Option<bool> {
        self.field(name)?.as_bool()
    }

    /// Mutable field map, created empty if the entry had none.
    pub fn fields_mut(&mut self) -> &mut Fields {
        self.fields.get_or_insert_with(Fields::new)
    }

    /// Classify a JSON record as an entry. Returns `None` for anything that
    /// is not marked `sys.type == "Entry"` (links, assets, scalars).
    pub fn from_json(record: &Value) -> Option<Self> {
        let sys = EntrySys::from_json(record)?;
        let fields = record.get("fields").and_then(Value::as_object).map(|map| {
            map.iter()
                .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
                .collect()
        });
        Some(Self { sys, fields })
    }

    pub fn to_json(&self) -> Value {
        let mut record = Map::new();
        record.insert("sys".into(), self.sys.to_json());
        if let Some(fields) = &self.fields {
            let fields: Map<String, Value> = fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect();
            record.insert("fields".into(), Value::Object(fields));
        }
        Value::Object(record)
    }
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        if let Some(entry) = Entry::from_json(value) {
            return FieldValue::Entry(Arc::new(entry));
        }
        match value {
            Value::Array(items) => FieldValue::List(items.iter().map(FieldValue::from_json).collect()),
            other => FieldValue::Scalar(other.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Scalar(value) => value.clone(),
            FieldValue::Entry(entry) => entry.to_json(),
            FieldValue::List(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
        }
    }

    pub fn as_entry(&self) -> Option<&Arc<Entry>> {
        match self {
            FieldValue::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Scalar(value) => value.as_bool(),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Scalar(Value::String(s.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Scalar(Value::String(s))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Scalar(Value::Bool(b))
    }
}

impl From<Entry> for FieldValue {
    fn from(entry: Entry) -> Self {
        FieldValue::Entry(Arc::new(entry))
    }
}

impl From<Arc<Entry>> for FieldValue {
    fn from(entry: Arc<Entry>) -> Self {
        FieldValue::Entry(entry)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(items: Vec<FieldValue>) -> Self {
        FieldValue::List(items)
    }
}

impl From<Vec<Entry>> for FieldValue {
    fn from(entries: Vec<Entry>) -> Self {
        FieldValue::List(entries.into_iter().map(FieldValue::from).collect())
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Entry::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a record with sys.type \"Entry\""))
    }
}

// ---------------------------------------------------------------------------
// LocalizedEntry
// ---------------------------------------------------------------------------

/// An entry fetched with `locale=*`: every field maps locale code → value.
///
/// Values are kept as raw JSON; the shadow is only consulted for which
/// locales carry a value, never rendered.
#[derive(Debug, Clone)]
pub struct LocalizedEntry {
    pub sys: EntrySys,
    pub fields: BTreeMap<String, BTreeMap<String, Value>>,
}

impl LocalizedEntry {
    pub fn new(id: impl Into<EntryId>, content_type: impl Into<String>) -> Self {
        Self {
            sys: EntrySys::new(id, content_type),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style setter for one locale of one field.
    pub fn with_localized(
        mut self,
        field: impl Into<String>,
        locale: Locale,
        value: Value,
    ) -> Self {
        self.fields
            .entry(field.into())
            .or_default()
            .insert(locale.code().to_string(), value);
        self
    }

    pub fn id(&self) -> &EntryId {
        &self.sys.id
    }

    /// The value of `field` for `locale`, treating JSON `null` as absent.
    pub fn localized_value(&self, field: &str, locale: Locale) -> Option<&Value> {
        self.fields
            .get(field)?
            .get(locale.code())
            .filter(|value| !value.is_null())
    }

    pub fn from_json(record: &Value) -> Option<Self> {
        let sys = EntrySys::from_json(record)?;
        let fields = record
            .get("fields")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(name, per_locale)| {
                        let per_locale = per_locale.as_object()?;
                        let values = per_locale
                            .iter()
                            .map(|(code, value)| (code.clone(), value.clone()))
                            .collect();
                        Some((name.clone(), values))
                    })
                    .collect()
            })
            .unwrap_or_default();
        Some(Self { sys, fields })
    }

    pub fn to_json(&self) -> Value {
        json!({ "sys": self.sys.to_json(), "fields": self.fields })
    }
}

impl Serialize for LocalizedEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for LocalizedEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        LocalizedEntry::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a record with sys.type \"Entry\""))
    }
}

// ---------------------------------------------------------------------------
// PageProps
// ---------------------------------------------------------------------------

/// Page-level metadata carried alongside the section list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Normalized page path (leading and trailing slash).
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// Robots directives, e.g. `index, follow`.
    pub robots: String,
}

/// Final render-ready output for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageProps {
    /// Section descriptors in render order, undefined fields removed.
    pub sections: Vec<Map<String, Value>>,
    #[serde(flatten)]
    pub meta: PageMeta,
}
