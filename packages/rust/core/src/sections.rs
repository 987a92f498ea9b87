//! Section normalization: raw section entries → render-ready descriptors.
//!
//! A page entry carries two ordered section lists, `sections` and
//! `bottomSections`. Each element is a linked entry whose content type picks
//! the section variant. Headings get a fixed projection; every other content
//! type passes its fields through untouched so new section types render
//! without code changes here.

use std::collections::BTreeMap;

use serde_json::{Value, json};
use tracing::{debug, trace};

use livepage_shared::{Entry, FieldValue, SectionsConfig};

use crate::transform::{Node, Tree};

/// Logical name of the heading section variant.
pub const HEADING: &str = "Heading";

/// Field names read off page entries.
pub const SECTIONS_FIELD: &str = "sections";
pub const BOTTOM_SECTIONS_FIELD: &str = "bottomSections";
pub const LOCALIZED_SECTIONS_FIELD: &str = "localizedSections";
pub const LOCALIZED_BOTTOM_SECTIONS_FIELD: &str = "localizedBottomSections";

// ---------------------------------------------------------------------------
// SectionAliases
// ---------------------------------------------------------------------------

/// Raw content type id → logical section name.
///
/// Defaults to `spHeadingComponent → Heading`. Unlisted ids are used as the
/// section name verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionAliases(BTreeMap<String, String>);

impl SectionAliases {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self(aliases)
    }

    /// The section name for a raw content type id.
    pub fn resolve<'a>(&'a self, content_type: &'a str) -> &'a str {
        self.0
            .get(content_type)
            .map(String::as_str)
            .unwrap_or(content_type)
    }
}

impl Default for SectionAliases {
    fn default() -> Self {
        Self::from(&SectionsConfig::default())
    }
}

impl From<&SectionsConfig> for SectionAliases {
    fn from(config: &SectionsConfig) -> Self {
        Self(config.aliases.clone())
    }
}

// ---------------------------------------------------------------------------
// SectionDescriptor
// ---------------------------------------------------------------------------

/// Fields projected for a heading. `formatted` is not rendered but kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadingSection {
    pub title: Option<Value>,
    pub subtitle: Option<Value>,
    pub formatted: Option<Value>,
    pub is_frame: Option<Value>,
    pub with_subheadline: Option<Value>,
}

/// Any non-heading section: raw fields plus the common ones.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericSection {
    pub section_name: String,
    pub anchor_element_id: Option<Value>,
    pub name: Option<Value>,
    /// Every raw field of the section entry, by name.
    pub fields: BTreeMap<String, Value>,
}

/// One flattened, render-ready page section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionDescriptor {
    Heading(HeadingSection),
    Generic(GenericSection),
}

impl SectionDescriptor {
    pub fn section_name(&self) -> &str {
        match self {
            SectionDescriptor::Heading(_) => HEADING,
            SectionDescriptor::Generic(section) => &section.section_name,
        }
    }

    /// Render-ready tree keyed by the renderer's field names. Absent fields
    /// come out as [`Node::Undefined`].
    pub fn to_tree(&self) -> Tree {
        match self {
            SectionDescriptor::Heading(heading) => Tree::from([
                ("sectionName".to_string(), Node::Leaf(json!(HEADING))),
                ("title".to_string(), Node::from_optional(heading.title.clone())),
                ("formatted".to_string(), Node::from_optional(heading.formatted.clone())),
                ("isFrame".to_string(), Node::from_optional(heading.is_frame.clone())),
                ("subtitle".to_string(), Node::from_optional(heading.subtitle.clone())),
                (
                    "withSubheadline".to_string(),
                    Node::from_optional(heading.with_subheadline.clone()),
                ),
            ]),
            SectionDescriptor::Generic(section) => {
                let mut tree: Tree = section
                    .fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Node::from_json(value.clone())))
                    .collect();
                tree.insert(
                    "anchorElementId".to_string(),
                    Node::from_optional(section.anchor_element_id.clone()),
                );
                tree.insert("name".to_string(), Node::from_optional(section.name.clone()));
                tree.insert(
                    "sectionName".to_string(),
                    Node::Leaf(json!(section.section_name)),
                );
                tree
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize one section list.
///
/// Returns `None` when the list itself is absent (or not a list). Elements
/// that are not entries, or entries without a field map, are skipped.
pub fn normalize_sections(
    sections: Option<&FieldValue>,
    aliases: &SectionAliases,
) -> Option<Vec<SectionDescriptor>> {
    let Some(items) = sections.and_then(FieldValue::as_list) else {
        trace!("section list absent");
        return None;
    };

    let descriptors: Vec<SectionDescriptor> = items
        .iter()
        .filter_map(|item| {
            let entry = item.as_entry()?;
            normalize_section(entry, aliases)
        })
        .collect();

    if descriptors.len() != items.len() {
        debug!(
            total = items.len(),
            kept = descriptors.len(),
            "skipped non-entry or field-less sections"
        );
    }

    Some(descriptors)
}

/// Normalize a single section entry. `None` if it has no field map.
pub fn normalize_section(entry: &Entry, aliases: &SectionAliases) -> Option<SectionDescriptor> {
    let fields = entry.fields.as_ref()?;
    let section_name = aliases.resolve(entry.content_type());

    let raw = |name: &str| fields.get(name).map(FieldValue::to_json);

    if section_name == HEADING {
        return Some(SectionDescriptor::Heading(HeadingSection {
            title: raw("title"),
            subtitle: raw("subtitle"),
            formatted: raw("formatted"),
            is_frame: raw("isFrame"),
            with_subheadline: raw("withSubheadline"),
        }));
    }

    Some(SectionDescriptor::Generic(GenericSection {
        section_name: section_name.to_string(),
        anchor_element_id: raw("anchorElementId"),
        name: raw("name"),
        fields: fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    }))
}

/// Primary sections followed by bottom sections, each in source order.
pub fn page_sections(page: &Entry, aliases: &SectionAliases) -> Vec<SectionDescriptor> {
    let primary = normalize_sections(page.field(SECTIONS_FIELD), aliases).unwrap_or_default();
    let bottom =
        normalize_sections(page.field(BOTTOM_SECTIONS_FIELD), aliases).unwrap_or_default();

    primary.into_iter().chain(bottom).collect()
}
