//! Page mapping: a reconciled page entry → [`PageProps`].

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use livepage_shared::{AppConfig, Entry, PageMeta, PageProps};

use crate::paths::make_path;
use crate::sections::{SectionAliases, page_sections};
use crate::transform::{Node, Tree, strip_undefined};

const URL_PATH_FIELD: &str = "urlPath";

/// Rules the mapper applies on top of section normalization.
#[derive(Debug, Clone)]
pub struct MapperConfig {
    pub aliases: SectionAliases,
    /// Content type ids recognized as static pages.
    pub static_page_models: Vec<String>,
    /// Reserved path of the home page, which is rendered elsewhere.
    pub home_path: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for MapperConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            aliases: SectionAliases::from(&config.sections),
            static_page_models: config.pages.static_page_models.clone(),
            home_path: config.pages.home_path.clone(),
        }
    }
}

/// Whether `entry`'s content type is one of the static page models.
pub fn is_static_page(entry: &Entry, static_page_models: &[String]) -> bool {
    static_page_models
        .iter()
        .any(|model| model == entry.content_type())
}

/// Map a page entry to render-ready props.
///
/// Returns `None` for entries that are not static pages, that have no
/// `urlPath`, or that live at the home path.
#[instrument(skip_all, fields(id = %entry.id(), content_type = entry.content_type()))]
pub fn map_entry(entry: &Entry, config: &MapperConfig) -> Option<PageProps> {
    if !is_static_page(entry, &config.static_page_models) {
        debug!("not a static page, skipping");
        return None;
    }

    let url_path = entry
        .field_str(URL_PATH_FIELD)
        .filter(|path| !path.is_empty() && *path != config.home_path);
    let Some(url_path) = url_path else {
        debug!("home or path-less page, skipping");
        return None;
    };

    let sections: Vec<Node> = page_sections(entry, &config.aliases)
        .iter()
        .map(|section| Node::Tree(section.to_tree()))
        .collect();
    let query = Tree::from([("sections".to_string(), Node::List(sections))]);

    let sections = match strip_undefined(&query).remove("sections") {
        Some(Node::List(items)) => items.into_iter().filter_map(section_map).collect(),
        _ => Vec::new(),
    };

    Some(PageProps {
        sections,
        meta: page_meta(entry, url_path),
    })
}

fn section_map(node: Node) -> Option<Map<String, Value>> {
    match node.into_json() {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn page_meta(entry: &Entry, url_path: &str) -> PageMeta {
    let text = |name: &str| entry.field_str(name).map(String::from);

    PageMeta {
        path: make_path(&[url_path]),
        title: text("title"),
        description: text("description"),
        keywords: text("keywords"),
        canonical: text("canonical"),
        robots: robots_directive(
            entry.field_bool("noIndex").unwrap_or(false),
            entry.field_bool("noFollow").unwrap_or(false),
        ),
    }
}

/// `index, follow` with either half negated.
pub fn robots_directive(no_index: bool, no_follow: bool) -> String {
    let index = if no_index { "noindex" } else { "index" };
    let follow = if no_follow { "nofollow" } else { "follow" };
    format!("{index}, {follow}")
}
