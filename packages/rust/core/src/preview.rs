//! Preview request context.
//!
//! A preview is opened from a link the content store generates for editors,
//! carrying the entry, environment and locale being edited. All three are
//! required; anything missing is rejected before any fetch happens.

use url::Url;
use url::form_urlencoded;

use livepage_shared::{EntryId, LivePageError, Locale, Result};

/// Validated context for one preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub entry_id: EntryId,
    pub environment: String,
    pub locale: Locale,
}

impl PreviewRequest {
    /// Build from optional parts; blank values count as missing.
    pub fn from_parts(
        entry_id: Option<&str>,
        environment: Option<&str>,
        locale: Option<&str>,
    ) -> Result<Self> {
        let locale = required(locale, "locale")?.parse::<Locale>()?;
        let environment = required(environment, "env_id")?;
        let entry_id = required(entry_id, "entry_id")?;

        Ok(Self {
            entry_id: EntryId::from(entry_id),
            environment: environment.to_string(),
            locale,
        })
    }

    /// Read the context from a preview link's query string.
    ///
    /// Accepts both the store's parameter names (`entry_id`, `env_id`) and
    /// the preview page's own (`entryId`, `environment`). Repeated
    /// parameters keep their first value.
    pub fn from_url(url: &Url) -> Result<Self> {
        let entry_id = first_param(url, &["entry_id", "entryId"]);
        let environment = first_param(url, &["env_id", "environment"]);
        let locale = first_param(url, &["locale"]);

        Self::from_parts(entry_id.as_deref(), environment.as_deref(), locale.as_deref())
    }

    /// Path of the preview page for this request.
    pub fn preview_path(&self) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("locale", self.locale.code())
            .append_pair("environment", &self.environment)
            .append_pair("entryId", self.entry_id.as_str())
            .finish();
        format!("/preview?{query}")
    }
}

fn first_param(url: &Url, names: &[&str]) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| names.contains(&&**key))
        .map(|(_, value)| value.into_owned())
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LivePageError::validation(format!("{name} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store_link() {
        let url = Url::parse(
            "https://site.example/api/contentful-preview?entry_id=abc&env_id=staging&locale=de-DE&access_token=x",
        )
        .unwrap();
        let request = PreviewRequest::from_url(&url).expect("request");
        assert_eq!(request.entry_id.as_str(), "abc");
        assert_eq!(request.environment, "staging");
        assert_eq!(request.locale, Locale::DeDe);
    }

    #[test]
    fn first_value_wins() {
        let url = Url::parse("https://x/?entryId=one&entryId=two&environment=master&locale=fr")
            .unwrap();
        let request = PreviewRequest::from_url(&url).expect("request");
        assert_eq!(request.entry_id.as_str(), "one");
    }

    #[test]
    fn missing_context_is_rejected() {
        let url = Url::parse("https://x/?entry_id=abc&env_id=master").unwrap();
        let err = PreviewRequest::from_url(&url).unwrap_err();
        assert_eq!(err.to_string(), "validation error: locale is required");

        let err = PreviewRequest::from_parts(Some("abc"), Some("  "), Some("en-US")).unwrap_err();
        assert!(err.to_string().contains("env_id is required"));

        let err = PreviewRequest::from_parts(None, Some("master"), Some("en-US")).unwrap_err();
        assert!(err.to_string().contains("entry_id is required"));
    }

    #[test]
    fn unsupported_locale_is_rejected() {
        let err = PreviewRequest::from_parts(Some("abc"), Some("master"), Some("pt-BR"))
            .unwrap_err();
        assert!(matches!(err, LivePageError::Validation { .. }));
    }

    #[test]
    fn preview_path_roundtrips() {
        let request = PreviewRequest::from_parts(Some("a b"), Some("master"), Some("ja-JP"))
            .expect("request");
        let path = request.preview_path();
        assert_eq!(path, "/preview?locale=ja-JP&environment=master&entryId=a+b");

        let url = Url::parse(&format!("https://site.example{path}")).unwrap();
        assert_eq!(PreviewRequest::from_url(&url).expect("request"), request);
    }
}
