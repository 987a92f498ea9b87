//! Content store client.
//!
//! Fetches entries from a Contentful-style entries endpoint, either the
//! delivery API (published content) or the preview API (drafts). Linked
//! entries are resolved so callers receive one nested [`Entry`] graph, with
//! an entry linked from several parents shared between them.
//!
//! Preview needs the same entry twice: once in the active locale and once
//! with every locale (`locale=*`) to see which fields carry translations.
//! [`ContentClient::fetch_preview_pair`] issues both requests concurrently.

mod resolve;

use std::time::Duration;

use livepage_shared::{
    ContentfulConfig, Entry, EntryId, LivePageError, Locale, LocaleQuery, LocalizedEntry, Result,
    resolve_token,
};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, instrument};

pub use resolve::{EntryCollection, Includes};

/// User-Agent string for content requests.
const USER_AGENT: &str = concat!("livepage/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ApiMode
// ---------------------------------------------------------------------------

/// Which API the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiMode {
    /// Published content only.
    Delivery,
    /// Drafts and unpublished changes.
    Preview,
}

// ---------------------------------------------------------------------------
// ContentClient
// ---------------------------------------------------------------------------

/// Client for one space/environment of the content store.
#[derive(Debug, Clone)]
pub struct ContentClient {
    http: Client,
    base_url: String,
    space_id: String,
    environment: String,
    token: String,
    include_depth: u8,
}

impl ContentClient {
    /// Build a client, reading the access token from the environment
    /// variable named in `config`.
    pub fn new(config: &ContentfulConfig, environment: &str, mode: ApiMode) -> Result<Self> {
        let token = resolve_token(config, mode == ApiMode::Preview)?;
        Self::with_token(config, environment, mode, token)
    }

    /// Build a client with an explicit access token.
    pub fn with_token(
        config: &ContentfulConfig,
        environment: &str,
        mode: ApiMode,
        token: impl Into<String>,
    ) -> Result<Self> {
        if config.space_id.is_empty() {
            return Err(LivePageError::config(
                "contentful.space_id is not set in the config file",
            ));
        }
        if environment.is_empty() {
            return Err(LivePageError::validation("environment is required"));
        }

        let base_url = match mode {
            ApiMode::Delivery => &config.host,
            ApiMode::Preview => &config.preview_host,
        };

        Ok(Self {
            http: build_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            space_id: config.space_id.clone(),
            environment: environment.to_string(),
            token: token.into(),
            include_depth: config.include_depth,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Fetch one entry in `locale`, with linked entries resolved.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub async fn get_entry(&self, id: &EntryId, locale: Locale) -> Result<Entry> {
        let collection = self
            .fetch_collection(id, LocaleQuery::Single(locale), self.include_depth)
            .await?;
        let entry = collection.resolve(id)?;

        debug!(
            content_type = entry.content_type(),
            includes = collection.includes.entries.len(),
            "entry fetched"
        );
        Ok(entry)
    }

    /// Fetch one entry with every locale's field values.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub async fn get_localized_entry(&self, id: &EntryId) -> Result<LocalizedEntry> {
        let collection = self.fetch_collection(id, LocaleQuery::All, 0).await?;
        let item = collection.item(id)?;

        LocalizedEntry::from_json(item)
            .ok_or_else(|| LivePageError::parse(format!("item {id} is not an entry record")))
    }

    /// Fetch the entry in `locale` and its all-locales copy concurrently.
    /// Either request failing fails the pair.
    #[instrument(skip(self), fields(environment = %self.environment))]
    pub async fn fetch_preview_pair(
        &self,
        id: &EntryId,
        locale: Locale,
    ) -> Result<(Entry, LocalizedEntry)> {
        let (entry, localized) =
            tokio::try_join!(self.get_entry(id, locale), self.get_localized_entry(id))?;

        info!(
            content_type = entry.content_type(),
            "preview entry and all-locales copy fetched"
        );
        Ok((entry, localized))
    }

    fn entries_url(&self) -> String {
        format!(
            "{}/spaces/{}/environments/{}/entries",
            self.base_url, self.space_id, self.environment
        )
    }

    async fn fetch_collection(
        &self,
        id: &EntryId,
        locale: LocaleQuery,
        include: u8,
    ) -> Result<EntryCollection> {
        let url = self.entries_url();
        let include = include.to_string();

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("sys.id", id.as_str()),
                ("locale", locale.as_param()),
                ("include", include.as_str()),
            ])
            .send()
            .await
            .map_err(|e| LivePageError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LivePageError::not_found(id.as_str()));
        }
        if !status.is_success() {
            return Err(LivePageError::Network(format!("{url}: HTTP {status}")));
        }

        let collection: EntryCollection = response
            .json()
            .await
            .map_err(|e| LivePageError::parse(format!("{url}: invalid entries payload: {e}")))?;

        if collection.items.is_empty() {
            return Err(LivePageError::not_found(id.as_str()));
        }
        Ok(collection)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LivePageError::Network(format!("failed to build HTTP client: {e}")))
}
