//! The external item store: a black-box reference manager addressed by opaque item keys.
//!
//! The rest of the crate only depends on the [`ItemStore`] trait and its three operations. The
//! [`CitationLinker`] implementation talks to a Zotero instance through the Citation Linker
//! connector plugin, which listens on `localhost:23119` by default.
//!
//! Every failure surfaces as [`ReftrackError::ExternalService`], which callers treat as a
//! recoverable per-item (or per-repair) error.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use super::*;
use crate::config::ServiceConfig;

/// Longest slice of an error response body kept in error messages.
const ERROR_BODY_LIMIT: usize = 100;

/// Metadata the external store holds for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
  /// The item's key
  pub key:       ItemKey,
  /// Item title
  #[serde(default)]
  pub title:     Option<String>,
  /// URL the item was created from
  #[serde(default)]
  pub url:       Option<String>,
  /// Publication date as the store reports it
  #[serde(default)]
  pub date:      Option<String>,
  /// Rendered in-text citation
  #[serde(default)]
  pub citation:  Option<String>,
  /// Item type (webpage, journalArticle, ...)
  #[serde(default, rename = "itemType")]
  pub item_type: Option<String>,
  /// Any other fields the store returned
  #[serde(flatten)]
  pub extra:     Map<String, Value>,
}

/// Operations the core needs from the external reference manager.
#[async_trait]
pub trait ItemStore: Send + Sync {
  /// Creates an item from a DOI, ISBN or URL and returns its key.
  async fn create_item(&self, identifier_or_url: &str) -> Result<ItemKey>;

  /// Deletes an item.
  async fn delete_item(&self, key: &ItemKey) -> Result<()>;

  /// Fetches an item's metadata.
  async fn get_item_metadata(&self, key: &ItemKey) -> Result<ItemMetadata>;
}

/// HTTP client for the Citation Linker connector.
///
/// Server errors (5xx) are retried up to `max_retries` times with a fixed delay; everything else
/// fails immediately.
///
/// # Examples
///
/// ```no_run
/// use reftrack::{config::ServiceConfig, prelude::*, store::CitationLinker};
///
/// # async fn example() -> Result<(), ReftrackError> {
/// let linker = CitationLinker::from_config(&ServiceConfig::default())?;
/// let key = linker.create_item("https://arxiv.org/abs/1706.03762").await?;
/// let metadata = linker.get_item_metadata(&key).await?;
/// println!("{:?}", metadata.title);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CitationLinker {
  /// Shared HTTP client with the request timeout applied
  client:      Client,
  /// Base URL, always ending in `/`
  base_url:    url::Url,
  /// Retries for 5xx responses
  max_retries: u32,
  /// Pause between retries
  retry_delay: Duration,
}

impl CitationLinker {
  /// Builds a client from the `[service]` configuration section.
  pub fn from_config(config: &ServiceConfig) -> Result<Self> {
    let mut base = config.base_url.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url = url::Url::parse(&base)?;
    let client = Client::builder().timeout(config.timeout()).build()?;
    Ok(Self { client, base_url, max_retries: config.max_retries, retry_delay: config.retry_delay() })
  }

  /// Full URL of a connector endpoint.
  fn endpoint(&self, name: &str) -> Result<url::Url> { Ok(self.base_url.join(name)?) }

  /// Posts `body` to `endpoint`, retrying server errors.
  async fn post(&self, endpoint: &str, body: &Value) -> Result<reqwest::Response> {
    let url = self.endpoint(endpoint)?;
    let mut attempt = 0;
    loop {
      trace!(%url, attempt, "Posting to item store");
      let response =
        self.client.post(url.clone()).json(body).send().await.map_err(|e| self.describe(e))?;
      let status = response.status();
      if status.is_success() {
        return Ok(response);
      }
      if status.is_server_error() && attempt < self.max_retries {
        attempt += 1;
        warn!(%url, %status, attempt, "Item store server error, retrying");
        tokio::time::sleep(self.retry_delay).await;
        continue;
      }
      if status == StatusCode::NOT_FOUND {
        return Err(ReftrackError::ExternalService("Item not found (404)".to_string()));
      }
      let text = response.text().await.unwrap_or_default();
      let text: String = text.chars().take(ERROR_BODY_LIMIT).collect();
      return Err(ReftrackError::ExternalService(format!("HTTP {}: {text}", status.as_u16())));
    }
  }

  /// Posts and decodes a JSON response.
  async fn post_json<T: DeserializeOwned>(&self, endpoint: &str, body: &Value) -> Result<T> {
    let response = self.post(endpoint, body).await?;
    response
      .json::<T>()
      .await
      .map_err(|e| ReftrackError::ExternalService(format!("Invalid JSON response: {e}")))
  }

  /// Turns transport failures into operator-facing messages.
  fn describe(&self, error: reqwest::Error) -> ReftrackError {
    let message = if error.is_timeout() {
      "Request timed out".to_string()
    } else if error.is_connect() {
      format!("Connection error - is the service running at {}?", self.base_url)
    } else {
      format!("Unexpected error: {error}")
    };
    ReftrackError::ExternalService(message)
  }
}

/// Response of the create endpoint; older connector versions answer with `key`.
#[derive(Debug, Deserialize)]
struct CreatedItem {
  /// Key of the created item
  #[serde(alias = "key")]
  #[serde(rename = "itemKey")]
  item_key: String,
}

#[async_trait]
impl ItemStore for CitationLinker {
  async fn create_item(&self, identifier_or_url: &str) -> Result<ItemKey> {
    let created: CreatedItem =
      self.post_json("processurl", &json!({ "url": identifier_or_url })).await?;
    if created.item_key.trim().is_empty() {
      return Err(ReftrackError::ExternalService("Item store returned an empty key".to_string()));
    }
    debug!(url = identifier_or_url, key = %created.item_key, "Created item");
    Ok(ItemKey::new(created.item_key))
  }

  async fn delete_item(&self, key: &ItemKey) -> Result<()> {
    self.post("deleteitem", &json!({ "itemKey": key })).await?;
    debug!(%key, "Deleted item");
    Ok(())
  }

  async fn get_item_metadata(&self, key: &ItemKey) -> Result<ItemMetadata> {
    self.post_json("getitem", &json!({ "itemKey": key })).await
  }
}
