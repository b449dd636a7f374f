//! Store listing lookup over HTTP.

use super::MetadataProvider;
use crate::config::MetadataConfig;
use crate::error::{Error, MetadataError, Result};
use crate::types::AppInfo;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use url::Url;

/// Reads title, developer, summary and icon from the public store listing page
///
/// # Examples
///
/// ```no_run
/// use app_details_core::config::MetadataConfig;
/// use app_details_core::metadata::{MetadataProvider, PlayStoreProvider};
///
/// # async fn example() -> app_details_core::Result<()> {
/// let provider = PlayStoreProvider::new(&MetadataConfig::default())?;
/// let info = provider.fetch("org.mozilla.firefox").await?;
/// println!("{} by {:?}", info.title, info.developer);
/// # Ok(())
/// # }
/// ```
pub struct PlayStoreProvider {
    client: reqwest::Client,
    store_url: Url,
    language: String,
    parser: ListingParser,
}

impl PlayStoreProvider {
    /// Create a provider from the metadata settings
    pub fn new(config: &MetadataConfig) -> Result<Self> {
        let store_url = Url::parse(&config.store_url).map_err(|e| Error::Config {
            message: format!("invalid store URL '{}': {}", config.store_url, e),
            key: Some("store_url".to_string()),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(Self {
            client,
            store_url,
            language: config.language.clone(),
            parser: ListingParser::new()?,
        })
    }

    /// Listing page URL for `package_name`
    pub fn listing_url(&self, package_name: &str) -> Url {
        let mut url = self.store_url.clone();
        url.query_pairs_mut()
            .append_pair("id", package_name)
            .append_pair("hl", &self.language);
        url
    }
}

#[async_trait]
impl MetadataProvider for PlayStoreProvider {
    async fn fetch(&self, package_name: &str) -> Result<AppInfo> {
        let url = self.listing_url(package_name);
        tracing::debug!(url = %url, "requesting store listing");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound {
                package: package_name.to_string(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(MetadataError::Transport(format!("store returned status {}", status)).into());
        }

        let body = response
            .text()
            .await
            .map_err(|e| MetadataError::Transport(e.to_string()))?;

        self.parser.parse(&body, url.as_str())
    }
}

/// Extracts listing fields from the page's meta tags
struct ListingParser {
    meta_tag: Regex,
    attribute: Regex,
    title_tag: Regex,
    developer_link: Regex,
}

impl ListingParser {
    fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Metadata(MetadataError::Parse(e.to_string())))
        };

        Ok(Self {
            meta_tag: compile(r"(?is)<meta\s[^>]*>")?,
            attribute: compile(r#"(?is)([a-z][a-z0-9:_-]*)\s*=\s*"([^"]*)""#)?,
            title_tag: compile(r"(?is)<title[^>]*>(.*?)</title>")?,
            developer_link: compile(
                r#"(?is)<a[^>]+href="/store/apps/dev(?:eloper)?\?id=[^"]*"[^>]*>\s*(?:<span[^>]*>)?([^<]+)"#,
            )?,
        })
    }

    fn parse(&self, html: &str, store_url: &str) -> Result<AppInfo> {
        let mut meta: HashMap<String, String> = HashMap::new();
        for tag in self.meta_tag.find_iter(html) {
            let mut key = None;
            let mut content = None;
            for cap in self.attribute.captures_iter(tag.as_str()) {
                match cap[1].to_ascii_lowercase().as_str() {
                    "property" | "name" | "itemprop" => key = Some(cap[2].to_string()),
                    "content" => content = Some(decode_entities(&cap[2])),
                    _ => {}
                }
            }
            if let (Some(key), Some(content)) = (key, content) {
                meta.entry(key).or_insert(content);
            }
        }

        let title = meta
            .get("og:title")
            .cloned()
            .or_else(|| {
                self.title_tag
                    .captures(html)
                    .map(|cap| decode_entities(cap[1].trim()))
            })
            .map(|title| strip_store_suffix(&title))
            .filter(|title| !title.is_empty())
            .ok_or_else(|| MetadataError::Parse("listing has no title".to_string()))?;

        let developer = self
            .developer_link
            .captures(html)
            .map(|cap| decode_entities(cap[1].trim()))
            .filter(|name| !name.is_empty())
            .or_else(|| meta.get("author").cloned());

        let summary = meta
            .get("og:description")
            .or_else(|| meta.get("description"))
            .cloned()
            .filter(|s| !s.is_empty());

        let icon_url = meta.get("og:image").cloned().filter(|s| !s.is_empty());

        Ok(AppInfo {
            title,
            developer,
            summary,
            icon_url,
            store_url: Some(store_url.to_string()),
            fetched_at: chrono::Utc::now(),
        })
    }
}

fn strip_store_suffix(title: &str) -> String {
    title
        .trim()
        .trim_end_matches("- Apps on Google Play")
        .trim()
        .to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
