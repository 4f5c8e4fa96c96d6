//! Paginated collection fetching.
//!
//! Deere list endpoints return one page at a time:
//!
//! ```text
//! {
//!   "total": 5,
//!   "values": [ {...}, {...} ],
//!   "links": [
//!     { "rel": "self",     "uri": ".../farms?pageOffset=0&itemLimit=2" },
//!     { "rel": "nextPage", "uri": ".../farms?pageOffset=2&itemLimit=2" }
//!   ]
//! }
//! ```
//!
//! [`PageFetcher::fetch_all`] walks `nextPage` links until none is left and
//! returns every item in server order. The server's links are
//! authoritative: a full page without a `nextPage` link ends the walk.


use crate::error::FetchError;
use crate::oauth::AccessTokenSource;
use reqwest::header::ACCEPT;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Versioned media type of the platform API.
pub const ACCEPT_V3: &str = "application/vnd.deere.axiom.v3+json";

/// Largest page the platform API serves.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const NEXT_PAGE_REL: &str = "nextPage";
const PAGE_OFFSET_PARAM: &str = "pageOffset";
const ITEM_LIMIT_PARAM: &str = "itemLimit";

/// Navigation link attached to a page or an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    #[serde(default)]
    pub uri: String,
}

/// One page of a collection response.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
    #[serde(default)]
    pub links: Vec<Link>,
}

/// Where the walk goes after a page.
#[derive(Debug, PartialEq, Eq)]
pub enum NextPage {
    /// No `nextPage` link
    Done,
    /// `nextPage` link carrying this offset
    Offset(u64),
    /// `nextPage` link whose URI has no usable `pageOffset`
    Malformed(String),
}

impl<T> Page<T> {
    /// Reads the `nextPage` link, if any.
    pub fn next_page(&self) -> NextPage {
        let Some(link) = self.links.iter().find(|l| l.rel == NEXT_PAGE_REL) else {
            return NextPage::Done;
        };

        let offset = Url::parse(&link.uri).ok().and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == PAGE_OFFSET_PARAM)
                .and_then(|(_, value)| value.parse::<u64>().ok())
        });

        match offset {
            Some(offset) => NextPage::Offset(offset),
            None => NextPage::Malformed(link.uri.clone()),
        }
    }
}

/// Every item of a collection, in server order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ResourceCollection<T> {
    /// Total reported by the first page, if the server sent one
    pub total: Option<u64>,
    pub items: Vec<T>,
}

impl<T> ResourceCollection<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> IntoIterator for ResourceCollection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Progress of one `fetch_all` call.
#[derive(Debug)]
struct PageCursor {
    offset: u64,
    pages: usize,
    total: Option<u64>,
}

/// Walks paginated collection endpoints.
///
/// Requests are sequential. A bearer token is obtained from the
/// [`AccessTokenSource`] before every page, so a token that expires
/// mid-walk is refreshed transparently.
pub struct PageFetcher {
    http_client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
    accept: String,
    page_delay: Duration,
}

impl PageFetcher {
    /// Creates a fetcher with the platform media type and no delay.
    pub fn new(http_client: Client, base_url: String, tokens: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            http_client,
            base_url,
            tokens,
            accept: ACCEPT_V3.to_string(),
            page_delay: Duration::ZERO,
        }
    }

    /// Sets the pause between consecutive page requests.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Sets the `Accept` header (the equipment API wants `application/json`).
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `endpoint`, which may be a path under the base URL
    /// or a full URL on another host.
    pub fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        }
    }

    /// Fetches every page of `endpoint` and returns all items in order.
    ///
    /// `base_params` are sent with every page; `pageOffset` and `itemLimit`
    /// are managed here and dropped from `base_params` if present.
    ///
    /// # Errors
    /// * `FetchError::Status` - A page answered with a non-success status;
    ///   items from earlier pages are discarded
    /// * `FetchError::Auth` - No valid token could be obtained
    /// * `FetchError::Request` / `FetchError::Decode` - Transport failure,
    ///   timeout, or a body that is not a page
    /// * `FetchError::Stalled` - A `nextPage` link did not move forward
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        base_params: &[(&str, &str)],
        page_size: u32,
    ) -> Result<ResourceCollection<T>, FetchError> {
        let url = self.resolve(endpoint);
        let params: Vec<(&str, &str)> = base_params
            .iter()
            .filter(|(key, _)| *key != PAGE_OFFSET_PARAM && *key != ITEM_LIMIT_PARAM)
            .copied()
            .collect();

        let mut cursor = PageCursor {
            offset: 0,
            pages: 0,
            total: None,
        };
        let mut items: Vec<T> = Vec::new();

        loop {
            if cursor.pages > 0 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page: Page<T> = self
                .fetch_page(&url, &params, cursor.offset, page_size)
                .await?;

            if cursor.pages == 0 {
                cursor.total = page.total;
            }
            cursor.pages += 1;

            debug!(
                url = %url,
                offset = cursor.offset,
                count = page.values.len(),
                total = ?cursor.total,
                "Fetched page"
            );

            let page_len = page.values.len();
            let next = page.next_page();
            items.extend(page.values);

            match next {
                NextPage::Done => {
                    if page_len as u64 == u64::from(page_size) && page_size > 0 {
                        debug!(
                            url = %url,
                            offset = cursor.offset,
                            "Full page without nextPage link, trusting the server"
                        );
                    }
                    break;
                }
                NextPage::Malformed(uri) => {
                    warn!(
                        url = %url,
                        next_uri = %uri,
                        "nextPage link has no usable pageOffset, stopping"
                    );
                    break;
                }
                NextPage::Offset(next) if next <= cursor.offset => {
                    return Err(FetchError::Stalled {
                        current: cursor.offset,
                        next,
                    });
                }
                NextPage::Offset(next) => cursor.offset = next,
            }
        }

        if let Some(total) = cursor.total {
            if total != items.len() as u64 {
                warn!(
                    url = %url,
                    total,
                    fetched = items.len(),
                    "Fetched item count differs from reported total"
                );
            }
        }

        info!(
            url = %url,
            pages = cursor.pages,
            fetched = items.len(),
            total = ?cursor.total,
            "Collection fetched"
        );

        Ok(ResourceCollection {
            total: cursor.total,
            items,
        })
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        offset: u64,
        page_size: u32,
    ) -> Result<Page<T>, FetchError> {
        let access_token = self.tokens.access_token().await?;

        let request = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .header(ACCEPT, &self.accept)
            .query(params)
            .query(&[
                (PAGE_OFFSET_PARAM, offset.to_string()),
                (ITEM_LIMIT_PARAM, page_size.to_string()),
            ])
            .build()
            .map_err(FetchError::Request)?;
        let request_url = request.url().to_string();

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(FetchError::Request)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(url = %request_url, status, "Page request failed");
            return Err(FetchError::Status {
                url: request_url,
                status,
                body,
            });
        }

        response
            .json::<Page<T>>()
            .await
            .map_err(|source| FetchError::Decode {
                url: request_url,
                source,
            })
    }
}
