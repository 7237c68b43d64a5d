use crate::error::{EtlError, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Outcome of one page request. An empty page is the sole
/// pagination-termination signal; no total count is ever queried.
#[derive(Debug)]
pub enum PageResult {
    Batch(Vec<Value>),
    Empty,
}

/// A paginated row source. The orchestrator only ever sees this trait, so
/// tests can drive the fetch loop with scripted pages instead of HTTP.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<PageResult>;
}

/// Socrata SODA endpoint: `GET <base>.json?$limit=N&$offset=M` returning a
/// JSON array of row objects.
pub struct SodaPageSource {
    client: reqwest::Client,
    base_url: String,
}

impl SodaPageSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PageSource for SodaPageSource {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<PageResult> {
        let url = format!("{}.json?$limit={}&$offset={}", self.base_url, limit, offset);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EtlError::Transport {
                url,
                status: status.as_u16(),
            });
        }

        // A malformed payload surfaces here as a transport-level failure.
        let rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            Ok(PageResult::Empty)
        } else {
            Ok(PageResult::Batch(rows))
        }
    }
}
