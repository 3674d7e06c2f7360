//! HTTP client for the catalog API.
//!
//! Wraps the search and detail endpoints with signed requests. When no
//! credential is available the client degrades to unsigned requests rather
//! than failing: signing is a capability, not a requirement.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::signer::RequestSigner;

use super::types::{CatalogError, CatalogResult, ListingDetail, SearchCombo, SearchPage};

/// User agent sent with every request.
const USER_AGENT: &str = "portal-harvest/0.1";

/// Request timeout for catalog calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Wire format of one search response page.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    #[serde(default)]
    has_more: bool,
}

/// Wire format of one search result entry. Only the identifier matters at
/// discovery time; everything else is fetched per item later.
#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
}

/// Client for the catalog's search and detail endpoints.
pub struct CatalogClient {
    http_client: Client,
    base_url: String,
    signer: Option<RequestSigner>,
    page_size: u32,
}

impl CatalogClient {
    /// Creates a new catalog client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Catalog API base URL, without a trailing slash
    /// * `signer` - Request signer, or `None` to run unsigned
    /// * `page_size` - Items requested per search page
    pub fn new(base_url: impl Into<String>, signer: Option<RequestSigner>, page_size: u32) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            signer,
            page_size,
        }
    }

    /// Returns whether requests will be signed.
    pub fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    /// Fetches one page of search results for a combination.
    ///
    /// Pages are 1-indexed.
    pub async fn search(&self, combo: &SearchCombo, page: u32) -> CatalogResult<SearchPage> {
        let url = format!("{}/listings/search", self.base_url);
        let params: Vec<(String, String)> = vec![
            ("region".to_string(), combo.region.clone()),
            ("category".to_string(), combo.category.clone()),
            ("deal_type".to_string(), combo.deal_type.clone()),
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), self.page_size.to_string()),
        ];

        let response: SearchResponse = self.get_json(&url, &params).await?;

        Ok(SearchPage {
            ids: response.items.into_iter().map(|item| item.id).collect(),
            has_more: response.has_more,
        })
    }

    /// Fetches full detail for one item by identifier.
    pub async fn fetch_detail(&self, id: &str) -> CatalogResult<ListingDetail> {
        let url = format!("{}/listings/{}", self.base_url, urlencoding::encode(id));
        self.get_json(&url, &[]).await
    }

    /// Performs a signed (when possible) GET and decodes the JSON body.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> CatalogResult<T> {
        let mut request = self.http_client.get(url).query(params);

        // The signature covers the bare URL plus the query parameters, so
        // the signed parameter set and the sent parameter set must match.
        if let Some(ref signer) = self.signer {
            request = request.header("Authorization", signer.sign("GET", url, params));
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::HttpError(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 503 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok());
            return Err(CatalogError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CatalogError::HttpError(format!(
                "API returned status {}: {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::ParseError(e.to_string()))
    }
}
