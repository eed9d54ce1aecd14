use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use plate_core::catalog::{
    CatalogFood, CatalogHit, FoodCatalog, parse_details_body, parse_search_body,
};
use plate_core::error::Error as CoreError;

const PAGE_SIZE: &str = "25";

/// Optional narrowing of a catalog search. Blank values are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    /// FDC data type, e.g. "Foundation", "SR Legacy" or "Branded"
    pub data_type: Option<String>,
    pub brand_owner: Option<String>,
    pub food_category: Option<String>,
}

impl SearchFilters {
    fn cleaned(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Self {
            data_type: keep(self.data_type),
            brand_owner: keep(self.brand_owner),
            food_category: keep(self.food_category),
        }
    }
}

/// USDA `FoodData` Central v1 client.
pub struct FdcClient {
    client: reqwest::Client,
    rt: tokio::runtime::Handle,
    endpoint: String,
    api_key: String,
    filters: SearchFilters,
}

impl FdcClient {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "plate-cli/{} (nutrition tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            rt: tokio::runtime::Handle::current(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            filters: SearchFilters::default(),
        })
    }

    /// A copy of this client whose searches apply `filters`.
    #[must_use]
    pub fn with_filters(&self, filters: SearchFilters) -> Self {
        Self {
            client: self.client.clone(),
            rt: self.rt.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            filters: filters.cleaned(),
        }
    }

    fn search_url(&self) -> String {
        format!("{}/foods/search", self.endpoint)
    }

    fn details_url(&self, fdc_id: i64) -> String {
        format!("{}/food/{fdc_id}", self.endpoint)
    }

    async fn get_body(&self, request: reqwest::RequestBuilder) -> plate_core::Result<String> {
        let resp = request
            .send()
            .await
            .map_err(|e| CoreError::CatalogUnavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::CatalogUnavailable(format!(
                "FoodData Central returned HTTP {status}"
            )));
        }
        resp.text()
            .await
            .map_err(|e| CoreError::CatalogUnavailable(e.to_string()))
    }

    fn search_params<'a>(&'a self, query: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("query", query),
            ("api_key", self.api_key.as_str()),
            ("pageSize", PAGE_SIZE),
        ];
        let optional = [
            ("dataType", &self.filters.data_type),
            ("brandOwner", &self.filters.brand_owner),
            ("foodCategory", &self.filters.food_category),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref() {
                params.push((key, value));
            }
        }
        params
    }

    pub async fn search_async(&self, query: &str) -> plate_core::Result<Vec<CatalogHit>> {
        debug!(query, filters = ?self.filters, "searching FoodData Central");
        let body = self
            .get_body(
                self.client
                    .get(self.search_url())
                    .query(&self.search_params(query)),
            )
            .await?;
        parse_search_body(&body)
    }

    pub async fn details_async(&self, fdc_id: i64) -> plate_core::Result<CatalogFood> {
        debug!(fdc_id, "fetching FoodData Central details");
        let body = self
            .get_body(
                self.client
                    .get(self.details_url(fdc_id))
                    .query(&[("api_key", self.api_key.as_str())]),
            )
            .await?;
        parse_details_body(&body)
    }

    // Requires the multi-threaded runtime that `#[tokio::main]` provides.
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        tokio::task::block_in_place(|| self.rt.block_on(fut))
    }
}

impl FoodCatalog for FdcClient {
    fn search(&self, query: &str) -> plate_core::Result<Vec<CatalogHit>> {
        self.block_on(self.search_async(query))
    }

    fn details(&self, fdc_id: i64) -> plate_core::Result<CatalogFood> {
        self.block_on(self.details_async(fdc_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_FDC_API_KEY, DEFAULT_FDC_ENDPOINT};

    #[tokio::test]
    async fn test_urls_strip_trailing_slash() {
        let client = FdcClient::new(DEFAULT_FDC_ENDPOINT, DEFAULT_FDC_API_KEY).unwrap();
        assert_eq!(
            client.search_url(),
            "https://api.nal.usda.gov/fdc/v1/foods/search"
        );
        assert_eq!(
            client.details_url(171_705),
            "https://api.nal.usda.gov/fdc/v1/food/171705"
        );
    }

    #[tokio::test]
    async fn test_filters_ignore_blank() {
        let client = FdcClient::new(DEFAULT_FDC_ENDPOINT, DEFAULT_FDC_API_KEY).unwrap();
        let filtered = client.with_filters(SearchFilters {
            data_type: Some("  ".to_string()),
            brand_owner: Some(String::new()),
            food_category: None,
        });
        assert_eq!(filtered.filters, SearchFilters::default());
        assert_eq!(filtered.search_params("apple").len(), 3);
    }

    #[tokio::test]
    async fn test_search_params_carry_filters() {
        let client = FdcClient::new(DEFAULT_FDC_ENDPOINT, "key").unwrap();
        let filtered = client.with_filters(SearchFilters {
            data_type: Some("Branded".to_string()),
            brand_owner: Some("Kellogg".to_string()),
            food_category: Some("Cereal".to_string()),
        });
        assert_eq!(
            filtered.search_params("corn flakes"),
            vec![
                ("query", "corn flakes"),
                ("api_key", "key"),
                ("pageSize", PAGE_SIZE),
                ("dataType", "Branded"),
                ("brandOwner", "Kellogg"),
                ("foodCategory", "Cereal"),
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let client = FdcClient::new("http://127.0.0.1:9", DEFAULT_FDC_API_KEY).unwrap();
        let err = client.search_async("apple").await.unwrap_err();
        assert!(matches!(err, CoreError::CatalogUnavailable(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires network access"]
    async fn test_live_search_and_details() {
        let client = FdcClient::new(DEFAULT_FDC_ENDPOINT, DEFAULT_FDC_API_KEY).unwrap();
        let hits = FoodCatalog::search(&client, "apple").unwrap();
        assert!(!hits.is_empty());
        let food = FoodCatalog::details(&client, hits[0].fdc_id).unwrap();
        assert_eq!(food.fdc_id, hits[0].fdc_id);
    }
}
