//! Cesium ion REST client.
//!
//! Only the asset catalog is used: `GET /v1/assets?page=N&limit=M` with the
//! integration's access token as a bearer credential.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::database::models::IonAssetUpsert;
use crate::scene::IonAssetDetails;

const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 500;

#[derive(Debug, Error)]
pub enum IonError {
    /// The token was rejected (401/403); the integration must be reauthorized
    #[error("access token rejected")]
    Unauthorized,

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("catalog exceeds {0} pages")]
    TooManyPages(u32),
}

/// One catalog entry as returned by ion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IonAsset {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attribution: String,
    #[serde(default)]
    pub bytes: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<i64>,
}

impl From<IonAsset> for IonAssetUpsert {
    fn from(asset: IonAsset) -> Self {
        IonAssetUpsert {
            ion_asset_id: asset.id,
            name: asset.name,
            asset_type: asset.asset_type.clone(),
            file_size: asset.bytes,
            details: IonAssetDetails {
                asset_type: asset.asset_type,
                status: asset.status,
                description: asset.description,
                attribution: asset.attribution,
                percent_complete: asset.percent_complete,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssetPage {
    pub items: Vec<IonAsset>,
}

/// Remote asset catalog. The HTTP client is the production implementation;
/// tests substitute their own.
#[async_trait]
pub trait IonCatalog: Send + Sync {
    /// Cheap probe that fails with `Unauthorized` for a bad token
    async fn verify_token(&self, token: &str) -> Result<(), IonError>;

    /// Every asset visible to the token, all pages
    async fn list_assets(&self, token: &str) -> Result<Vec<IonAsset>, IonError>;
}

pub struct IonClient {
    http: reqwest::Client,
    base_url: String,
}

impl IonClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, IonError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IonError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_page(&self, token: &str, page: u32, limit: usize) -> Result<AssetPage, IonError> {
        let url = format!("{}/v1/assets", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(&[("page", page.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| IonError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(IonError::Unauthorized),
            status if !status.is_success() => Err(IonError::Status(status.as_u16())),
            _ => response
                .json::<AssetPage>()
                .await
                .map_err(|e| IonError::Decode(e.to_string())),
        }
    }
}

#[async_trait]
impl IonCatalog for IonClient {
    async fn verify_token(&self, token: &str) -> Result<(), IonError> {
        self.fetch_page(token, 1, 1).await.map(|_| ())
    }

    async fn list_assets(&self, token: &str) -> Result<Vec<IonAsset>, IonError> {
        let mut assets = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(token, page, PAGE_SIZE).await?.items;
            let done = batch.len() < PAGE_SIZE;
            assets.extend(batch);
            if done {
                debug!("Fetched {} ion assets over {} page(s)", assets.len(), page);
                return Ok(assets);
            }
        }
        Err(IonError::TooManyPages(MAX_PAGES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_entry_parses_ion_shape() {
        let page: AssetPage = serde_json::from_value(serde_json::json!({
            "items": [{
                "id": 96188,
                "type": "3DTILES",
                "name": "Cesium OSM Buildings",
                "description": "",
                "attribution": "OpenStreetMap",
                "bytes": 0,
                "dateAdded": "2020-06-30T00:00:00.000Z",
                "status": "COMPLETE",
                "percentComplete": 100
            }]
        }))
        .unwrap();

        let upsert: IonAssetUpsert = page.items[0].clone().into();
        assert_eq!(upsert.ion_asset_id, 96188);
        assert_eq!(upsert.asset_type, "3DTILES");
        assert_eq!(upsert.details.status, "COMPLETE");
        assert_eq!(upsert.details.percent_complete, Some(100));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = IonClient::new("https://api.cesium.com/", 5).unwrap();
        assert_eq!(client.base_url, "https://api.cesium.com");
    }
}
