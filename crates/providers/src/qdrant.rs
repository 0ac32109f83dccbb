//! Thin Qdrant REST client. Only the calls the retrieval layer needs are
//! covered: scored vector search and point upsert.

use crate::ProviderError;
use bytes::Bytes;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

#[derive(Clone)]
pub struct QdrantClient {
    client: Client,
    cfg: QdrantConfig,
}

impl QdrantClient {
    pub fn new(cfg: QdrantConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    /// Scored nearest points, payloads and stored vectors included.
    pub async fn search(
        &self,
        vector: &[f32],
        limit: u64,
        filter: Option<serde_json::Value>,
    ) -> Result<Vec<ScoredPoint>, ProviderError> {
        #[derive(Serialize)]
        struct SearchRequest<'a> {
            vector: &'a [f32],
            limit: u64,
            #[serde(skip_serializing_if = "Option::is_none")]
            filter: Option<serde_json::Value>,
            with_payload: bool,
            with_vector: bool,
        }
        #[derive(Deserialize)]
        struct SearchReply {
            result: Vec<ScoredPoint>,
        }
        let body = SearchRequest {
            vector,
            limit,
            filter,
            with_payload: true,
            with_vector: true,
        };
        let resp = self.send(Method::POST, "points/search", &body).await?;
        let reply: SearchReply = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(reply.result)
    }

    pub async fn upsert(&self, points: Vec<QdrantPoint>) -> Result<(), ProviderError> {
        #[derive(Serialize)]
        struct UpsertRequest {
            points: Vec<QdrantPoint>,
        }
        self.send(Method::PUT, "points", &UpsertRequest { points })
            .await?;
        Ok(())
    }

    /// One collection-scoped request. Non-2xx replies become errors carrying
    /// the response body so operator logs show what the server said.
    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!(
            "{}/collections/{}/{}",
            self.cfg.url, self.cfg.collection, path
        );
        let mut builder = self.client.request(method, url).json(body);
        if let Some(key) = &self.cfg.api_key {
            builder = builder.header("api-key", key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::RequestFailed(format!(
                "status {} body {:?}",
                status, body
            )));
        }
        Ok(resp)
    }
}

#[derive(Debug, Serialize)]
pub struct QdrantPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ScoredPoint {
    pub id: serde_json::Value,
    pub score: f32,
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
}

/// Builds a Qdrant `must match` filter over a keyword payload field.
pub fn match_filter(field: &str, value: &str) -> serde_json::Value {
    serde_json::json!({
        "must": [{ "key": field, "match": { "value": value } }]
    })
}
