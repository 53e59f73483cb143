//! Chroma-compatible cloud vector store client.
//!
//! Talks to the hosted HTTP API (tenant/database/collection routes) via
//! reqwest, with the same retry strategy as the embedding clients:
//! 429/5xx/network errors retry with exponential backoff, other client
//! errors fail immediately. Query responses are normalized through
//! [`parse_query_response`](super::parse_query_response).

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{parse_query_response, QueryHit, UpsertRecord, VectorStore};
use crate::config::StoreConfig;

pub struct ChromaStore {
    client: reqwest::Client,
    base: String,
    api_key: String,
    max_retries: u32,
    /// Collection name → backend collection id, resolved once per process.
    collection_ids: Mutex<HashMap<String, String>>,
}

impl ChromaStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("CHROMA_API_KEY").ok())
            .ok_or_else(|| {
                anyhow!("store.api_key (or the CHROMA_API_KEY environment variable) required in cloud mode")
            })?;
        let database = config
            .database
            .as_deref()
            .ok_or_else(|| anyhow!("store.database required in cloud mode"))?;

        let base = format!(
            "{}/api/v2/tenants/{}/databases/{}",
            config.url.trim_end_matches('/'),
            config.tenant,
            database
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base,
            api_key,
            max_retries: config.max_retries,
            collection_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Issue one API request with retry/backoff. Returns `Ok(None)` on 404
    /// so callers can give resource-specific errors.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("X-Chroma-Token", &self.api_key)
                .header("Content-Type", "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let text = response.text().await.unwrap_or_default();
                        let json = if text.is_empty() {
                            Value::Null
                        } else {
                            serde_json::from_str(&text).unwrap_or(Value::Null)
                        };
                        return Ok(Some(json));
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Ok(None);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow!(
                            "Vector store API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Vector store API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Vector store request failed after retries")))
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.lock().unwrap().get(name) {
            return Ok(id.clone());
        }

        let response = self
            .request(Method::GET, &format!("/collections/{}", name), None)
            .await?
            .ok_or_else(|| anyhow!("Collection '{}' not found", name))?;

        let id = response
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| anyhow!("Invalid collection response: missing id"))?
            .to_string();

        self.collection_ids
            .lock()
            .unwrap()
            .insert(name.to_string(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn open_collection(&self, name: &str) -> Result<()> {
        self.collection_id(name).await?;
        Ok(())
    }

    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let body = json!({ "name": name, "get_or_create": true });
        let response = self
            .request(Method::POST, "/collections", Some(&body))
            .await?
            .ok_or_else(|| anyhow!("Failed to create collection '{}'", name))?;

        if let Some(id) = response.get("id").and_then(|id| id.as_str()) {
            self.collection_ids
                .lock()
                .unwrap()
                .insert(name.to_string(), id.to_string());
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[UpsertRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let embeddings: Vec<&[f32]> = records.iter().map(|r| r.embedding.as_slice()).collect();
        let metadatas: Vec<Value> = records
            .iter()
            .map(|r| Value::Object(r.metadata.clone()))
            .collect();
        let documents: Vec<Value> = records
            .iter()
            .map(|r| match &r.document {
                Some(document) => Value::String(document.clone()),
                None => Value::Null,
            })
            .collect();

        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "metadatas": metadatas,
            "documents": documents,
        });

        self.request(
            Method::POST,
            &format!("/collections/{}/upsert", id),
            Some(&body),
        )
        .await?
        .ok_or_else(|| anyhow!("Collection '{}' disappeared during upsert", collection))?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        top_k: usize,
        include_documents: bool,
    ) -> Result<Vec<QueryHit>> {
        let id = self.collection_id(collection).await?;

        let mut include = vec!["metadatas", "distances"];
        if include_documents {
            include.push("documents");
        }

        let body = json!({
            "query_embeddings": [vector],
            "n_results": top_k,
            "include": include,
        });

        let response = self
            .request(
                Method::POST,
                &format!("/collections/{}/query", id),
                Some(&body),
            )
            .await?
            .ok_or_else(|| anyhow!("Collection '{}' not found", collection))?;

        parse_query_response(&response)
    }
}
