use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::normalize::l2_normalize_in_place;
use crate::resilience::{execute_with_retry_async, CircuitBreaker, CircuitState};
use crate::{EmbedderConfig, QueryEmbedder, SemanticError};

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// Every call goes through the circuit breaker first, then through the
/// retry policy; only the final outcome of a retried call is fed back to the
/// breaker.
pub struct ApiEmbedder {
    cfg: EmbedderConfig,
    url: String,
    auth_header: Option<String>,
    client: reqwest::Client,
    breaker: CircuitBreaker,
}

impl ApiEmbedder {
    pub fn new(cfg: EmbedderConfig) -> Result<Self, SemanticError> {
        cfg.validate()?;
        let url = cfg
            .api_url
            .clone()
            .ok_or_else(|| SemanticError::InvalidConfig("api_url is required for api mode".into()))?;
        let auth_header = cfg
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
            .map(|key| format!("Bearer {key}"));
        if auth_header.is_none() {
            tracing::warn!(model = %cfg.model_name, "embedding API key not set, sending unauthenticated requests");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .connect_timeout(Duration::from_millis(cfg.timeout_ms.min(2_000)))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| SemanticError::InvalidConfig(format!("http client: {e}")))?;
        let breaker = CircuitBreaker::new(cfg.circuit_breaker);

        Ok(Self {
            cfg,
            url,
            auth_header,
            client,
            breaker,
        })
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.current_state()
    }

    async fn send(&self, text: &str) -> Result<Value, SemanticError> {
        let payload = json!({ "input": [text], "model": self.cfg.model_name });
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SemanticError::Request(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SemanticError::Request(format!(
                "HTTP error {status}: {body}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SemanticError::Response(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl QueryEmbedder for ApiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, SemanticError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SemanticError::EmptyInput);
        }
        if !self.breaker.allow_request() {
            return Err(SemanticError::CircuitOpen(self.cfg.model_name.clone()));
        }

        let outcome = execute_with_retry_async(
            &self.cfg.retry,
            |_attempt| self.send(text),
            SemanticError::is_transient,
        )
        .await;
        let attempts = outcome.attempts;

        let parsed = outcome
            .into_result()
            .and_then(|body| first_embedding(body, self.cfg.dimension));
        match parsed {
            Ok(mut vector) => {
                self.breaker.record_success();
                if self.cfg.normalize {
                    l2_normalize_in_place(&mut vector);
                }
                Ok(vector)
            }
            Err(err) => {
                self.breaker.record_failure();
                tracing::warn!(attempts, error = %err, "query embedding failed");
                Err(err)
            }
        }
    }

    fn dimension(&self) -> usize {
        self.cfg.dimension
    }

    fn model_name(&self) -> &str {
        &self.cfg.model_name
    }
}

fn first_embedding(body: Value, expected: usize) -> Result<Vec<f32>, SemanticError> {
    let vector = parse_embeddings_from_value(body)?
        .into_iter()
        .next()
        .ok_or_else(|| SemanticError::Response("response contained no embeddings".into()))?;
    if vector.len() != expected {
        return Err(SemanticError::Dimension {
            expected,
            got: vector.len(),
        });
    }
    Ok(vector)
}

fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                let mut vectors = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(mut obj) => match obj.remove("embedding") {
                            Some(embedding) => vectors.push(parse_embedding_vector(embedding)?),
                            None => {
                                return Err(SemanticError::Response(
                                    "missing `embedding` field in data item".into(),
                                ))
                            }
                        },
                        _ => {
                            return Err(SemanticError::Response(
                                "unexpected entry inside `data` array".into(),
                            ))
                        }
                    }
                }
                return Ok(vectors);
            }

            Err(SemanticError::Response("unsupported API response shape".into()))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, SemanticError> {
    match value {
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Array(items) if items.iter().all(|item| item.is_array()) => {
            items.into_iter().map(parse_embedding_vector).collect()
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, SemanticError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SemanticError::Response("non-finite embedding value".into())),
                other => Err(SemanticError::Response(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(SemanticError::Response(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
