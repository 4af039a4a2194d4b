//! Remote embedding backend.
//!
//! Speaks the `embedContent` / `batchEmbedContents` REST shape: a model
//! path, a `parts` content block, and a task type distinguishing document
//! from query embeddings. Transport failures are retried per the configured
//! policy; response vectors are validated and normalized by the caller.

use std::time::Duration;

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use tracing::warn;

use crate::{EmbedConfig, EmbedError, EmbedRole};

// Process-wide client with connection pooling; per-request timeouts come
// from the config.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(8)
        .build()
        .unwrap_or_default()
});

pub(crate) async fn embed_via_api(
    text: &str,
    role: EmbedRole,
    cfg: &EmbedConfig,
) -> Result<Vec<f32>, EmbedError> {
    let payload = json!({
        "model": format!("models/{}", cfg.model_name),
        "content": { "parts": [ { "text": text } ] },
        "taskType": role.task_type(),
    });
    let response = send_with_retry(cfg, "embedContent", payload).await?;
    parse_single(&response)
}

pub(crate) async fn embed_batch_via_api(
    texts: &[&str],
    role: EmbedRole,
    cfg: &EmbedConfig,
) -> Result<Vec<Vec<f32>>, EmbedError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let requests: Vec<Value> = texts
        .iter()
        .map(|text| {
            json!({
                "model": format!("models/{}", cfg.model_name),
                "content": { "parts": [ { "text": text } ] },
                "taskType": role.task_type(),
            })
        })
        .collect();
    let payload = json!({ "requests": requests });
    let response = send_with_retry(cfg, "batchEmbedContents", payload).await?;
    let vectors = parse_batch(&response)?;
    if vectors.len() != texts.len() {
        return Err(EmbedError::Upstream(format!(
            "backend returned {} embeddings for {} inputs",
            vectors.len(),
            texts.len()
        )));
    }
    Ok(vectors)
}

async fn send_with_retry(
    cfg: &EmbedConfig,
    operation: &str,
    payload: Value,
) -> Result<Value, EmbedError> {
    let mut last_err = EmbedError::Upstream("no attempts made".into());
    for attempt in 0..=cfg.retry.max_retries {
        let delay = cfg.retry.delay_for(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match send_request(cfg, operation, &payload).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < cfg.retry.max_retries => {
                warn!(attempt, error = %err, "embedding request failed, retrying");
                last_err = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err)
}

async fn send_request(
    cfg: &EmbedConfig,
    operation: &str,
    payload: &Value,
) -> Result<Value, EmbedError> {
    let base = cfg
        .api_url
        .as_deref()
        .ok_or_else(|| EmbedError::InvalidConfig("api_url is required for api mode".into()))?;
    let key = cfg
        .api_key
        .as_deref()
        .ok_or_else(|| EmbedError::InvalidConfig("api_key is required for api mode".into()))?;
    let url = format!(
        "{}/models/{}:{operation}",
        base.trim_end_matches('/'),
        cfg.model_name
    );

    let response = HTTP_CLIENT
        .post(&url)
        .query(&[("key", key)])
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .json(payload)
        .send()
        .await
        .map_err(|e| EmbedError::Upstream(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbedError::Upstream(format!(
            "backend returned {status}: {body}"
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| EmbedError::Upstream(format!("invalid response body: {e}")))
}

fn parse_single(value: &Value) -> Result<Vec<f32>, EmbedError> {
    value
        .pointer("/embedding/values")
        .and_then(Value::as_array)
        .map(|values| values_to_f32(values))
        .ok_or_else(|| EmbedError::Upstream("response missing embedding.values".into()))
}

fn parse_batch(value: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let embeddings = value
        .get("embeddings")
        .and_then(Value::as_array)
        .ok_or_else(|| EmbedError::Upstream("response missing embeddings array".into()))?;
    embeddings
        .iter()
        .map(|entry| {
            entry
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values_to_f32(values))
                .ok_or_else(|| EmbedError::Upstream("batch entry missing values".into()))
        })
        .collect()
}

fn values_to_f32(values: &[Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(f64::NAN) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_extracts_values() {
        let value = json!({ "embedding": { "values": [0.1, 0.2, 0.3] } });
        let v = parse_single(&value).unwrap();
        assert_eq!(v.len(), 3);
        assert!((v[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn parse_single_missing_values_is_upstream_error() {
        let value = json!({ "embedding": {} });
        assert!(matches!(parse_single(&value), Err(EmbedError::Upstream(_))));
    }

    #[test]
    fn parse_batch_extracts_all_rows() {
        let value = json!({
            "embeddings": [
                { "values": [1.0, 0.0] },
                { "values": [0.0, 1.0] }
            ]
        });
        let rows = parse_batch(&value).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![0.0, 1.0]);
    }

    #[test]
    fn non_numeric_values_become_nan() {
        // Validation downstream rejects NaN as NonFinite.
        let value = json!({ "embedding": { "values": ["oops"] } });
        let v = parse_single(&value).unwrap();
        assert!(v[0].is_nan());
    }
}
