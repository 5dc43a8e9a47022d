//! 远端护栏服务客户端
//!
//! POST {endpoint}/mask   {"text"}          → {"masked_text", "entities_found"?, "message"?, "data"?}
//! POST {endpoint}/screen {"text", "stage"} → {"message", "data"}
//! HTTP 403 / 422 视为拦截（响应体作为原始诊断），其余非 2xx 与传输错误视为不可用。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::core::{FilterStage, PortError};
use crate::guardrails::{AnonymizationPort, MaskOutcome, SafetyPort, ScreenOutcome};
use crate::pipeline::{extract_scores, is_passed_message, RawDiagnostic};

pub struct HttpGuardrailClient {
    http: Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HttpGuardrailClient {
    pub fn new(endpoint: &str, timeout_secs: u64) -> Result<Self, PortError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PortError::unavailable(format!("http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, PortError> {
        let response = self
            .http
            .post(format!("{}/{}", self.endpoint, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PortError::Timeout(self.timeout_secs)
                } else {
                    PortError::unavailable(e.to_string())
                }
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PortError::unavailable(e.to_string()))?;
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if status == StatusCode::FORBIDDEN || status == StatusCode::UNPROCESSABLE_ENTITY {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("blocked by guardrail service")
                .to_string();
            return Err(PortError::blocked(message, RawDiagnostic::from_value(value)));
        }
        if !status.is_success() {
            return Err(PortError::unavailable(format!(
                "guardrail {path} returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(value)
    }
}

pub(crate) fn parse_mask_response(value: Value, original: &str) -> MaskOutcome {
    let masked_text = value
        .get("masked_text")
        .and_then(Value::as_str)
        .unwrap_or(original)
        .to_string();
    let entities_found = value
        .get("entities_found")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    MaskOutcome {
        masked_text,
        entities_found,
        raw: RawDiagnostic::from_value(value),
    }
}

pub(crate) fn parse_screen_response(value: Value) -> ScreenOutcome {
    let raw = RawDiagnostic::from_value(value);
    let normalized = raw.normalize();
    ScreenOutcome {
        category_scores: extract_scores(&normalized.data).unwrap_or_default(),
        passed: normalized.message.as_deref().map(is_passed_message).unwrap_or(false),
        raw,
    }
}

#[async_trait]
impl AnonymizationPort for HttpGuardrailClient {
    async fn mask(&self, text: &str) -> Result<MaskOutcome, PortError> {
        let value = self.post("mask", json!({"text": text})).await?;
        Ok(parse_mask_response(value, text))
    }
}

#[async_trait]
impl SafetyPort for HttpGuardrailClient {
    async fn screen(&self, text: &str, stage: FilterStage) -> Result<ScreenOutcome, PortError> {
        let value = self
            .post("screen", json!({"text": text, "stage": stage}))
            .await?;
        Ok(parse_screen_response(value))
    }
}
