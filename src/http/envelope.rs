//! The OpenAI-shaped response envelope and error bodies.

use serde::Serialize;

use crate::model::Message;

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
    pub node_id: String,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ErrorBody {
    pub fn simple(kind: &'static str) -> Self {
        Self {
            error: ErrorDetail {
                kind,
                dimension: None,
                retry_after_ms: None,
            },
        }
    }

    pub fn rate_limited(dimension: impl ToString, retry_after_ms: u64) -> Self {
        Self {
            error: ErrorDetail {
                kind: "rate_limit_exceeded",
                dimension: Some(dimension.to_string()),
                retry_after_ms: Some(retry_after_ms),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub node_id: String,
}
