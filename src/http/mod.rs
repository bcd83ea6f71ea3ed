//! The HTTP surface: `POST /v1/chat/completions` and `GET /healthz`.
//!
//! Routing and middleware follow the corpus's axum convention (`Router` +
//! `with_state` + a `tower_http::trace::TraceLayer`), adapted from the
//! webhook-consumer pattern seen in the VK Teams bot crate.

mod envelope;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::LimiterError;
use crate::estimator;
use crate::limiter::{Dimension, LimiterClient, Verdict};
use crate::mock;
use crate::model::{ChatRequest, Message};
use crate::registry::CredentialRegistry;

use envelope::{ChatCompletionResponse, Choice, ErrorBody, HealthResponse, Usage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<CredentialRegistry>,
    pub limiter: Arc<LimiterClient>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        node_id: state.config.node_id.clone(),
    })
}

async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let credential = match extract_bearer(&headers) {
        Some(credential) => credential,
        None => return LimiterError::UnknownCredential.into_response(),
    };

    let Json(request) = match body {
        Ok(json) => json,
        Err(rejection) => {
            return LimiterError::InvalidRequest(rejection.to_string()).into_response();
        }
    };

    if let Err(reason) = request.validate() {
        return LimiterError::InvalidRequest(reason).into_response();
    }

    let Some(limits) = state.registry.limits_for(&credential) else {
        return LimiterError::UnknownCredential.into_response();
    };

    let (input_tokens, max_output_tokens) = estimator::estimate(&request, state.config.output_token_ceiling);

    let verdict = match state
        .limiter
        .try_admit(
            &credential,
            (limits.rpm, limits.itpm, limits.otpm),
            input_tokens,
            max_output_tokens,
        )
        .await
    {
        Ok(verdict) => verdict,
        Err(error) => return error.into_response(),
    };

    let submit_second = match verdict {
        Verdict::Allow { submit_second } => submit_second,
        Verdict::Deny {
            dimension,
            retry_after_ms,
        } => {
            return LimiterError::RateLimited {
                dimension,
                retry_after_ms,
            }
            .into_response();
        }
    };

    let completion = mock::generate(&request, max_output_tokens);

    state
        .limiter
        .reconcile_output(
            &credential,
            submit_second,
            completion.completion_tokens as i64 - max_output_tokens as i64,
        )
        .await;

    info!(
        credential = %credential,
        input_tokens,
        completion_tokens = completion.completion_tokens,
        "admitted chat completion"
    );

    let response = ChatCompletionResponse {
        id: format!("chatcmpl-{}-{}", state.config.node_id, submit_second),
        object: "chat.completion",
        created: unix_now(),
        model: request.model.clone(),
        choices: vec![Choice {
            index: 0,
            message: Message {
                role: "assistant".to_owned(),
                content: completion.content,
            },
            finish_reason: "stop",
        }],
        usage: Usage {
            prompt_tokens: input_tokens,
            completion_tokens: completion.completion_tokens,
            total_tokens: input_tokens + completion.completion_tokens,
        },
        node_id: state.config.node_id.clone(),
    };

    (StatusCode::OK, Json(response)).into_response()
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let credential = raw.strip_prefix("Bearer ")?.trim();
    if credential.is_empty() {
        None
    } else {
        Some(credential.to_owned())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl IntoResponse for LimiterError {
    fn into_response(self) -> Response {
        match self {
            LimiterError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody::simple("invalid_request"))).into_response()
            }
            LimiterError::UnknownCredential => {
                (StatusCode::UNAUTHORIZED, Json(ErrorBody::simple("invalid_api_key"))).into_response()
            }
            LimiterError::RateLimited {
                dimension,
                retry_after_ms,
            } => {
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, Json(ErrorBody::rate_limited(dimension, retry_after_ms)))
                        .into_response();
                let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
                response
            }
            LimiterError::StoreUnavailable(ref source) => {
                warn!(error = %source, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorBody::simple("upstream_unavailable"))).into_response()
            }
            LimiterError::Internal(ref message) => {
                warn!(error = %message, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::simple("internal_error"))).into_response()
            }
        }
    }
}
