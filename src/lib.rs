//! Distributed, multi-dimensional sliding-window rate limiting in front of an
//! OpenAI-compatible chat-completions endpoint.
//!
//! Three dimensions are enforced per credential — requests, input tokens,
//! output tokens — each over an independent per-second sliding window backed
//! by Redis. A single Lua script performs prune-check-admit atomically per
//! request, which is what makes the limiter correct across any number of
//! nodes sharing the same Redis without locks or compare-and-swap retries.
//!
//! Output tokens are admitted against a conservative estimate and
//! reconciled against the actual count once the mock completion is
//! generated, so recorded usage tracks reality rather than the estimate
//! forever.

pub mod config;
pub mod error;
pub mod estimator;
pub mod http;
pub mod limiter;
pub mod mock;
pub mod model;
pub mod registry;

pub use config::Config;
pub use error::{ConfigError, LimiterError, Result, StoreError};
pub use limiter::{Dimension, LimiterClient, Verdict};
pub use model::{ChatRequest, Message};
pub use registry::{CredentialLimits, CredentialRegistry};
