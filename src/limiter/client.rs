//! The limiter client: a thin, stateless-per-node wrapper around a
//! `deadpool-redis` pool plus the two pre-loaded Lua scripts.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use deadpool_redis::{redis::cmd, Pool};
use tracing::warn;

use crate::error::{LimiterError, Result, StoreError};
use crate::limiter::scripts::{admission_script, reconcile_script};
use crate::limiter::Dimension;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Request admitted; `submit_second` must be passed back to
    /// [`LimiterClient::reconcile_output`] once the actual output token
    /// count is known.
    Allow { submit_second: u64 },
    /// Request refused on `dimension`; wait at least `retry_after_ms`
    /// before retrying.
    Deny {
        dimension: Dimension,
        retry_after_ms: u64,
    },
}

/// Redis key layout for one credential/dimension pair:
/// `rl:{credential}:{dimension}:idx|buckets|total`.
fn dimension_keys(credential: &str, dimension: Dimension) -> [String; 3] {
    [
        format!("rl:{credential}:{dimension}:idx"),
        format!("rl:{credential}:{dimension}:buckets"),
        format!("rl:{credential}:{dimension}:total"),
    ]
}

const TTL_SLACK_SECS: u64 = 5;

pub struct LimiterClient {
    pool: Pool,
    window: Duration,
    admission_deadline: Duration,
    reconcile_deadline: Duration,
    bypass: bool,
}

impl LimiterClient {
    /// Build a client around an already-constructed pool. Scripts are loaded
    /// lazily by `redis::Script::invoke_async`, which sends `EVALSHA` first
    /// and transparently falls back to `EVAL` on `NOSCRIPT` — no separate
    /// warm-up step is required, but callers that want to fail fast on a
    /// broken Redis at startup should still issue a `PING` first.
    pub fn new(
        pool: Pool,
        window: Duration,
        admission_deadline: Duration,
        reconcile_deadline: Duration,
        bypass: bool,
    ) -> Self {
        Self {
            pool,
            window,
            admission_deadline,
            reconcile_deadline,
            bypass,
        }
    }

    /// Confirm Redis is reachable. Called once at startup so a misconfigured
    /// `REDIS_URL` fails fast instead of surfacing as per-request 503s.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::PoolExhausted(e.to_string()))?;
        let _: String = cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }

    /// Check and, if admitted, record usage for `credential` across all
    /// three dimensions atomically. `limits` is `(rpm, itpm, otpm)`, as
    /// resolved by the credential registry before this call — the client
    /// itself holds no notion of per-credential configuration.
    pub async fn try_admit(
        &self,
        credential: &str,
        limits: (u64, u64, u64),
        in_req: u64,
        out_req_est: u64,
    ) -> Result<Verdict> {
        if self.bypass {
            let submit_second = now_secs();
            return Ok(Verdict::Allow { submit_second });
        }

        let deadline = self.admission_deadline;
        let outcome = tokio::time::timeout(
            deadline,
            self.admit_inner(credential, limits, in_req, out_req_est),
        )
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(LimiterError::StoreUnavailable(StoreError::Timeout(deadline))),
        }
    }

    async fn admit_inner(
        &self,
        credential: &str,
        limits: (u64, u64, u64),
        in_req: u64,
        out_req_est: u64,
    ) -> Result<Verdict> {
        let [req_idx, req_buckets, req_total] = dimension_keys(credential, Dimension::Req);
        let [in_idx, in_buckets, in_total] = dimension_keys(credential, Dimension::In);
        let [out_idx, out_buckets, out_total] = dimension_keys(credential, Dimension::Out);

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::PoolExhausted(e.to_string()))?;

        let result: Vec<i64> = admission_script()
            .key(req_idx)
            .key(req_buckets)
            .key(req_total)
            .key(in_idx)
            .key(in_buckets)
            .key(in_total)
            .key(out_idx)
            .key(out_buckets)
            .key(out_total)
            .arg(self.window.as_secs())
            .arg(TTL_SLACK_SECS)
            .arg(limits.0)
            .arg(limits.1)
            .arg(limits.2)
            .arg(in_req)
            .arg(out_req_est)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        parse_admission_result(&result)
    }

    /// Adjust the recorded `out` usage for a previously admitted request
    /// once the actual output token count is known. Never denies; a failed
    /// or timed-out reconciliation is logged and dropped — the bucket will
    /// age out of the window on its own.
    pub async fn reconcile_output(&self, credential: &str, submit_second: u64, delta: i64) {
        if self.bypass || delta == 0 {
            return;
        }

        let deadline = self.reconcile_deadline;
        let outcome = tokio::time::timeout(
            deadline,
            self.reconcile_inner(credential, submit_second, delta),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => warn!(credential, error = %error, "token reconciliation failed"),
            Err(_) => warn!(credential, "token reconciliation exceeded its deadline"),
        }
    }

    async fn reconcile_inner(&self, credential: &str, submit_second: u64, delta: i64) -> Result<()> {
        let [idx, buckets, total] = dimension_keys(credential, Dimension::Out);

        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| StoreError::PoolExhausted(e.to_string()))?;

        let _applied: i64 = reconcile_script()
            .key(idx)
            .key(buckets)
            .key(total)
            .arg(submit_second)
            .arg(delta)
            .arg(self.window.as_secs())
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        Ok(())
    }
}

fn parse_admission_result(result: &[i64]) -> Result<Verdict> {
    match result {
        [1, submit_second] => Ok(Verdict::Allow {
            submit_second: (*submit_second).max(0) as u64,
        }),
        [0, dimension_index, retry_after_ms] => {
            let dimension = match dimension_index {
                0 => Dimension::Req,
                1 => Dimension::In,
                2 => Dimension::Out,
                other => {
                    return Err(LimiterError::Internal(format!(
                        "admission script returned unknown dimension index {other}"
                    )))
                }
            };
            Ok(Verdict::Deny {
                dimension,
                retry_after_ms: (*retry_after_ms).max(0) as u64,
            })
        }
        other => Err(LimiterError::Internal(format!(
            "admission script returned unexpected shape: {other:?}"
        ))),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn now_secs() -> u64 {
    now_ms() / 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_allow_result() {
        let verdict = parse_admission_result(&[1, 12345]).unwrap();
        assert_eq!(verdict, Verdict::Allow { submit_second: 12345 });
    }

    #[test]
    fn parses_deny_result_for_each_dimension() {
        assert_eq!(
            parse_admission_result(&[0, 0, 500]).unwrap(),
            Verdict::Deny {
                dimension: Dimension::Req,
                retry_after_ms: 500
            }
        );
        assert_eq!(
            parse_admission_result(&[0, 1, 500]).unwrap(),
            Verdict::Deny {
                dimension: Dimension::In,
                retry_after_ms: 500
            }
        );
        assert_eq!(
            parse_admission_result(&[0, 2, 500]).unwrap(),
            Verdict::Deny {
                dimension: Dimension::Out,
                retry_after_ms: 500
            }
        );
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(parse_admission_result(&[9]).is_err());
        assert!(parse_admission_result(&[0, 9, 1]).is_err());
    }

    #[test]
    fn dimension_keys_share_the_credential_prefix() {
        let keys = dimension_keys("sk-test", Dimension::In);
        assert_eq!(keys[0], "rl:sk-test:in:idx");
        assert_eq!(keys[1], "rl:sk-test:in:buckets");
        assert_eq!(keys[2], "rl:sk-test:in:total");
    }
}
