//! Distributed admission control: three sliding-window dimensions enforced by
//! one atomic Lua script per call, the same correctness anchor the corpus's
//! Redis rate limit stores use (`redis::Script` + `invoke_async`), generalised
//! here to per-second buckets with incrementally maintained aggregates so a
//! check costs O(expired buckets + 1) rather than O(window).

mod client;
mod scripts;

pub use client::{LimiterClient, Verdict};

use std::fmt;

/// Which of the three quotas a request is checked and possibly denied against.
/// Checked and reported in this fixed order: `Req`, `In`, `Out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Req,
    In,
    Out,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Req => "req",
            Dimension::In => "in",
            Dimension::Out => "out",
        };
        f.write_str(name)
    }
}
