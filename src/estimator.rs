//! Pure token estimation.
//!
//! Grounded on the corpus's `estimate_request_tokens`/`rough_token_estimate`
//! pattern (sum per-message estimates, fall back to `max_tokens` for output),
//! but biased conservative: this estimate is admitted *before* generation, so
//! it must never undercount input and must treat output at its ceiling.

use crate::model::ChatRequest;

/// Fixed per-message overhead tokens (role marker + framing), added on top of
/// the content-length estimate so short messages are never estimated at zero.
const MESSAGE_OVERHEAD_TOKENS: u64 = 3;

/// Conservative chars-per-token divisor. Smaller than the commonly quoted ~4
/// chars/token average would use on its own; biasing low means the estimate
/// only ever over-counts, never under-counts, which is the safe direction for
/// a pre-generation admission check.
pub(crate) const CHARS_PER_TOKEN: u64 = 3;

/// Estimate `(input_tokens, max_output_tokens)` for a chat request.
///
/// `input_tokens` is monotone in the total length of `messages[*].content`:
/// appending any non-empty text to any message's content can only increase
/// the returned value, never decrease it.
///
/// `max_output_tokens` is the caller-supplied `max_tokens` clamped to
/// `[1, ceiling]`, defaulting to `ceiling` when absent.
pub fn estimate(request: &ChatRequest, output_token_ceiling: u64) -> (u64, u64) {
    let input_tokens = request
        .messages
        .iter()
        .map(|message| estimate_message_tokens(&message.content))
        .sum();

    let max_output_tokens = request
        .max_tokens
        .map(|requested| (requested as u64).clamp(1, output_token_ceiling))
        .unwrap_or(output_token_ceiling);

    (input_tokens, max_output_tokens)
}

fn estimate_message_tokens(content: &str) -> u64 {
    if content.is_empty() {
        return MESSAGE_OVERHEAD_TOKENS;
    }
    let char_count = content.chars().count() as u64;
    // div_ceil so any non-empty content contributes at least one token.
    char_count.div_ceil(CHARS_PER_TOKEN) + MESSAGE_OVERHEAD_TOKENS
}
