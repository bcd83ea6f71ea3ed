//! Stub completion generation. There is no real model behind this service —
//! it exists to exercise the admission/reconciliation path end to end, so the
//! "generation" is a deterministic echo, and the only thing that matters is
//! that its token count is derivable the same way a real provider's would be.

use crate::estimator::CHARS_PER_TOKEN;
use crate::model::ChatRequest;

/// A generated reply plus the actual number of output tokens it consumed,
/// capped at `max_output_tokens` the way a real provider would stop at
/// `max_tokens`.
pub struct MockCompletion {
    pub content: String,
    pub completion_tokens: u64,
}

/// Produce a deterministic reply for `request`, truncated to at most
/// `max_output_tokens`. The reply echoes the last user message so repeated
/// calls with the same input are exact-reproducible, which test harnesses
/// rely on.
pub fn generate(request: &ChatRequest, max_output_tokens: u64) -> MockCompletion {
    let last_user_content = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == "user")
        .map(|message| message.content.as_str())
        .unwrap_or("");

    let full_reply = format!("Acknowledged: {last_user_content}");
    let max_chars = (max_output_tokens * CHARS_PER_TOKEN) as usize;

    let truncated: String = full_reply.chars().take(max_chars.max(1)).collect();
    let completion_tokens = (truncated.chars().count() as u64)
        .div_ceil(CHARS_PER_TOKEN)
        .min(max_output_tokens)
        .max(1);

    MockCompletion {
        content: truncated,
        completion_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Message;

    fn chat(content: &str) -> ChatRequest {
        ChatRequest {
            model: "mock-1".to_owned(),
            messages: vec![Message {
                role: "user".to_owned(),
                content: content.to_owned(),
            }],
            max_tokens: None,
        }
    }

    #[test]
    fn echoes_last_user_message() {
        let completion = generate(&chat("hello there"), 4096);
        assert!(completion.content.contains("hello there"));
    }

    #[test]
    fn completion_tokens_never_exceed_ceiling() {
        let completion = generate(&chat("a very long message ".repeat(100).as_str()), 10);
        assert!(completion.completion_tokens <= 10);
    }

    #[test]
    fn deterministic_across_calls() {
        let request = chat("same input every time");
        let first = generate(&request, 4096);
        let second = generate(&request, 4096);
        assert_eq!(first.content, second.content);
        assert_eq!(first.completion_tokens, second.completion_tokens);
    }

    #[test]
    fn completion_tokens_are_at_least_one() {
        let completion = generate(&chat(""), 4096);
        assert!(completion.completion_tokens >= 1);
    }
}
