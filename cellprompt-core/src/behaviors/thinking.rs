//! Reasoning segment stripping
//!
//! Some reasoning models answer with a JSON array such as
//! `[{"type":"thinking",...},{"type":"text","text":"42"}]`. Only the `text`
//! segments are the answer. Anything else is left untouched.

use super::BehaviorContext;
use crate::protocol::{Prompt, Role};
use serde_json::Value;

pub(super) fn is_enabled(ctx: &BehaviorContext<'_>) -> bool {
    ctx.capabilities.emits_thinking_segments
}

pub(super) fn after(mut prompt: Prompt) -> Prompt {
    if let Some(message) = prompt.messages.last_mut() {
        if message.role == Role::Assistant {
            if let Some(answer) = answer_text(&message.content) {
                message.content = answer;
            }
        }
    }
    prompt
}

/// Concatenated `text` segments, or `None` if `content` is not a segment array
pub fn answer_text(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if !trimmed.starts_with('[') {
        return None;
    }

    let segments: Vec<Value> = serde_json::from_str(trimmed).ok()?;
    let mut found = false;
    let mut answer = String::new();
    for segment in &segments {
        if segment.get("type").and_then(Value::as_str) == Some("text") {
            if let Some(text) = segment.get("text").and_then(Value::as_str) {
                answer.push_str(text);
                found = true;
            }
        }
    }
    found.then_some(answer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Message, PromptBuilder};
    use test_case::test_case;

    #[test]
    fn test_extracts_answer() {
        let raw = r#"[{"type":"thinking","thinking":[{"type":"text","text":"let me think"}]},{"type":"text","text":"42"}]"#;
        let prompt = PromptBuilder::new()
            .user("q")
            .build()
            .with_message(Message::assistant(raw));
        assert_eq!(after(prompt).last_assistant_text(), Some("42"));
    }

    #[test_case("plain answer" ; "plain text")]
    #[test_case("[not json" ; "broken json")]
    #[test_case("[1, 2, 3]" ; "array without segments")]
    #[test_case(r#"[{"type":"thinking","thinking":"x"}]"# ; "only thinking")]
    #[test_case(r#"{"data":["a"]}"# ; "structured answer")]
    fn test_leaves_other_content(content: &str) {
        let prompt = PromptBuilder::new()
            .user("q")
            .build()
            .with_message(Message::assistant(content));
        assert_eq!(after(prompt).last_assistant_text(), Some(content));
    }
}
