use crate::models::{ChatMessage, MessageRole};

// ============================================================================
// Conversation Reducer
// ============================================================================
//
// Streaming updates are expressed as pure functions over the message list:
// (current, input) -> next. The session never mutates a message in place,
// which keeps every intermediate conversation state directly assertable.

/// Append the empty assistant placeholder a streaming turn writes into.
pub fn begin_assistant_turn(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut next = messages.to_vec();
    next.push(ChatMessage::assistant_placeholder());
    next
}

/// Append one content delta to the in-progress assistant message.
///
/// If the last message is not an assistant message (no turn in progress)
/// the delta is dropped rather than misattributed.
pub fn apply_delta(messages: &[ChatMessage], delta: &str) -> Vec<ChatMessage> {
    let mut next = messages.to_vec();
    if let Some(last) = next.last_mut() {
        if last.role == MessageRole::Assistant {
            last.content.push_str(delta);
        }
    }
    next
}

/// Drop the trailing assistant placeholder after a failed turn, leaving the
/// rest of the history untouched. A no-op when no placeholder is present.
pub fn discard_placeholder(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    match messages.last() {
        Some(last) if last.role == MessageRole::Assistant => {
            messages[..messages.len() - 1].to_vec()
        }
        _ => messages.to_vec(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_turn_appends_placeholder() {
        let messages = vec![ChatMessage::user("hi")];
        let next = begin_assistant_turn(&messages);

        assert_eq!(next.len(), 2);
        assert_eq!(next[1].role, MessageRole::Assistant);
        assert!(next[1].content.is_empty());
        // Input untouched.
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn test_apply_delta_grows_last_message() {
        let messages = begin_assistant_turn(&[ChatMessage::user("hi")]);
        let next = apply_delta(&messages, "Hel");
        let next = apply_delta(&next, "lo");

        assert_eq!(next.last().unwrap().content, "Hello");
        // Earlier states keep their snapshots.
        assert!(messages.last().unwrap().content.is_empty());
    }

    #[test]
    fn test_apply_delta_without_placeholder_is_dropped() {
        let messages = vec![ChatMessage::user("hi")];
        let next = apply_delta(&messages, "stray");
        assert_eq!(next, messages);
    }

    #[test]
    fn test_discard_placeholder() {
        let messages = begin_assistant_turn(&[ChatMessage::user("hi")]);
        let next = discard_placeholder(&messages);

        assert_eq!(next.len(), 1);
        assert_eq!(next[0].role, MessageRole::User);
    }

    #[test]
    fn test_discard_keeps_user_message_when_no_placeholder() {
        let messages = vec![ChatMessage::user("hi")];
        let next = discard_placeholder(&messages);
        assert_eq!(next, messages);
    }

    #[test]
    fn test_discard_removes_partial_content() {
        let messages = begin_assistant_turn(&[ChatMessage::user("hi")]);
        let messages = apply_delta(&messages, "partial answ");
        let next = discard_placeholder(&messages);

        assert_eq!(next.len(), 1);
        assert!(next.iter().all(|m| m.role == MessageRole::User));
    }
}
