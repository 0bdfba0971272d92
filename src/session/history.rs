//! History views over a session's message log.
//!
//! These functions shape what the provider sees. They never rewrite the
//! stored log.

use crate::session::{Message, Role};

/// Keep only the messages belonging to the last `limit` user turns.
///
/// A turn starts at a user message and runs until the next one. A `limit`
/// of zero, or a history with no more than `limit` user turns, is returned
/// unchanged.
///
/// # Example
/// ```
/// use taskclaw::session::{history::limit_history_turns, Message};
///
/// let messages = vec![
///     Message::user("one"),
///     Message::assistant("1"),
///     Message::user("two"),
///     Message::assistant("2"),
/// ];
/// let limited = limit_history_turns(&messages, 1);
/// assert_eq!(limited.len(), 2);
/// assert_eq!(limited[0].content, "two");
/// ```
pub fn limit_history_turns(messages: &[Message], limit: usize) -> Vec<Message> {
    if limit == 0 || messages.is_empty() {
        return messages.to_vec();
    }

    let mut user_count = 0;
    let mut last_user_index = messages.len();

    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::User {
            user_count += 1;
            if user_count > limit {
                return messages[last_user_index..].to_vec();
            }
            last_user_index = i;
        }
    }

    messages.to_vec()
}

/// Split a log into its System messages and everything else, preserving
/// relative order within each part.
pub fn split_head(messages: &[Message]) -> (Vec<Message>, Vec<Message>) {
    messages
        .iter()
        .cloned()
        .partition(|m| m.role == Role::System)
}

/// The provider-bound view of a log: System head first, then the body
/// limited to the last `turn_limit` user turns.
pub fn provider_view(messages: &[Message], turn_limit: usize) -> Vec<Message> {
    if turn_limit == 0 {
        return messages.to_vec();
    }
    let (mut head, body) = split_head(messages);
    head.extend(limit_history_turns(&body, turn_limit));
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convo() -> Vec<Message> {
        vec![
            Message::system("catalogue"),
            Message::user("a"),
            Message::assistant("A"),
            Message::user("b"),
            Message::assistant("B"),
            Message::user("c"),
            Message::assistant("C"),
        ]
    }

    #[test]
    fn test_zero_limit_is_identity() {
        assert_eq!(limit_history_turns(&convo(), 0).len(), 7);
    }

    #[test]
    fn test_limit_above_turn_count_is_identity() {
        assert_eq!(limit_history_turns(&convo(), 10).len(), 7);
    }

    #[test]
    fn test_limit_two_turns() {
        let limited = limit_history_turns(&convo(), 2);
        let contents: Vec<&str> = limited.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "B", "c", "C"]);
    }

    #[test]
    fn test_split_head_moves_system_first() {
        let mut messages = convo();
        messages.insert(3, Message::system("[Conversation Summary]\nx"));
        let (head, body) = split_head(&messages);
        assert_eq!(head.len(), 2);
        assert_eq!(body.len(), 6);
    }

    #[test]
    fn test_provider_view_keeps_head() {
        let view = provider_view(&convo(), 1);
        let contents: Vec<&str> = view.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["catalogue", "c", "C"]);
    }
}
