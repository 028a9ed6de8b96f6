//! In-memory history sanitation, run before every turn.

use tracing::debug;

use adjutant_protocols::{ContentBlock, Role, SessionMessage};

/// Sanitize a message log:
///
/// 1. keep only the last `max_user_turns` user turns and everything
///    after the last retained user turn;
/// 2. drop tool_use blocks with no matching tool_result in the next
///    non-assistant message, and orphan tool_result blocks;
/// 3. remove messages left empty by the filtering.
pub fn sanitize_history(
    messages: &[SessionMessage],
    max_user_turns: usize,
) -> Vec<SessionMessage> {
    let windowed = window_user_turns(messages, max_user_turns);
    let filtered = drop_orphan_tool_blocks(windowed);
    let kept: Vec<SessionMessage> = filtered
        .into_iter()
        .filter(|m| !m.content.is_empty())
        .collect();

    if kept.len() != messages.len() {
        debug!(
            before = messages.len(),
            after = kept.len(),
            "sanitized session history"
        );
    }
    kept
}

fn window_user_turns(messages: &[SessionMessage], max_user_turns: usize) -> Vec<SessionMessage> {
    let user_count = messages.iter().filter(|m| m.role == Role::User).count();
    if user_count <= max_user_turns {
        return messages.to_vec();
    }

    // Index of the first retained user turn; the loop always finds it
    // because user_count > max_user_turns.
    let mut to_skip = user_count - max_user_turns;
    let mut start = 0;
    for (i, message) in messages.iter().enumerate() {
        if message.role == Role::User {
            if to_skip == 0 {
                start = i;
                break;
            }
            to_skip -= 1;
        }
    }
    messages[start..].to_vec()
}

fn drop_orphan_tool_blocks(mut messages: Vec<SessionMessage>) -> Vec<SessionMessage> {
    let len = messages.len();

    for i in 0..len {
        // tool_use blocks answered by the immediately following
        // non-assistant message.
        if messages[i].role == Role::Assistant {
            let answered: Vec<String> = messages
                .get(i + 1)
                .filter(|next| next.role != Role::Assistant)
                .map(|next| {
                    next.tool_result_ids()
                        .into_iter()
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            messages[i].content.retain(|block| match block {
                ContentBlock::ToolUse { id, .. } => answered.contains(id),
                _ => true,
            });
        }
    }

    for i in 0..len {
        // tool_result blocks answering the immediately preceding
        // assistant message (after its own filtering above).
        if messages[i].role == Role::Tool {
            let asked: Vec<String> = i
                .checked_sub(1)
                .and_then(|p| messages.get(p))
                .filter(|prev| prev.role == Role::Assistant)
                .map(|prev| {
                    prev.tool_use_ids()
                        .into_iter()
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default();

            messages[i].content.retain(|block| match block {
                ContentBlock::ToolResult { tool_use_id, .. } => asked.contains(tool_use_id),
                _ => true,
            });
        }
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(text: &str) -> SessionMessage {
        SessionMessage::user(text)
    }

    fn assistant_with_use(id: &str) -> SessionMessage {
        SessionMessage::assistant_blocks(vec![
            ContentBlock::text("thinking"),
            ContentBlock::ToolUse {
                id: id.into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
        ])
    }

    fn tool_result(id: &str) -> SessionMessage {
        SessionMessage::tool_results(vec![ContentBlock::tool_result(
            id,
            vec![ContentBlock::text("out")],
        )])
    }

    #[test]
    fn clean_history_is_unchanged() {
        let messages = vec![
            user("q"),
            assistant_with_use("c1"),
            tool_result("c1"),
            SessionMessage::assistant("answer"),
        ];
        let sanitized = sanitize_history(&messages, 100);
        assert_eq!(sanitized.len(), 4);
    }

    #[test]
    fn user_window_keeps_the_tail() {
        let mut messages = Vec::new();
        for i in 0..10 {
            messages.push(user(&format!("q{}", i)));
            messages.push(SessionMessage::assistant(format!("a{}", i)));
        }

        let sanitized = sanitize_history(&messages, 3);
        assert_eq!(sanitized.len(), 6);
        assert_eq!(sanitized[0].text(), "q7");
        assert_eq!(sanitized.last().unwrap().text(), "a9");
    }

    #[test]
    fn unanswered_tool_use_is_stripped() {
        let messages = vec![
            user("q"),
            assistant_with_use("c1"),
            user("interrupting question"),
        ];
        let sanitized = sanitize_history(&messages, 100);

        // The assistant message survives (it still has text) but the
        // dangling tool_use block is gone.
        assert_eq!(sanitized.len(), 3);
        assert!(sanitized[1].tool_use_ids().is_empty());
        assert_eq!(sanitized[1].text(), "thinking");
    }

    #[test]
    fn orphan_tool_result_message_is_removed() {
        let messages = vec![user("q"), tool_result("ghost"), SessionMessage::assistant("a")];
        let sanitized = sanitize_history(&messages, 100);
        assert_eq!(sanitized.len(), 2);
        assert!(sanitized.iter().all(|m| m.role != Role::Tool));
    }

    #[test]
    fn partial_tool_answers_strip_only_the_unanswered_use() {
        let assistant = SessionMessage::assistant_blocks(vec![
            ContentBlock::ToolUse {
                id: "c1".into(),
                name: "a".into(),
                input: serde_json::json!({}),
            },
            ContentBlock::ToolUse {
                id: "c2".into(),
                name: "b".into(),
                input: serde_json::json!({}),
            },
        ]);
        let messages = vec![user("q"), assistant, tool_result("c1")];
        let sanitized = sanitize_history(&messages, 100);

        assert_eq!(sanitized[1].tool_use_ids(), vec!["c1"]);
        assert_eq!(sanitized[2].tool_result_ids(), vec!["c1"]);
    }

    #[test]
    fn after_sanitize_pairing_invariant_holds() {
        // A mix of problems at once.
        let messages = vec![
            user("q1"),
            assistant_with_use("c1"),
            // missing answer for c1
            user("q2"),
            tool_result("c9"),
            assistant_with_use("c2"),
            tool_result("c2"),
        ];
        let sanitized = sanitize_history(&messages, 100);

        for (i, message) in sanitized.iter().enumerate() {
            for id in message.tool_use_ids() {
                let answered = sanitized
                    .get(i + 1)
                    .map(|n| n.tool_result_ids().contains(&id))
                    .unwrap_or(false);
                assert!(answered, "tool_use {} unanswered after sanitize", id);
            }
            for id in message.tool_result_ids() {
                let asked = i
                    .checked_sub(1)
                    .and_then(|p| sanitized.get(p))
                    .map(|p| p.tool_use_ids().contains(&id))
                    .unwrap_or(false);
                assert!(asked, "tool_result {} orphaned after sanitize", id);
            }
        }
    }
}
