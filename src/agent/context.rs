//! Context window selection
//!
//! Picks the most recent slice of history that fits a token budget. The
//! system prompt always goes first and counts against the budget.

use crate::core::{Message, Role};

/// Messages chosen for one provider call
#[derive(Debug, Clone)]
pub struct ContextSelection {
    /// System prompt followed by the kept history, oldest first
    pub messages: Vec<Message>,
    /// History messages left out
    pub dropped: usize,
    /// Estimated tokens of `messages`
    pub tokens_used: usize,
    pub budget: usize,
    /// Budget after the safety margin
    pub limit: usize,
    /// The latest message alone did not fit and was included anyway
    pub overflowed: bool,
}

/// Budgets history against a token estimator
#[derive(Debug, Clone, Copy)]
pub struct ContextWindowManager {
    safety_margin: f64,
}

impl Default for ContextWindowManager {
    fn default() -> Self {
        Self { safety_margin: 0.10 }
    }
}

impl ContextWindowManager {
    pub fn new(safety_margin: f64) -> Self {
        Self {
            safety_margin: safety_margin.clamp(0.0, 0.99),
        }
    }

    pub fn safety_margin(&self) -> f64 {
        self.safety_margin
    }

    /// Budget after the margin is held back
    pub fn limit_for(&self, token_budget: usize) -> usize {
        (token_budget as f64 * (1.0 - self.safety_margin)).floor() as usize
    }

    /// Select the newest history that fits `token_budget`.
    ///
    /// The walk goes newest to oldest and stops at the first message that would
    /// push the total over the limit. The newest message is always kept. Tool
    /// results left at the front without their requesting message are dropped
    /// too, while more than one message remains.
    pub fn select<E>(
        &self,
        system: &Message,
        history: &[Message],
        token_budget: usize,
        estimator: E,
    ) -> ContextSelection
    where
        E: Fn(&[Message]) -> usize,
    {
        let limit = self.limit_for(token_budget);
        // System prompt followed by the kept suffix of history, oldest first.
        // The estimator always sees the whole window so its rounding matches
        // what the provider will measure.
        let mut window = vec![system.clone()];
        let mut start = history.len();
        let mut overflowed = false;

        for (idx, message) in history.iter().enumerate().rev() {
            window.insert(1, message.clone());
            if estimator(window.as_slice()) <= limit {
                start = idx;
                continue;
            }
            if idx == history.len() - 1 {
                start = idx;
                overflowed = true;
            } else {
                window.remove(1);
            }
            break;
        }

        while start + 1 < history.len() && history[start].role == Role::Tool && start > 0 {
            window.remove(1);
            start += 1;
        }

        let tokens_used = estimator(window.as_slice());

        ContextSelection {
            messages: window,
            dropped: start,
            tokens_used,
            budget: token_budget,
            limit,
            overflowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ToolCallRequest, ToolResult};
    use crate::llm::heuristic_token_estimate;

    /// One token per character, no framing
    fn chars(messages: &[Message]) -> usize {
        messages.iter().map(|m| m.content.len()).sum()
    }

    fn history(sizes: &[usize]) -> Vec<Message> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, n)| {
                if i % 2 == 0 {
                    Message::user("u".repeat(*n))
                } else {
                    Message::assistant("a".repeat(*n))
                }
            })
            .collect()
    }

    #[test]
    fn test_everything_fits() {
        let mgr = ContextWindowManager::default();
        let sys = Message::system("s".repeat(10));
        let hist = history(&[10, 10, 10]);

        let sel = mgr.select(&sys, &hist, 100, chars);
        assert_eq!(sel.messages.len(), 4);
        assert_eq!(sel.dropped, 0);
        assert_eq!(sel.tokens_used, 40);
        assert_eq!(sel.limit, 90);
        assert!(!sel.overflowed);
    }

    #[test]
    fn test_drops_oldest_first() {
        let mgr = ContextWindowManager::new(0.0);
        let sys = Message::system("s".repeat(10));
        let hist = history(&[30, 30, 30, 30]);

        let sel = mgr.select(&sys, &hist, 75, chars);
        assert_eq!(sel.dropped, 2);
        assert_eq!(sel.messages.len(), 3);
        assert_eq!(sel.messages[0].role, Role::System);
        assert_eq!(sel.tokens_used, 70);
        assert!(sel.tokens_used <= sel.limit);
    }

    #[test]
    fn test_stops_at_first_overflow() {
        let mgr = ContextWindowManager::new(0.0);
        let sys = Message::system("");
        // the 50 blocks the walk even though the older 5 would fit
        let hist = history(&[5, 50, 10]);

        let sel = mgr.select(&sys, &hist, 30, chars);
        assert_eq!(sel.dropped, 2);
        assert_eq!(sel.messages[1].content.len(), 10);
    }

    #[test]
    fn test_single_message_overflow() {
        let mgr = ContextWindowManager::default();
        let sys = Message::system("s".repeat(10));
        let hist = history(&[10, 500]);

        let sel = mgr.select(&sys, &hist, 100, chars);
        assert!(sel.overflowed);
        assert_eq!(sel.messages.len(), 2);
        assert_eq!(sel.dropped, 1);
        assert!(sel.tokens_used > sel.limit);
    }

    #[test]
    fn test_orphaned_tool_results_dropped() {
        let mgr = ContextWindowManager::new(0.0);
        let sys = Message::system("");
        let hist = vec![
            Message::user("u".repeat(20)),
            Message::assistant_with_tool_calls(
                "a".repeat(40),
                vec![ToolCallRequest::new("c1", "list_releases", "")],
            ),
            Message::tool_result(&ToolResult::success("c1", "list_releases", "t".repeat(10))),
            Message::assistant("done"),
        ];

        let sel = mgr.select(&sys, &hist, 20, chars);
        assert_eq!(sel.messages.len(), 2);
        assert_eq!(sel.messages[1].content, "done");
        assert_eq!(sel.dropped, 3);
        assert_eq!(sel.tokens_used, 4);
    }

    #[test]
    fn test_budget_property_with_heuristic() {
        let mgr = ContextWindowManager::default();
        let sys = Message::system("You are a helpful AI assistant.");
        for n in 1..40 {
            let hist = history(&vec![37; n]);
            let sel = mgr.select(&sys, &hist, 120, heuristic_token_estimate);
            assert_eq!(sel.messages[0].role, Role::System);
            assert_eq!(sel.dropped + sel.messages.len() - 1, n);
            assert_eq!(sel.tokens_used, heuristic_token_estimate(&sel.messages));
            if !sel.overflowed {
                assert!(heuristic_token_estimate(&sel.messages) <= sel.budget);
                assert!(sel.tokens_used <= sel.limit);
            }
        }
    }

    #[test]
    fn test_short_messages_measured_as_a_whole() {
        // Per-message rounding would admit far more of these than fit.
        let mgr = ContextWindowManager::default();
        let sys = Message::system("");
        let hist: Vec<Message> = (0..40).map(|_| Message::user("abc")).collect();

        let sel = mgr.select(&sys, &hist, 100, heuristic_token_estimate);
        assert!(!sel.overflowed);
        let measured = heuristic_token_estimate(&sel.messages);
        assert!(measured <= sel.limit, "selected {} tokens, limit {}", measured, sel.limit);
        assert!(measured <= sel.budget);
        assert_eq!(sel.tokens_used, measured);
        assert!(sel.dropped > 0);
    }
}
