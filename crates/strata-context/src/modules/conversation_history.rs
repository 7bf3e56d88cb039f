//! Conversation history module.
//!
//! Renders the session's chat object, excluding messages marked
//! invalid. Under budget pressure a sliding window keeps the most
//! recent user/assistant pairs; the last pair survives as long as it
//! fits at all.

use async_trait::async_trait;

use strata_core::ProfileKind;
use strata_session::{ChatMessage, ChatRole};

use crate::module::{AssemblyContext, ContextModule, Contribution};

/// Contributes multi-turn conversation history.
pub struct ConversationHistoryModule;

impl ConversationHistoryModule {
    fn valid_messages(ctx: &AssemblyContext) -> Vec<ChatMessage> {
        ctx.session
            .as_ref()
            .map(|s| s.valid_messages().cloned().collect())
            .unwrap_or_default()
    }

    fn format_messages(messages: &[ChatMessage]) -> String {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::User => "User",
                    ChatRole::Assistant => "Assistant",
                };
                format!("{role}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Keep the most recent messages that fit the budget, never fewer
    /// than the final pair.
    fn sliding_window(messages: &[ChatMessage], budget: usize, ctx: &AssemblyContext) -> Vec<ChatMessage> {
        if messages.len() <= 2 {
            return messages.to_vec();
        }

        let mut kept: Vec<ChatMessage> = Vec::new();
        let mut used = 0usize;
        for message in messages.iter().rev() {
            let cost = ctx
                .estimator
                .estimate_messages(std::slice::from_ref(&message.content.as_str()));
            if used.saturating_add(cost) > budget && kept.len() >= 2 {
                break;
            }
            used = used.saturating_add(cost);
            kept.push(message.clone());
        }
        kept.reverse();
        kept
    }
}

#[async_trait]
impl ContextModule for ConversationHistoryModule {
    fn module_id(&self) -> &'static str {
        "conversation_history"
    }

    fn applies_to(&self, _kind: ProfileKind) -> bool {
        true
    }

    async fn contribute(&self, budget: usize, ctx: &AssemblyContext) -> Contribution {
        let messages = Self::valid_messages(ctx);
        if messages.is_empty() {
            return Contribution::empty("no history");
        }

        let total_available = messages.len();
        let windowed = Self::sliding_window(&messages, budget, ctx);
        let mode = if windowed.len() == total_available {
            "full"
        } else {
            "windowed"
        };
        let kept = windowed.len();
        let content = Self::format_messages(&windowed);

        Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "messages_kept": kept,
                "messages_available": total_available,
                "mode": mode,
            }),
            true,
        )
    }

    async fn condense(
        &self,
        _content: &str,
        target_tokens: usize,
        ctx: &AssemblyContext,
    ) -> Option<Contribution> {
        let messages = Self::valid_messages(ctx);
        if messages.is_empty() {
            return Some(Contribution::empty("no history"));
        }
        let windowed = Self::sliding_window(&messages, target_tokens, ctx);
        let kept = windowed.len();
        let content = Self::format_messages(&windowed);
        Some(Contribution::text(
            content,
            &ctx.estimator,
            serde_json::json!({
                "messages_kept": kept,
                "mode": "windowed",
                "condensed": true,
            }),
            true,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use strata_core::{OwnerId, ProfileId};
    use strata_session::Session;

    fn ctx_with_history(pairs: usize) -> AssemblyContext {
        let mut session = Session::new(OwnerId::new(), ProfileId::new());
        for i in 0..pairs {
            session.push_message(ChatMessage::user(format!("question {i} {}", "x".repeat(200))));
            session.push_message(ChatMessage::assistant(format!("answer {i} {}", "y".repeat(200))));
        }
        let mut ctx = AssemblyContext::new(ProfileKind::LlmOnly, (pairs as u64) + 1, "q");
        ctx.session = Some(Arc::new(session));
        ctx
    }

    #[tokio::test]
    async fn test_empty_session() {
        let mut ctx = AssemblyContext::new(ProfileKind::LlmOnly, 1, "q");
        ctx.session = Some(Arc::new(Session::new(OwnerId::new(), ProfileId::new())));
        let c = ConversationHistoryModule.contribute(500, &ctx).await;
        assert_eq!(c.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_full_history_when_it_fits() {
        let ctx = ctx_with_history(2);
        let c = ConversationHistoryModule.contribute(10_000, &ctx).await;
        assert_eq!(c.metadata["mode"], "full");
        assert_eq!(c.metadata["messages_kept"], 4);
    }

    #[tokio::test]
    async fn test_window_keeps_most_recent() {
        let ctx = ctx_with_history(10);
        let c = ConversationHistoryModule.contribute(200, &ctx).await;
        assert_eq!(c.metadata["mode"], "windowed");
        // The newest pair always survives.
        assert!(c.content.contains("question 9"));
        assert!(c.content.contains("answer 9"));
        assert!(!c.content.contains("question 0"));
    }

    #[tokio::test]
    async fn test_last_pair_retained_even_over_budget() {
        let ctx = ctx_with_history(5);
        let c = ConversationHistoryModule.contribute(1, &ctx).await;
        assert!(c.content.contains("question 4"));
        assert!(c.content.contains("answer 4"));
    }

    #[tokio::test]
    async fn test_invalid_messages_excluded() {
        let mut session = Session::new(OwnerId::new(), ProfileId::new());
        session.push_message(ChatMessage::user("good"));
        session.push_message(ChatMessage::user("bad turn"));
        session.invalidate_last_message();
        let mut ctx = AssemblyContext::new(ProfileKind::LlmOnly, 2, "q");
        ctx.session = Some(Arc::new(session));

        let c = ConversationHistoryModule.contribute(1000, &ctx).await;
        assert!(c.content.contains("good"));
        assert!(!c.content.contains("bad turn"));
    }

    #[tokio::test]
    async fn test_condense_shrinks() {
        let ctx = ctx_with_history(10);
        let full = ConversationHistoryModule.contribute(100_000, &ctx).await;
        let condensed = ConversationHistoryModule
            .condense(&full.content, 150, &ctx)
            .await
            .unwrap();
        assert!(condensed.tokens_used < full.tokens_used);
    }
}
