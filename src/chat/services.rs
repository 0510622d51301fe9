use tracing::{error, info};
use uuid::Uuid;

use super::client::{ChatGateway, ChatTurn};
use super::repo::{Message, MessageRepo, Role};

/// Turns of conversation sent along with each new message.
pub const HISTORY_TURNS: i64 = 10;
pub const FALLBACK_REPLY: &str = "Sorry, there was an error generating the response.";

#[derive(Debug)]
pub struct ChatReply {
    pub user_message: Message,
    /// `None` when the completion failed and the fallback text was returned.
    pub reply: Option<Message>,
    pub content: String,
}

/// Stores the user's message, asks the coach for a reply and stores it.
pub async fn reply(
    messages: &dyn MessageRepo,
    gateway: &dyn ChatGateway,
    user_id: Uuid,
    content: &str,
) -> anyhow::Result<ChatReply> {
    let user_message = messages.insert(user_id, Role::User, content).await?;

    let history: Vec<ChatTurn> = messages
        .recent(user_id, HISTORY_TURNS)
        .await?
        .into_iter()
        .map(|m| ChatTurn {
            role: m.role.as_completion_role(),
            content: m.content,
        })
        .collect();

    match gateway.complete(&history).await {
        Ok(text) => {
            let stored = messages.insert(user_id, Role::Ai, &text).await?;
            info!(%user_id, turns = history.len(), "coach replied");
            Ok(ChatReply {
                user_message,
                content: text,
                reply: Some(stored),
            })
        }
        Err(e) => {
            error!(error = %e, %user_id, "chat completion failed");
            Ok(ChatReply {
                user_message,
                reply: None,
                content: FALLBACK_REPLY.to_string(),
            })
        }
    }
}
