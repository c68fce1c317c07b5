//! Language-model gateway
//!
//! Used for the open-ended intent-classification fallback and the
//! free-form start-menu replies. The production path is an
//! OpenAI-compatible chat client wrapped in `ResilientLlm`, a layered
//! strategy: primary call → retry with backoff → tool-less degraded call
//! → canned fallback. A gateway failure never crashes a turn.

mod error;
mod openai;
mod resilient;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAiChat;
pub use resilient::{canned_reply, ResilientLlm};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of conversational context sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A function the model may decide to call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// What the model produced: free text or a structured function call.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    Text(String),
    FunctionCall { name: String, arguments: Value },
}

#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError>;
}

#[async_trait]
impl<T: LlmGateway + ?Sized> LlmGateway for std::sync::Arc<T> {
    async fn complete(
        &self,
        turns: &[ChatTurn],
        tools: &[FunctionSpec],
    ) -> Result<LlmReply, LlmError> {
        (**self).complete(turns, tools).await
    }
}
