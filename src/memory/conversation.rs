//! 对话渲染：把 Turn 日志转成 LLM 消息
//!
//! 模型只看到 system / user / assistant 三种角色：
//! AssistantTurn 带动作时渲染成它当初输出的 JSON 信封，ActionResultTurn 渲染成一条 Observation 用户消息。

use serde::{Deserialize, Serialize};

use crate::core::Turn;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 单条 Turn 的渲染
pub fn turn_to_message(turn: &Turn) -> Message {
    match turn {
        Turn::User { text } => Message::user(text.clone()),
        Turn::Assistant { text, actions } if actions.is_empty() => Message::assistant(text.clone()),
        Turn::Assistant { text, actions } => {
            let envelope = serde_json::json!({
                "text": text,
                "actions": actions,
            });
            Message::assistant(envelope.to_string())
        }
        Turn::ActionResult {
            action_name,
            invocation_id,
            result,
        } => Message::user(format!(
            "Observation from {action_name} [{invocation_id}]: {result}"
        )),
    }
}

/// 整段历史的渲染（顺序即时间顺序）
pub fn to_llm_messages(turns: &[Turn]) -> Vec<Message> {
    turns.iter().map(turn_to_message).collect()
}
