//! Agent 错误类型
//!
//! 与对话循环配合：参数校验失败、查无空位等业务结果不走这里（它们以普通工具结果回到模型）；
//! 这里只收录「本轮致命」的错误：协议错误与外部服务错误（模型调用、排班存储、检查点）。

use thiserror::Error;

use crate::scheduling::StoreError;

/// 会话处理过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 输入不合法（如 Session API 同时缺少 user_text 与 decision）
    #[error("Validation error: {0}")]
    Validation(String),

    /// 审批协议被违反：无待审批时收到决定，或待审批期间又收到新请求
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("Scheduling store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 协议错误可由调用方修正后重试；其余均视为外部服务失败
    pub fn is_protocol(&self) -> bool {
        matches!(self, AgentError::Protocol(_) | AgentError::Validation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_classification() {
        assert!(AgentError::Protocol("no pending review".into()).is_protocol());
        assert!(AgentError::Validation("empty".into()).is_protocol());
        assert!(!AgentError::Llm("boom".into()).is_protocol());
        assert!(!AgentError::ToolTimeout("book".into()).is_protocol());
    }

    #[test]
    fn test_store_error_converts() {
        let err: AgentError = StoreError::Io("disk full".into()).into();
        assert!(err.to_string().contains("disk full"));
    }
}
