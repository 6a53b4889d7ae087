//! LLM 客户端抽象
//!
//! 模型被当作黑盒：输入有序消息，输出一段文本（纯文本回复或 JSON 动作信封，由 Planner 解析）。

use async_trait::async_trait;

use crate::memory::Message;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)，默认全 0
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
