//! 记忆层：对话渲染（Turn -> LLM 消息）与会话检查点

pub mod checkpoint;
pub mod conversation;

pub use checkpoint::{
    create_checkpoint, FileCheckpoint, MemoryCheckpoint, SessionCheckpoint, SqliteCheckpoint,
};
pub use conversation::{to_llm_messages, turn_to_message, Message, Role};
