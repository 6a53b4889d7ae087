//! Ralph - 医疗预约对话助手
//!
//! 模块划分：
//! - **agent**: 组件装配与 Session API（SessionService）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 会话状态、路由决策、人工审批闸门、错误类型
//! - **integrations**: HTTP 传输（feature `web`）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: Turn 渲染与会话检查点（内存 / JSON 文件 / SQLite）
//! - **react**: Planner 与对话状态机主循环
//! - **scheduling**: 排班数据（CSV / 内存后端）与原子更新
//! - **tools**: 五个预约动作、参数校验与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod scheduling;
pub mod tools;

pub use agent::{create_agent_components, AgentComponents, SessionReply, SessionRequest, SessionService};
