//! 认知层：Planner（推理步骤）与对话状态机主循环

pub mod loop_;
pub mod planner;

pub use loop_::{drive, LoopContext, LoopOutcome, MAX_REASONING_STEPS};
pub use planner::{parse_model_output, Planner, PlannerOutput};
