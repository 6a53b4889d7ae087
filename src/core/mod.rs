//! 核心层：错误、会话状态、路由决策、人工审批闸门

pub mod error;
pub mod review;
pub mod router;
pub mod state;

pub use error::AgentError;
pub use review::{GateOutcome, ReviewDecision, ReviewGate, ReviewPrompt, Verdict};
pub use router::{route, RouteDecision};
pub use state::{ActionInvocation, ConversationState, PendingReview, Turn};
