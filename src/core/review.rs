//! 人工审批闸门
//!
//! 挂起不是阻塞读：open 把待审批调用写进 ConversationState 后直接返回 Suspended，
//! 调用方保存检查点并把 ReviewPrompt 交给人；之后由一次全新的调用带着 ReviewDecision 进入 resume。
//!
//! 同一批次中每个受保护调用逐一审批（一次只挂一个）；全部有了处置后 open 返回 Ready，循环进入执行。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::state::{ActionInvocation, ConversationState, PendingReview, Turn};
use crate::core::AgentError;

/// 人工决定（与传输层 `{action, data}` 载荷一致）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    /// "continue" | "reject" | 其他
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl ReviewDecision {
    pub fn approve() -> Self {
        Self {
            action: "continue".to_string(),
            data: None,
        }
    }

    pub fn reject(reason: Option<String>) -> Self {
        Self {
            action: "reject".to_string(),
            data: reason,
        }
    }

    /// 命令行里的口语化输入：yes / y / approve / continue 批准，no / n / reject 拒绝
    pub fn from_cli_input(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "yes" | "y" | "approve" | "continue" => Some(Self::approve()),
            "no" | "n" | "reject" => Some(Self::reject(None)),
            _ => None,
        }
    }

    /// 把决定归一为批准 / 拒绝；strict 时无法识别的决定按拒绝处理
    pub fn disposition(&self, strict: bool) -> Disposition {
        match self.action.trim().to_lowercase().as_str() {
            "continue" => Disposition::Approve,
            "reject" => Disposition::Reject(self.reason()),
            other => {
                if strict {
                    tracing::warn!(action = other, "unrecognised review decision, rejecting (strict)");
                    Disposition::Reject(self.reason())
                } else {
                    tracing::warn!(action = other, "unrecognised review decision, approving by default");
                    Disposition::Approve
                }
            }
        }
    }

    fn reason(&self) -> Option<String> {
        self.data
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Disposition {
    Approve,
    Reject(Option<String>),
}

/// 交给人看的调用摘要
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvocationView {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// 挂起时对外的载荷 `{message, invocation}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewPrompt {
    pub message: String,
    pub invocation: InvocationView,
}

impl ReviewPrompt {
    pub fn for_invocation(invocation: &ActionInvocation) -> Self {
        Self {
            message: format!(
                "Approval required for '{}'. Reply 'continue' to run it or 'reject' to refuse.",
                invocation.name
            ),
            invocation: InvocationView {
                id: invocation.id.clone(),
                name: invocation.name.clone(),
                arguments: invocation.arguments.clone(),
            },
        }
    }
}

/// open 的结果
#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome {
    /// 已挂起，等待人工决定
    Suspended(ReviewPrompt),
    /// 本批次所有受保护调用都已处置
    Ready,
}

/// resume 的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected,
}

/// 拒绝时写给模型的结果文本
pub fn refusal_message(invocation: &ActionInvocation, reason: Option<&str>) -> String {
    match reason {
        Some(r) => format!(
            "The user rejected the '{}' action. Reason: {}",
            invocation.name, r
        ),
        None => format!(
            "The user rejected the '{}' action. It was not executed.",
            invocation.name
        ),
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReviewGate {
    strict: bool,
}

impl ReviewGate {
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    /// 挑出本批次下一个待审批的受保护调用并挂起；没有则返回 Ready
    pub fn open(&self, state: &mut ConversationState) -> Result<GateOutcome, AgentError> {
        if let Some(pending) = &state.pending_review {
            return Err(AgentError::Protocol(format!(
                "review already pending for '{}' ({})",
                pending.invocation.name, pending.invocation.id
            )));
        }
        let next = state
            .outstanding_invocations()
            .into_iter()
            .find(|inv| state.is_protected(&inv.name) && !state.approved.contains(&inv.id));

        match next {
            Some(invocation) => {
                tracing::info!(action = %invocation.name, id = %invocation.id, "suspending for human review");
                let prompt = ReviewPrompt::for_invocation(&invocation);
                state.pending_review = Some(PendingReview { invocation });
                Ok(GateOutcome::Suspended(prompt))
            }
            None => Ok(GateOutcome::Ready),
        }
    }

    /// 应用人工决定；没有待审批调用时返回协议错误且不改动状态
    pub fn resume(
        &self,
        state: &mut ConversationState,
        decision: &ReviewDecision,
    ) -> Result<Verdict, AgentError> {
        let pending = state.pending_review.take().ok_or_else(|| {
            AgentError::Protocol("no pending review for this session".to_string())
        })?;
        let invocation = pending.invocation;

        match decision.disposition(self.strict) {
            Disposition::Approve => {
                tracing::info!(action = %invocation.name, id = %invocation.id, "review approved");
                state.approved.insert(invocation.id);
                Ok(Verdict::Approved)
            }
            Disposition::Reject(reason) => {
                tracing::info!(action = %invocation.name, id = %invocation.id, "review rejected");
                let text = refusal_message(&invocation, reason.as_deref());
                state.push(Turn::action_result(&invocation, text));
                Ok(Verdict::Rejected)
            }
        }
    }

    /// 重新取出当前挂起的审批提示（会话从检查点恢复后展示用）
    pub fn current_prompt(&self, state: &ConversationState) -> Option<ReviewPrompt> {
        state
            .pending_review
            .as_ref()
            .map(|p| ReviewPrompt::for_invocation(&p.invocation))
    }
}
