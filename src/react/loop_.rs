//! 对话主循环：显式有限状态机
//!
//! Reason -> Route -> {Terminate | Execute | Review}；Execute 与 Review（被拒绝时）都回到 Reason。
//! 每完成一步就写一次检查点；Review 挂起时保存带待审批标记的状态后直接返回，恢复是一次新的 drive 调用。

use crate::core::router::{needs_clarification, CLARIFICATION_REPLY};
use crate::core::{
    route, AgentError, ConversationState, GateOutcome, ReviewGate, ReviewPrompt, RouteDecision,
    Turn,
};
use crate::memory::SessionCheckpoint;
use crate::react::Planner;
use crate::tools::ToolExecutor;

/// 单次 drive 内最多调用模型的次数，防止模型反复请求动作造成死循环
pub const MAX_REASONING_STEPS: usize = 12;

pub const STEP_LIMIT_REPLY: &str =
    "Sorry, I could not finish this request. Could you rephrase or break it into smaller steps?";

/// drive 的结果
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// 模型给出不带动作的回复，本轮结束
    Reply(String),
    /// 挂起等待人工审批
    Suspended(ReviewPrompt),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Reason,
    Route,
    Review,
    Execute,
}

/// 循环所需组件（均在启动时构造，显式传入）
pub struct LoopContext<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub gate: &'a ReviewGate,
    pub checkpoint: &'a dyn SessionCheckpoint,
}

/// 由状态推出从哪一步继续
fn entry_stage(state: &ConversationState) -> Stage {
    if state.awaits_model() {
        return Stage::Reason;
    }
    let outstanding = state.outstanding_invocations();
    let batch_started = outstanding.len() < state.last_requested_actions().len();
    if !outstanding.is_empty() && (batch_started || !state.approved.is_empty()) {
        // 批次处置到一半（有人工决定或部分结果）
        if state.yolo_mode {
            Stage::Execute
        } else {
            Stage::Review
        }
    } else {
        Stage::Route
    }
}

/// 驱动会话直到得到回复或挂起
pub async fn drive(
    ctx: &LoopContext<'_>,
    session_id: &str,
    state: &mut ConversationState,
) -> Result<LoopOutcome, AgentError> {
    if let Some(pending) = &state.pending_review {
        return Err(AgentError::Protocol(format!(
            "session is waiting for a review decision on '{}'",
            pending.invocation.name
        )));
    }

    let mut stage = entry_stage(state);
    let mut steps = 0;

    loop {
        tracing::debug!(session = session_id, ?stage, "loop stage");
        match stage {
            Stage::Reason => {
                if steps >= MAX_REASONING_STEPS {
                    tracing::warn!(session = session_id, steps, "reasoning step limit reached");
                    state.push(Turn::assistant(STEP_LIMIT_REPLY, vec![]));
                    ctx.checkpoint.save(session_id, state).await?;
                    return Ok(LoopOutcome::Reply(STEP_LIMIT_REPLY.to_string()));
                }
                ctx.planner.advance(state).await?;
                steps += 1;
                let (_, _, total_tokens) = ctx.planner.token_usage();
                tracing::debug!(session = session_id, steps, total_tokens, "reasoning step done");
                ctx.checkpoint.save(session_id, state).await?;
                stage = Stage::Route;
            }
            Stage::Route => {
                if needs_clarification(state) {
                    tracing::warn!(session = session_id, "last turn is not an assistant turn");
                    state.push(Turn::assistant(CLARIFICATION_REPLY, vec![]));
                    ctx.checkpoint.save(session_id, state).await?;
                    return Ok(LoopOutcome::Reply(CLARIFICATION_REPLY.to_string()));
                }
                let decision = route(state);
                tracing::info!(session = session_id, ?decision, "route");
                stage = match decision {
                    RouteDecision::Terminate => {
                        let reply = state.last_reply().unwrap_or_default().to_string();
                        return Ok(LoopOutcome::Reply(reply));
                    }
                    RouteDecision::Execute => Stage::Execute,
                    RouteDecision::Review => Stage::Review,
                };
            }
            Stage::Review => match ctx.gate.open(state)? {
                GateOutcome::Suspended(prompt) => {
                    ctx.checkpoint.save(session_id, state).await?;
                    return Ok(LoopOutcome::Suspended(prompt));
                }
                GateOutcome::Ready => stage = Stage::Execute,
            },
            Stage::Execute => {
                for invocation in state.outstanding_invocations() {
                    if !state.yolo_mode
                        && state.is_protected(&invocation.name)
                        && !state.approved.contains(&invocation.id)
                    {
                        return Err(AgentError::Protocol(format!(
                            "'{}' ({}) has not been approved",
                            invocation.name, invocation.id
                        )));
                    }
                    let result = ctx.executor.execute(&invocation).await?;
                    state.push(result);
                    ctx.checkpoint.save(session_id, state).await?;
                }
                state.approved.clear();
                ctx.checkpoint.save(session_id, state).await?;
                stage = Stage::Reason;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionInvocation;
    use serde_json::Map;

    fn with_batch(names: &[&str]) -> (ConversationState, Vec<ActionInvocation>) {
        let mut state = ConversationState::default();
        state.push(Turn::user("go"));
        let batch: Vec<ActionInvocation> = names
            .iter()
            .enumerate()
            .map(|(i, n)| ActionInvocation::new(format!("c{i}"), *n, Map::new()))
            .collect();
        state.push(Turn::assistant("", batch.clone()));
        (state, batch)
    }

    #[test]
    fn test_entry_stage() {
        let mut state = ConversationState::default();
        state.push(Turn::user("hi"));
        assert_eq!(entry_stage(&state), Stage::Reason);

        let (state, _) = with_batch(&["book", "check_by_doctor"]);
        assert_eq!(entry_stage(&state), Stage::Route);

        let (mut state, batch) = with_batch(&["book", "cancel"]);
        state.approved.insert(batch[0].id.clone());
        assert_eq!(entry_stage(&state), Stage::Review);

        let (mut state, batch) = with_batch(&["book", "cancel"]);
        state.push(Turn::action_result(&batch[0], "rejected"));
        assert_eq!(entry_stage(&state), Stage::Review);
        state.push(Turn::action_result(&batch[1], "rejected"));
        assert_eq!(entry_stage(&state), Stage::Reason);
    }
}
