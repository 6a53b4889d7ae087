//! 路由决策：根据最近一条 AssistantTurn 决定下一条边
//!
//! 无动作 -> Terminate；yolo -> Execute；批次中任一动作受保护 -> Review（整批）；否则 Execute。

use serde::{Deserialize, Serialize};

use crate::core::state::{ConversationState, Turn};

/// 状态损坏（最后一条不是 AssistantTurn）时追加的澄清回复
pub const CLARIFICATION_REPLY: &str =
    "Sorry, I lost track of our conversation. Could you repeat what you would like to do?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    Terminate,
    Execute,
    Review,
}

/// 纯函数：同样的最后一条 AssistantTurn 与标记总是得到同样结果
pub fn route(state: &ConversationState) -> RouteDecision {
    let actions = match state.last() {
        Some(Turn::Assistant { actions, .. }) => actions,
        _ => return RouteDecision::Terminate,
    };
    if actions.is_empty() {
        return RouteDecision::Terminate;
    }
    if state.yolo_mode {
        return RouteDecision::Execute;
    }
    if actions.iter().any(|a| state.is_protected(&a.name)) {
        RouteDecision::Review
    } else {
        RouteDecision::Execute
    }
}

/// 最后一条不是 AssistantTurn 时，路由需要补一条澄清回复后终止
pub fn needs_clarification(state: &ConversationState) -> bool {
    !matches!(state.last(), Some(Turn::Assistant { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::ActionInvocation;

    fn state_with(actions: &[&str], yolo: bool) -> ConversationState {
        let mut state = ConversationState::default();
        state.yolo_mode = yolo;
        state.push(Turn::user("hello"));
        let invocations = actions
            .iter()
            .enumerate()
            .map(|(i, name)| ActionInvocation::new(format!("call_{i}"), *name, Default::default()))
            .collect();
        state.push(Turn::assistant("", invocations));
        state
    }

    #[test]
    fn test_no_actions_terminates() {
        assert_eq!(route(&state_with(&[], false)), RouteDecision::Terminate);
    }

    #[test]
    fn test_unprotected_actions_execute() {
        let state = state_with(&["check_by_doctor", "check_by_specialization"], false);
        assert_eq!(route(&state), RouteDecision::Execute);
    }

    #[test]
    fn test_any_protected_action_forces_review() {
        let state = state_with(&["check_by_doctor", "cancel"], false);
        assert_eq!(route(&state), RouteDecision::Review);
    }

    #[test]
    fn test_yolo_never_reviews() {
        for names in [&["book"][..], &["cancel", "reschedule"][..], &["check_by_doctor"][..]] {
            assert_ne!(route(&state_with(names, true)), RouteDecision::Review);
        }
    }

    #[test]
    fn test_route_is_idempotent() {
        let state = state_with(&["book"], false);
        assert_eq!(route(&state), route(&state));
    }

    #[test]
    fn test_custom_protected_set() {
        let mut state = state_with(&["check_by_doctor"], false);
        state.protected_actions.insert("check_by_doctor".to_string());
        assert_eq!(route(&state), RouteDecision::Review);
    }

    #[test]
    fn test_corrupt_state_terminates_with_clarification() {
        let mut state = ConversationState::default();
        state.push(Turn::user("hello"));
        assert_eq!(route(&state), RouteDecision::Terminate);
        assert!(needs_clarification(&state));
    }
}
