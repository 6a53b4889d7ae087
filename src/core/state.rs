//! 会话状态：对话日志（只追加）与审批控制标记
//!
//! ConversationState 是检查点持久化的单位：除了 Turn 列表，还带着受保护动作集合、
//! yolo 开关，以及「正在等待审批的调用」标记，因此一个挂起的会话可以在另一个进程里恢复。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 默认需要人工审批的动作
pub const DEFAULT_PROTECTED_ACTIONS: [&str; 3] = ["book", "cancel", "reschedule"];

/// 模型请求的一次动作调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// 在所属 AssistantTurn 内唯一
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ActionInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// 对话日志中的一条记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default)]
        actions: Vec<ActionInvocation>,
    },
    ActionResult {
        action_name: String,
        invocation_id: String,
        result: String,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, actions: Vec<ActionInvocation>) -> Self {
        Turn::Assistant {
            text: text.into(),
            actions,
        }
    }

    pub fn action_result(invocation: &ActionInvocation, result: impl Into<String>) -> Self {
        Turn::ActionResult {
            action_name: invocation.name.clone(),
            invocation_id: invocation.id.clone(),
            result: result.into(),
        }
    }

    /// 文本内容（用于回复展示）
    pub fn text(&self) -> &str {
        match self {
            Turn::User { text } | Turn::Assistant { text, .. } => text,
            Turn::ActionResult { result, .. } => result,
        }
    }
}

/// 等待人工处置的调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingReview {
    pub invocation: ActionInvocation,
}

/// 会话状态
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    messages: Vec<Turn>,
    pub protected_actions: BTreeSet<String>,
    pub yolo_mode: bool,
    /// 同一会话同时至多一个
    #[serde(default)]
    pub pending_review: Option<PendingReview>,
    /// 当前批次中已获批准的调用 id；批次执行完毕后清空
    #[serde(default)]
    pub approved: BTreeSet<String>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new(DEFAULT_PROTECTED_ACTIONS.iter().map(|s| s.to_string()), false)
    }
}

impl ConversationState {
    pub fn new(protected_actions: impl IntoIterator<Item = String>, yolo_mode: bool) -> Self {
        Self {
            messages: Vec::new(),
            protected_actions: protected_actions.into_iter().collect(),
            yolo_mode,
            pending_review: None,
            approved: BTreeSet::new(),
        }
    }

    pub fn messages(&self) -> &[Turn] {
        &self.messages
    }

    /// 唯一的写入口：只追加，不删除
    pub fn push(&mut self, turn: Turn) {
        self.messages.push(turn);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.messages.last()
    }

    pub fn is_protected(&self, action_name: &str) -> bool {
        self.protected_actions.contains(action_name)
    }

    pub fn awaiting_review(&self) -> bool {
        self.pending_review.is_some()
    }

    /// 最近一条 AssistantTurn 的下标
    fn last_assistant_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|t| matches!(t, Turn::Assistant { .. }))
    }

    /// 最近一条 AssistantTurn 请求的动作（没有则为空）
    pub fn last_requested_actions(&self) -> &[ActionInvocation] {
        match self.last_assistant_index().map(|i| &self.messages[i]) {
            Some(Turn::Assistant { actions, .. }) => actions,
            _ => &[],
        }
    }

    /// 最近一条 AssistantTurn 之后是否已有该调用的结果
    pub fn has_result(&self, invocation_id: &str) -> bool {
        let start = self.last_assistant_index().map(|i| i + 1).unwrap_or(0);
        self.messages[start..].iter().any(|t| {
            matches!(t, Turn::ActionResult { invocation_id: id, .. } if id == invocation_id)
        })
    }

    /// 最近一批中尚未产出结果的调用（按请求顺序）
    pub fn outstanding_invocations(&self) -> Vec<ActionInvocation> {
        self.last_requested_actions()
            .iter()
            .filter(|inv| !self.has_result(&inv.id))
            .cloned()
            .collect()
    }

    /// 最后一条是 UserTurn 或 ActionResultTurn 时轮到模型发言
    pub fn awaits_model(&self) -> bool {
        matches!(
            self.messages.last(),
            Some(Turn::User { .. }) | Some(Turn::ActionResult { .. })
        ) && self.outstanding_invocations().is_empty()
    }

    /// 最近一条带文本的 AssistantTurn，用作对外回复
    pub fn last_reply(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|t| match t {
            Turn::Assistant { text, .. } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
    }
}
