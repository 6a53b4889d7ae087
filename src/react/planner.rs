//! Planner：推理步骤与模型输出解析
//!
//! advance 把 system 指令 + 完整 Turn 历史交给 LLM，并把回复解析成恰好一条 AssistantTurn 追加到状态；
//! 模型调用或解析失败时不追加任何内容。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::{ActionInvocation, AgentError, ConversationState, Turn};
use crate::llm::LlmClient;
use crate::memory::{to_llm_messages, Message};
use crate::tools::{action_envelope_schema_json, ToolRegistry};

/// 解析后的模型回复
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOutput {
    pub text: String,
    pub actions: Vec<ActionInvocation>,
}

#[derive(Debug, Deserialize)]
struct RawAction {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default, alias = "args")]
    arguments: Value,
}

/// 兼容两种形状：`{"text", "actions"}` 信封与旧的 `{"tool", "args"}` 单调用
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawOutput {
    Legacy {
        tool: String,
        #[serde(default)]
        args: Value,
    },
    Envelope {
        #[serde(default)]
        text: String,
        #[serde(default)]
        actions: Vec<RawAction>,
    },
}

/// 去掉推理模型输出的 `<think>...</think>` 段
fn strip_think(output: &str) -> String {
    let mut rest = output;
    let mut kept = String::new();
    while let Some(start) = rest.find("<think>") {
        kept.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    kept.push_str(rest);
    kept.trim().to_string()
}

/// 定位 JSON 片段：返回 (JSON 之前的文字, JSON 文本, 是否确定是 JSON)
fn locate_json(text: &str) -> Option<(&str, &str, bool)> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some((text[..start].trim(), body.trim(), true));
    }
    let start = text.find('{')?;
    match text.rfind('}') {
        Some(end) if end > start => Some((text[..start].trim(), &text[start..=end], start == 0)),
        // 以 '{' 开头却没有闭合：截断的 JSON
        _ if start == 0 => Some(("", text, true)),
        _ => None,
    }
}

/// 正文中间的 JSON 只有带 `actions` 或 `tool` 键时才当作动作信封
fn looks_like_envelope(json_str: &str) -> bool {
    match serde_json::from_str::<Value>(json_str) {
        Ok(Value::Object(map)) => map.contains_key("actions") || map.contains_key("tool"),
        _ => false,
    }
}

fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn to_arguments(action: &str, value: Value) -> Result<Map<String, Value>, AgentError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(AgentError::JsonParse(format!(
            "arguments of '{action}' must be an object, got {other}"
        ))),
    }
}

/// 解析 LLM 输出：纯文本为普通回复；JSON（可在 ```json 代码块中）为带动作的回复。
/// 缺少或重复的调用 id 会重新分配。
pub fn parse_model_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let cleaned = strip_think(output);

    let Some((prefix, json_str, definite)) = locate_json(&cleaned) else {
        return Ok(PlannerOutput {
            text: cleaned,
            actions: Vec::new(),
        });
    };

    if !definite && !looks_like_envelope(json_str) {
        return Ok(PlannerOutput {
            text: cleaned,
            actions: Vec::new(),
        });
    }

    let raw: RawOutput = match serde_json::from_str(json_str) {
        Ok(raw) => raw,
        Err(e) if definite => {
            return Err(AgentError::JsonParse(format!("{}: {}", e, json_str)));
        }
        // 正文里偶然出现的花括号
        Err(_) => {
            return Ok(PlannerOutput {
                text: cleaned,
                actions: Vec::new(),
            })
        }
    };

    let (text, raw_actions) = match raw {
        RawOutput::Legacy { tool, args } => (
            String::new(),
            vec![RawAction {
                id: None,
                name: tool,
                arguments: args,
            }],
        ),
        RawOutput::Envelope { text, actions } => (text, actions),
    };

    let text = if text.trim().is_empty() {
        prefix.to_string()
    } else {
        text.trim().to_string()
    };

    let mut seen = HashSet::new();
    let mut actions = Vec::with_capacity(raw_actions.len());
    for raw in raw_actions {
        let name = raw.name.trim().to_string();
        if name.is_empty() {
            return Err(AgentError::JsonParse("action without a name".to_string()));
        }
        let id = raw
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && !seen.contains(id))
            .unwrap_or_else(new_call_id);
        seen.insert(id.clone());
        let arguments = to_arguments(&name, raw.arguments)?;
        actions.push(ActionInvocation::new(id, name, arguments));
    }

    if text.is_empty() && actions.is_empty() {
        return Err(AgentError::JsonParse(format!(
            "model output has neither text nor actions: {json_str}"
        )));
    }
    Ok(PlannerOutput { text, actions })
}

/// Planner：启动时注入 LLM 客户端，持有 system 指令（基础 prompt + 动作清单 + 回复格式）
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 把动作清单与回复格式拼进 system 指令
    pub fn with_actions(
        llm: Arc<dyn LlmClient>,
        base_prompt: &str,
        registry: &ToolRegistry,
    ) -> Self {
        let system = format!(
            "{base_prompt}\n\n\
             ## Actions\n\
             You can call these actions. Dates use DD-MM-YYYY, date-times use DD-MM-YYYY HH:MM (24h), \
             patient id numbers have 7 or 8 digits.\n{}\n\n\
             ## Reply format\n\
             To talk to the user without calling an action, reply with plain text. \
             To call one or more actions, reply with a single JSON object of this schema \
             (you may wrap it in ```json):\n{}\n\
             Action results come back as messages starting with \"Observation from\".",
            registry.to_schema_json(),
            action_envelope_schema_json(),
        );
        Self::new(llm, system)
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 推理步骤：追加恰好一条 AssistantTurn。状态必须轮到模型发言。
    pub async fn advance(&self, state: &mut ConversationState) -> Result<(), AgentError> {
        if !state.awaits_model() {
            return Err(AgentError::Protocol(
                "conversation is not waiting for the model".to_string(),
            ));
        }

        let mut messages = vec![Message::system(self.system_prompt.clone())];
        messages.extend(to_llm_messages(state.messages()));
        tracing::debug!(turns = state.len(), "calling model");

        let output = self.llm.complete(&messages).await.map_err(AgentError::Llm)?;
        let parsed = parse_model_output(&output)?;

        tracing::info!(
            actions = ?parsed.actions.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            "assistant turn"
        );
        state.push(Turn::assistant(parsed.text, parsed.actions));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_plain_text() {
        let out = parse_model_output("Which doctor would you like to see?").unwrap();
        assert_eq!(out.text, "Which doctor would you like to see?");
        assert!(out.actions.is_empty());
    }

    #[test]
    fn test_envelope_in_fence_with_think() {
        let raw = "<think>user wants john doe</think>Let me check.\n```json\n{\"actions\":[{\"id\":\"a1\",\"name\":\"check_by_doctor\",\"arguments\":{\"desired_date\":\"01-01-2030\",\"doctor_name\":\"john doe\"}}]}\n```";
        let out = parse_model_output(raw).unwrap();
        assert_eq!(out.text, "Let me check.");
        assert_eq!(out.actions.len(), 1);
        assert_eq!(out.actions[0].id, "a1");
        assert_eq!(out.actions[0].arguments["doctor_name"], "john doe");
    }

    #[test]
    fn test_legacy_shape_and_id_assignment() {
        let out = parse_model_output(r#"{"tool": "cancel", "args": {"id_number": 1234567}}"#).unwrap();
        assert_eq!(out.actions[0].name, "cancel");
        assert!(out.actions[0].id.starts_with("call_"));
    }

    #[test]
    fn test_duplicate_ids_are_replaced() {
        let out = parse_model_output(
            r#"{"text":"","actions":[{"id":"x","name":"book"},{"id":"x","name":"cancel"}]}"#,
        )
        .unwrap();
        assert_eq!(out.actions[0].id, "x");
        assert_ne!(out.actions[1].id, "x");
    }

    #[test]
    fn test_broken_json_is_error() {
        let err = parse_model_output("{\"actions\": [").unwrap_err();
        assert!(matches!(err, AgentError::JsonParse(_)));
    }

    #[test]
    fn test_incidental_braces_are_text() {
        let out = parse_model_output("Use the format {DD-MM-YYYY} please.").unwrap();
        assert!(out.actions.is_empty());
        assert!(out.text.contains("{DD-MM-YYYY}"));
    }

    #[test]
    fn test_data_object_in_prose_keeps_full_text() {
        let raw = r#"Your booking details are {"doctor": "john doe", "time": "8:00 AM"} - see you then!"#;
        let out = parse_model_output(raw).unwrap();
        assert_eq!(out.text, raw);
        assert!(out.actions.is_empty());
    }

    #[test]
    fn test_envelope_after_prose() {
        let out = parse_model_output(
            r#"Checking now. {"actions":[{"name":"check_by_doctor","arguments":{}}]}"#,
        )
        .unwrap();
        assert_eq!(out.text, "Checking now.");
        assert_eq!(out.actions[0].name, "check_by_doctor");
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let err = parse_model_output(r#"{"actions":[{"name":"book","arguments":[1,2]}]}"#).unwrap_err();
        assert!(matches!(err, AgentError::JsonParse(_)));
    }

    #[tokio::test]
    async fn test_advance_appends_one_turn() {
        let llm = Arc::new(MockLlmClient::scripted(["Hello! How can I help?"]));
        let planner = Planner::new(llm.clone(), "sys");
        let mut state = ConversationState::default();
        state.push(Turn::user("hi"));
        planner.advance(&mut state).await.unwrap();
        assert_eq!(state.len(), 2);
        assert_eq!(state.last_reply(), Some("Hello! How can I help?"));
        let sent = llm.last_request().unwrap();
        assert_eq!(sent[0], Message::system("sys"));
        assert_eq!(sent[1], Message::user("hi"));
    }

    #[tokio::test]
    async fn test_advance_failure_appends_nothing() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_failure("503");
        let planner = Planner::new(llm, "sys");
        let mut state = ConversationState::default();
        state.push(Turn::user("hi"));
        let err = planner.advance(&mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(state.len(), 1);
    }

    #[tokio::test]
    async fn test_advance_requires_model_turn() {
        let planner = Planner::new(Arc::new(MockLlmClient::new()), "sys");
        let mut state = ConversationState::default();
        assert!(planner.advance(&mut state).await.is_err());
    }
}
