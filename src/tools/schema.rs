//! 模型输出协议的 JSON Schema（schemars 自动生成）
//!
//! 拼入 system prompt，告诉模型如何在一次回复里请求零个或多个动作。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

/// 一次动作请求（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionRequestFormat {
    /// 可选的调用 id；缺省时由系统分配
    pub id: Option<String>,
    /// 动作名，如 check_by_doctor、book
    pub name: String,
    /// 动作参数，字段见各动作的 parameters
    pub arguments: Map<String, Value>,
}

/// 模型回复格式：给用户的文字 + 要执行的动作列表
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ActionEnvelopeFormat {
    /// 给用户看的文字（可为空）
    pub text: String,
    /// 要执行的动作；不需要动作时为空数组
    pub actions: Vec<ActionRequestFormat>,
}

pub fn action_envelope_schema_json() -> String {
    let schema = schema_for!(ActionEnvelopeFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
