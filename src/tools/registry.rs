//! 动作注册表
//!
//! 所有动作实现 Tool trait（name / description / parameters_schema / protected / execute），
//! 由 ToolRegistry 按名注册与查找，ToolExecutor 在调用时加超时并把结果写成 ActionResultTurn。

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::scheduling::StoreError;

/// 动作执行失败：参数不合法会回到模型；存储错误对本轮致命
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// 动作 trait：名称、描述（供 LLM 理解）、参数 schema、是否默认需要审批、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 有副作用的动作默认受保护
    fn protected(&self) -> bool {
        false
    }

    /// 成功、查无结果都以 Ok(文本) 返回
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

/// 按名称存储 Arc<dyn Tool>；BTreeMap 保证 schema 输出顺序稳定
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 声明为受保护的动作名（会话默认的 protected_actions）
    pub fn protected_names(&self) -> BTreeSet<String> {
        self.tools
            .iter()
            .filter(|(_, t)| t.protected())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 生成拼入 system prompt 的动作清单（含参数 schema）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                serde_json::json!({
                    "name": name,
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker {
        name: &'static str,
        protected: bool,
    }

    #[async_trait]
    impl Tool for Marker {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn protected(&self) -> bool {
            self.protected
        }

        async fn execute(&self, _args: Value) -> Result<String, ToolError> {
            Ok(self.name.to_string())
        }
    }

    #[test]
    fn test_protected_names() {
        let mut registry = ToolRegistry::new();
        registry.register(Marker { name: "look", protected: false });
        registry.register(Marker { name: "touch", protected: true });
        let protected = registry.protected_names();
        assert!(protected.contains("touch"));
        assert!(!protected.contains("look"));
        assert_eq!(registry.tool_names(), vec!["look".to_string(), "touch".to_string()]);
    }

    #[test]
    fn test_schema_json_lists_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Marker { name: "look", protected: false });
        let schema: Value = serde_json::from_str(&registry.to_schema_json()).unwrap();
        assert_eq!(schema[0]["name"], "look");
        assert_eq!(schema[0]["parameters"]["type"], "object");
    }
}
