//! 动作执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(invocation) 在超时内调用对应动作并产出一条 ActionResultTurn；
//! 参数错误 / 未知动作写成 "Error: ..." 结果交还模型，存储错误与超时对本轮致命；
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::{ActionInvocation, AgentError, Turn};
use crate::tools::{ToolError, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次调用，返回对应的 ActionResultTurn
    pub async fn execute(&self, invocation: &ActionInvocation) -> Result<Turn, AgentError> {
        let start = Instant::now();
        let args = Value::Object(invocation.arguments.clone());
        let args_preview = args_preview(&args);

        let Some(tool) = self.registry.get(&invocation.name) else {
            audit(&invocation.name, false, "unknown", start, &args_preview);
            let text = format!(
                "Error: unknown action '{}'. Available actions: {}",
                invocation.name,
                self.registry.tool_names().join(", ")
            );
            return Ok(Turn::action_result(invocation, text));
        };

        let result = timeout(self.timeout, tool.execute(args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(ToolError::InvalidArguments(_))) => "invalid_arguments",
            Ok(Err(ToolError::Store(_))) => "store_error",
            Err(_) => "timeout",
        };
        audit(&invocation.name, outcome == "ok", outcome, start, &args_preview);

        match result {
            Ok(Ok(content)) => Ok(Turn::action_result(invocation, content)),
            Ok(Err(ToolError::InvalidArguments(msg))) => {
                Ok(Turn::action_result(invocation, format!("Error: {msg}")))
            }
            Ok(Err(ToolError::Store(e))) => Err(AgentError::Store(e)),
            Err(_) => Err(AgentError::ToolTimeout(invocation.name.clone())),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn audit(tool: &str, ok: bool, outcome: &str, start: Instant, args_preview: &str) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview,
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
