//! Headless Agent 运行时
//!
//! 供 CLI / HTTP 前端调用的无界面逻辑：
//! create_agent_components 按配置构建 Planner / ToolExecutor / ReviewGate / SchedulingStore，
//! SessionService 是 Session API：按 session id 处理用户消息或审批决定，期间读写检查点。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::core::{AgentError, ConversationState, ReviewDecision, ReviewGate, ReviewPrompt, Turn};
use crate::llm::{create_llm_client, LlmClient};
use crate::memory::{create_checkpoint, SessionCheckpoint};
use crate::react::{drive, LoopContext, LoopOutcome, Planner};
use crate::scheduling::{CsvBackend, SchedulingStore, SlotBackend};
use crate::tools::{appointment_registry, NameCatalog, ToolExecutor};

/// 预构建的 Agent 组件，可多会话共享
pub struct AgentComponents {
    pub planner: Planner,
    pub executor: ToolExecutor,
    pub gate: ReviewGate,
    pub store: Arc<SchedulingStore>,
    /// 新会话的受保护动作集合
    pub protected_actions: BTreeSet<String>,
    /// 新会话的 yolo 默认值
    pub default_yolo: bool,
}

/// 按配置创建组件：LLM 来自 [llm]，排班数据来自 [scheduling].data_path（CSV）
pub fn create_agent_components(cfg: &AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_client(&cfg.llm)?;
    let backend = Arc::new(CsvBackend::new(&cfg.scheduling.data_path));
    tracing::info!(data = ?cfg.scheduling.data_path, "Using CSV scheduling data");
    Ok(create_agent_components_with(cfg, llm, backend))
}

/// 显式注入 LLM 与排班后端（测试与嵌入场景）
pub fn create_agent_components_with(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    backend: Arc<dyn SlotBackend>,
) -> AgentComponents {
    let store = Arc::new(SchedulingStore::new(backend));
    let catalog = Arc::new(NameCatalog::new(
        &cfg.scheduling.doctors,
        &cfg.scheduling.specializations,
    ));
    let registry = appointment_registry(store.clone(), catalog);

    let protected_actions: BTreeSet<String> =
        cfg.review.protected_actions.iter().cloned().collect();
    for name in &protected_actions {
        if registry.get(name).is_none() {
            tracing::warn!(action = %name, "protected action is not registered");
        }
    }
    // 配置是唯一来源；空集表示全部动作免审批
    for name in registry.protected_names().difference(&protected_actions) {
        tracing::warn!(action = %name, "side-effecting action runs without review");
    }

    let planner = Planner::with_actions(llm, &cfg.app.system_prompt, &registry);
    AgentComponents {
        planner,
        executor: ToolExecutor::new(registry, cfg.tools.tool_timeout_secs),
        gate: ReviewGate::new(cfg.review.strict_decisions),
        store,
        protected_actions,
        default_yolo: cfg.review.yolo_mode,
    }
}

/// Session API 输入：user_text 与 decision 恰好提供一个
#[derive(Clone, Debug, Default)]
pub struct SessionRequest {
    pub session_id: String,
    pub user_text: Option<String>,
    pub decision: Option<ReviewDecision>,
}

/// Session API 输出
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionReply {
    pub session_id: String,
    pub reply_text: String,
    pub turns: Vec<Turn>,
    pub awaiting_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_prompt: Option<ReviewPrompt>,
}

impl SessionReply {
    fn from_outcome(session_id: &str, state: &ConversationState, outcome: LoopOutcome) -> Self {
        let (reply_text, review_prompt) = match outcome {
            LoopOutcome::Reply(text) => (text, None),
            LoopOutcome::Suspended(prompt) => (prompt.message.clone(), Some(prompt)),
        };
        Self {
            session_id: session_id.to_string(),
            reply_text,
            turns: state.messages().to_vec(),
            awaiting_review: review_prompt.is_some(),
            review_prompt,
        }
    }
}

/// 会话服务：同一会话串行处理（每会话一把锁），不同会话可并发
pub struct SessionService {
    components: Arc<AgentComponents>,
    checkpoint: Arc<dyn SessionCheckpoint>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    session_ttl: Option<Duration>,
}

impl SessionService {
    pub fn new(components: Arc<AgentComponents>, checkpoint: Arc<dyn SessionCheckpoint>) -> Self {
        Self {
            components,
            checkpoint,
            locks: Mutex::new(HashMap::new()),
            session_ttl: None,
        }
    }

    /// 按配置创建（组件 + 检查点 + 过期时间）
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        let components = Arc::new(create_agent_components(cfg)?);
        let checkpoint = create_checkpoint(&cfg.checkpoint)?;
        Ok(Self::new(components, checkpoint).with_session_ttl(cfg.checkpoint.session_ttl_secs))
    }

    /// 0 表示不过期
    pub fn with_session_ttl(mut self, secs: u64) -> Self {
        self.session_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn components(&self) -> &AgentComponents {
        &self.components
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(session_id.to_string())
            .or_default()
            .clone()
    }

    fn loop_context(&self) -> LoopContext<'_> {
        LoopContext {
            planner: &self.components.planner,
            executor: &self.components.executor,
            gate: &self.components.gate,
            checkpoint: self.checkpoint.as_ref(),
        }
    }

    fn new_state(&self) -> ConversationState {
        ConversationState::new(
            self.components.protected_actions.iter().cloned(),
            self.components.default_yolo,
        )
    }

    async fn load_or_new(&self, session_id: &str) -> Result<ConversationState, AgentError> {
        Ok(self
            .checkpoint
            .load(session_id)
            .await?
            .unwrap_or_else(|| self.new_state()))
    }

    /// 统一入口：校验「恰好一个输入」后分发
    pub async fn handle(&self, request: SessionRequest) -> Result<SessionReply, AgentError> {
        if request.session_id.trim().is_empty() {
            return Err(AgentError::Validation("session id must not be empty".to_string()));
        }
        match (request.user_text, request.decision) {
            (Some(text), None) => self.send_message(&request.session_id, &text).await,
            (None, Some(decision)) => self.resume(&request.session_id, decision).await,
            _ => Err(AgentError::Validation(
                "exactly one of user text or review decision must be provided".to_string(),
            )),
        }
    }

    /// 新的用户消息：追加 UserTurn 后驱动循环
    pub async fn send_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<SessionReply, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::Validation("user text must not be empty".to_string()));
        }
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load_or_new(session_id).await?;
        if let Some(pending) = &state.pending_review {
            return Err(AgentError::Protocol(format!(
                "session is waiting for a review decision on '{}'",
                pending.invocation.name
            )));
        }
        if !state.outstanding_invocations().is_empty() {
            return Err(AgentError::Protocol(
                "previous actions did not finish; retry the session first".to_string(),
            ));
        }

        tracing::info!(session = session_id, "user message");
        state.push(Turn::user(text));
        self.checkpoint.save(session_id, &state).await?;

        let outcome = drive(&self.loop_context(), session_id, &mut state).await?;
        Ok(SessionReply::from_outcome(session_id, &state, outcome))
    }

    /// 人工决定：没有待审批时返回协议错误，检查点不变
    pub async fn resume(
        &self,
        session_id: &str,
        decision: ReviewDecision,
    ) -> Result<SessionReply, AgentError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut state = self.checkpoint.load(session_id).await?.ok_or_else(|| {
            AgentError::Protocol(format!("no pending review for session '{session_id}'"))
        })?;
        let verdict = self.components.gate.resume(&mut state, &decision)?;
        tracing::info!(session = session_id, ?verdict, "review resumed");
        self.checkpoint.save(session_id, &state).await?;

        let outcome = drive(&self.loop_context(), session_id, &mut state).await?;
        Ok(SessionReply::from_outcome(session_id, &state, outcome))
    }

    /// 上次因外部错误中断后重新驱动；若正等待审批则原样返回审批提示
    pub async fn retry(&self, session_id: &str) -> Result<SessionReply, AgentError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut state = self
            .checkpoint
            .load(session_id)
            .await?
            .ok_or_else(|| AgentError::Protocol(format!("unknown session '{session_id}'")))?;

        if let Some(prompt) = self.components.gate.current_prompt(&state) {
            return Ok(SessionReply::from_outcome(
                session_id,
                &state,
                LoopOutcome::Suspended(prompt),
            ));
        }
        if !state.awaits_model() && state.outstanding_invocations().is_empty() {
            return Err(AgentError::Protocol(format!(
                "session '{session_id}' has nothing to retry"
            )));
        }
        tracing::info!(session = session_id, "retrying session");
        let outcome = drive(&self.loop_context(), session_id, &mut state).await?;
        Ok(SessionReply::from_outcome(session_id, &state, outcome))
    }

    /// 切换该会话的 yolo 模式（不存在则新建）
    pub async fn set_yolo(&self, session_id: &str, on: bool) -> Result<(), AgentError> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let mut state = self.load_or_new(session_id).await?;
        state.yolo_mode = on;
        tracing::info!(session = session_id, yolo = on, "yolo mode changed");
        self.checkpoint.save(session_id, &state).await
    }

    pub async fn state(&self, session_id: &str) -> Result<Option<ConversationState>, AgentError> {
        self.checkpoint.load(session_id).await
    }

    /// 清理闲置会话（需调用方显式触发）
    pub async fn purge_expired(&self) -> Result<usize, AgentError> {
        let Some(ttl) = self.session_ttl else {
            return Ok(0);
        };
        let removed = self.checkpoint.purge_expired(ttl).await?;
        if removed > 0 {
            tracing::info!(removed, "purged expired sessions");
        }
        let mut locks = self.locks.lock().await;
        locks.retain(|_, l| Arc::strong_count(l) > 1);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::MemoryCheckpoint;
    use crate::scheduling::MemoryBackend;

    fn service(llm: MockLlmClient) -> SessionService {
        let cfg = AppConfig::default();
        let components =
            create_agent_components_with(&cfg, Arc::new(llm), Arc::new(MemoryBackend::new(vec![])));
        SessionService::new(Arc::new(components), Arc::new(MemoryCheckpoint::new()))
    }

    #[tokio::test]
    async fn test_handle_requires_exactly_one_input() {
        let svc = service(MockLlmClient::new());
        let both = SessionRequest {
            session_id: "s".into(),
            user_text: Some("hi".into()),
            decision: Some(ReviewDecision::approve()),
        };
        assert!(matches!(svc.handle(both).await, Err(AgentError::Validation(_))));
        let neither = SessionRequest {
            session_id: "s".into(),
            ..SessionRequest::default()
        };
        assert!(matches!(svc.handle(neither).await, Err(AgentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_plain_conversation() {
        let svc = service(MockLlmClient::scripted(["Hi, how can I help?"]));
        let reply = svc.send_message("s", "hello").await.unwrap();
        assert_eq!(reply.reply_text, "Hi, how can I help?");
        assert!(!reply.awaiting_review);
        assert_eq!(reply.turns.len(), 2);
    }

    #[tokio::test]
    async fn test_resume_without_pending_is_protocol_error() {
        let svc = service(MockLlmClient::scripted(["Hi"]));
        svc.send_message("s", "hello").await.unwrap();
        let before = svc.state("s").await.unwrap();
        let err = svc.resume("s", ReviewDecision::approve()).await.unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
        assert_eq!(svc.state("s").await.unwrap(), before);

        let err = svc.resume("unknown", ReviewDecision::approve()).await.unwrap_err();
        assert!(matches!(err, AgentError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_retry_after_model_failure() {
        let llm = MockLlmClient::new();
        llm.push_failure("rate limited");
        llm.push_reply("Sorry for the wait, how can I help?");
        let svc = service(llm);
        let err = svc.send_message("s", "hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(svc.state("s").await.unwrap().unwrap().len(), 1);

        let reply = svc.retry("s").await.unwrap();
        assert_eq!(reply.reply_text, "Sorry for the wait, how can I help?");
        assert!(svc.retry("s").await.is_err());
    }

    #[tokio::test]
    async fn test_set_yolo_persists() {
        let svc = service(MockLlmClient::new());
        svc.set_yolo("s", true).await.unwrap();
        assert!(svc.state("s").await.unwrap().unwrap().yolo_mode);
    }
}
