//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RALPH__*` 覆盖（双下划线表示嵌套，如 `RALPH__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::state::DEFAULT_PROTECTED_ACTIONS;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a medical appointment assistant. Help patients schedule, cancel, or reschedule appointments. Always ask for all required information before calling a tool.";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub review: ReviewSection,
    pub scheduling: SchedulingSection,
    pub checkpoint: CheckpointSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与系统指令
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub system_prompt: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// [llm] 段：后端选择、模型、采样温度与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// groq / openai / mock；mock 不访问网络
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 从哪个环境变量读 API Key（缺失时回退 OPENAI_API_KEY）
    pub api_key_env: String,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "qwen/qwen3-32b".to_string(),
            base_url: Some("https://api.groq.com/openai/v1".to_string()),
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: 0.6,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [review] 段：受保护动作、yolo 默认值、对无法识别决定的处理
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub protected_actions: Vec<String>,
    pub yolo_mode: bool,
    /// true 时无法识别的决定按拒绝处理（默认按批准）
    pub strict_decisions: bool,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            protected_actions: DEFAULT_PROTECTED_ACTIONS.iter().map(|s| s.to_string()).collect(),
            yolo_mode: false,
            strict_decisions: false,
        }
    }
}

/// [scheduling] 段：排班数据文件与医生 / 科室白名单（空列表 = 不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulingSection {
    pub data_path: PathBuf,
    pub doctors: Vec<String>,
    pub specializations: Vec<String>,
}

impl Default for SchedulingSection {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/availability.csv"),
            doctors: default_doctors(),
            specializations: default_specializations(),
        }
    }
}

fn default_doctors() -> Vec<String> {
    [
        "kevin anderson",
        "robert martinez",
        "susan davis",
        "daniel miller",
        "sarah wilson",
        "michael green",
        "lisa brown",
        "jane smith",
        "emily johnson",
        "john doe",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_specializations() -> Vec<String> {
    [
        "general_dentist",
        "cosmetic_dentist",
        "prosthodontist",
        "pediatric_dentist",
        "emergency_dentist",
        "oral_surgeon",
        "orthodontist",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
    Sqlite,
}

/// [checkpoint] 段：会话检查点后端与过期时间
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: CheckpointBackend,
    /// file 后端为目录，sqlite 后端为数据库文件
    pub path: PathBuf,
    /// 0 表示永不过期
    pub session_ttl_secs: u64,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            path: PathBuf::from("data/sessions"),
            session_ttl_secs: 86_400,
        }
    }
}

/// [tools] 段：单次动作超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
        }
    }
}

/// 从 config 目录加载配置，环境变量 RALPH__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RALPH__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RALPH")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
