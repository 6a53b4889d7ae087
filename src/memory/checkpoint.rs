//! 会话检查点
//!
//! 按 session id 保存 ConversationState（连同「等待审批」标记），让挂起的会话能在
//! 另一次请求甚至另一个进程里恢复。三种实现：内存、JSON 文件（每会话一个文件）、SQLite。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{CheckpointBackend, CheckpointSection};
use crate::core::{AgentError, ConversationState};

/// 检查点接口
#[async_trait]
pub trait SessionCheckpoint: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, AgentError>;

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), AgentError>;

    /// 删除闲置超过 ttl 的会话，返回删除数量
    async fn purge_expired(&self, ttl: Duration) -> Result<usize, AgentError>;

    async fn session_ids(&self) -> Result<Vec<String>, AgentError>;
}

/// 落盘记录：状态 + 最后更新时间（毫秒时间戳）
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    state: ConversationState,
    updated_at: i64,
}

impl CheckpointRecord {
    fn new(state: &ConversationState) -> Self {
        Self {
            state: state.clone(),
            updated_at: now_millis(),
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn cutoff(ttl: Duration) -> i64 {
    now_millis() - ttl.as_millis() as i64
}

fn checkpoint_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::Checkpoint(e.to_string())
}

/// 内存检查点（进程内有效）
#[derive(Default)]
pub struct MemoryCheckpoint {
    records: RwLock<HashMap<String, CheckpointRecord>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCheckpoint for MemoryCheckpoint {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, AgentError> {
        Ok(self
            .records
            .read()
            .await
            .get(session_id)
            .map(|r| r.state.clone()))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), AgentError> {
        self.records
            .write()
            .await
            .insert(session_id.to_string(), CheckpointRecord::new(state));
        Ok(())
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize, AgentError> {
        let limit = cutoff(ttl);
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.updated_at >= limit);
        Ok(before - records.len())
    }

    async fn session_ids(&self) -> Result<Vec<String>, AgentError> {
        let mut ids: Vec<String> = self.records.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// JSON 文件检查点：`{dir}/s-{hex(session_id)}.json`
#[derive(Debug)]
pub struct FileCheckpoint {
    dir: PathBuf,
}

/// 文件名只含 hex，session id 的字节上限（保证文件名不超过 255）
const MAX_FILE_ID_BYTES: usize = 120;

fn encode_id(session_id: &str) -> String {
    session_id.bytes().map(|b| format!("{b:02x}")).collect()
}

fn decode_id(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..encoded.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(encoded.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

impl FileCheckpoint {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, AgentError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(checkpoint_err)?;
        Ok(Self { dir })
    }

    fn path_for(&self, session_id: &str) -> Result<PathBuf, AgentError> {
        if session_id.len() > MAX_FILE_ID_BYTES {
            return Err(AgentError::Validation(format!(
                "session id is longer than {MAX_FILE_ID_BYTES} bytes"
            )));
        }
        Ok(self.dir.join(format!("s-{}.json", encode_id(session_id))))
    }

    fn read_record(path: &Path) -> Result<CheckpointRecord, AgentError> {
        let data = std::fs::read_to_string(path).map_err(checkpoint_err)?;
        serde_json::from_str(&data).map_err(checkpoint_err)
    }

    /// 目录里所有检查点文件及其 session id
    fn entries(&self) -> Result<Vec<(String, PathBuf)>, AgentError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(checkpoint_err)? {
            let path = entry.map_err(checkpoint_err)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let id = name
                .strip_prefix("s-")
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(decode_id);
            if let Some(id) = id {
                entries.push((id, path));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[async_trait]
impl SessionCheckpoint for FileCheckpoint {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, AgentError> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(Self::read_record(&path)?.state))
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), AgentError> {
        let path = self.path_for(session_id)?;
        let data =
            serde_json::to_string_pretty(&CheckpointRecord::new(state)).map_err(checkpoint_err)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(checkpoint_err)?;
        std::fs::rename(&tmp, &path).map_err(checkpoint_err)?;
        Ok(())
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize, AgentError> {
        let limit = cutoff(ttl);
        let mut removed = 0;
        for (id, path) in self.entries()? {
            match Self::read_record(&path) {
                Ok(record) if record.updated_at < limit => {
                    std::fs::remove_file(&path).map_err(checkpoint_err)?;
                    removed += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(session = %id, "unreadable checkpoint skipped: {}", e),
            }
        }
        Ok(removed)
    }

    async fn session_ids(&self) -> Result<Vec<String>, AgentError> {
        Ok(self.entries()?.into_iter().map(|(id, _)| id).collect())
    }
}

/// SQLite 检查点：单表 sessions(id, state_json, updated_at)
pub struct SqliteCheckpoint {
    conn: Mutex<Connection>,
}

impl SqliteCheckpoint {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(checkpoint_err)?;
            }
        }
        let conn = Connection::open(path).map_err(checkpoint_err)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, AgentError> {
        Self::init(Connection::open_in_memory().map_err(checkpoint_err)?)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )
        .map_err(checkpoint_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, AgentError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AgentError::Checkpoint("sqlite connection poisoned".to_string()))?;
        f(&conn).map_err(checkpoint_err)
    }
}

#[async_trait]
impl SessionCheckpoint for SqliteCheckpoint {
    async fn load(&self, session_id: &str) -> Result<Option<ConversationState>, AgentError> {
        let json: Option<String> = self.with_conn(|conn| {
            conn.query_row(
                "SELECT state_json FROM sessions WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
        })?;
        json.map(|j| serde_json::from_str(&j).map_err(checkpoint_err))
            .transpose()
    }

    async fn save(&self, session_id: &str, state: &ConversationState) -> Result<(), AgentError> {
        let json = serde_json::to_string(state).map_err(checkpoint_err)?;
        let updated_at = now_millis();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions(id, state_json, updated_at) VALUES (?1, ?2, ?3)",
                params![session_id, json, updated_at],
            )
        })?;
        Ok(())
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize, AgentError> {
        let limit = cutoff(ttl);
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE updated_at < ?1", params![limit])
        })
    }

    async fn session_ids(&self) -> Result<Vec<String>, AgentError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sessions ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>();
            ids
        })
    }
}

/// 按配置创建检查点
pub fn create_checkpoint(cfg: &CheckpointSection) -> Result<Arc<dyn SessionCheckpoint>, AgentError> {
    match cfg.backend {
        CheckpointBackend::Memory => {
            tracing::info!("Using in-memory session checkpoint");
            Ok(Arc::new(MemoryCheckpoint::new()))
        }
        CheckpointBackend::File => {
            tracing::info!("Using file session checkpoint: {:?}", cfg.path);
            Ok(Arc::new(FileCheckpoint::new(&cfg.path)?))
        }
        CheckpointBackend::Sqlite => {
            tracing::info!("Using sqlite session checkpoint: {:?}", cfg.path);
            Ok(Arc::new(SqliteCheckpoint::open(&cfg.path)?))
        }
    }
}
