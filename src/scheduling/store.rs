//! SchedulingStore：多会话共享的排班表
//!
//! query 与 update 都在同一把异步锁内完成「读取 -> 匹配 -> 改写 -> 落盘」，
//! 两个会话同时预约同一时段时只有一个能看到它仍然可约。

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::scheduling::{AppointmentSlot, SlotBackend};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

pub struct SchedulingStore {
    backend: Arc<dyn SlotBackend>,
    lock: Mutex<()>,
}

impl SchedulingStore {
    pub fn new(backend: Arc<dyn SlotBackend>) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    /// 按谓词查询（返回副本）
    pub async fn query<F>(&self, predicate: F) -> Result<Vec<AppointmentSlot>, StoreError>
    where
        F: Fn(&AppointmentSlot) -> bool,
    {
        let _guard = self.lock.lock().await;
        let slots = self.backend.load()?;
        Ok(slots.into_iter().filter(|s| predicate(s)).collect())
    }

    /// 在锁内读取整表交给 f 修改；表有变化才整表落盘
    pub async fn update<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<AppointmentSlot>) -> T,
    {
        let _guard = self.lock.lock().await;
        let mut slots = self.backend.load()?;
        let before = slots.clone();
        let out = f(&mut slots);
        if slots != before {
            self.backend.persist(&slots)?;
            tracing::debug!(rows = slots.len(), "scheduling table persisted");
        }
        Ok(out)
    }
}
