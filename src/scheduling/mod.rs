//! 排班存储：预约时段记录、文件后端与带锁的查询 / 更新

pub mod backend;
pub mod slot;
pub mod store;

pub use backend::{CsvBackend, MemoryBackend, SlotBackend};
pub use slot::{AppointmentSlot, DATE_FORMAT, DATE_SLOT_FORMAT};
pub use store::{SchedulingStore, StoreError};
