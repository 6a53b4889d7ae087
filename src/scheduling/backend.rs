//! 排班数据后端
//!
//! 每次变更都整文件读取、整文件重写（写临时文件后 rename 覆盖）；没有追加日志，也不保证行级部分更新。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::scheduling::slot::SlotRecord;
use crate::scheduling::{AppointmentSlot, StoreError};

/// 后端只负责整表读写；一致性由 SchedulingStore 的锁保证
pub trait SlotBackend: Send + Sync {
    fn load(&self) -> Result<Vec<AppointmentSlot>, StoreError>;
    fn persist(&self, slots: &[AppointmentSlot]) -> Result<(), StoreError>;
}

/// CSV 文件后端（列：doctor_name, specialization, date_slot, is_available, patient_to_attend）
#[derive(Debug, Clone)]
pub struct CsvBackend {
    path: PathBuf,
}

impl CsvBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SlotBackend for CsvBackend {
    fn load(&self) -> Result<Vec<AppointmentSlot>, StoreError> {
        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| StoreError::Io(format!("{}: {}", self.path.display(), e)))?;
        let mut slots = Vec::new();
        for (i, row) in reader.deserialize::<SlotRecord>().enumerate() {
            // 表头占第 1 行
            let line = i + 2;
            let record = row.map_err(|e| StoreError::Parse {
                line,
                message: e.to_string(),
            })?;
            slots.push(record.into_slot(line)?);
        }
        Ok(slots)
    }

    fn persist(&self, slots: &[AppointmentSlot]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let tmp = self.path.with_extension("csv.tmp");
        {
            let mut writer =
                csv::Writer::from_path(&tmp).map_err(|e| StoreError::Io(e.to_string()))?;
            for slot in slots {
                writer
                    .serialize(SlotRecord::from_slot(slot))
                    .map_err(|e| StoreError::Io(e.to_string()))?;
            }
            writer.flush().map_err(|e| StoreError::Io(e.to_string()))?;
        }
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }
}

/// 内存后端（测试 / 演示用）
#[derive(Debug, Default)]
pub struct MemoryBackend {
    slots: Mutex<Vec<AppointmentSlot>>,
}

impl MemoryBackend {
    pub fn new(slots: Vec<AppointmentSlot>) -> Self {
        Self {
            slots: Mutex::new(slots),
        }
    }
}

impl SlotBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<AppointmentSlot>, StoreError> {
        self.slots
            .lock()
            .map(|s| s.clone())
            .map_err(|_| StoreError::Io("memory backend poisoned".to_string()))
    }

    fn persist(&self, slots: &[AppointmentSlot]) -> Result<(), StoreError> {
        let mut guard = self
            .slots
            .lock()
            .map_err(|_| StoreError::Io("memory backend poisoned".to_string()))?;
        *guard = slots.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "doctor_name,specialization,date_slot,is_available,patient_to_attend
john doe,general_dentist,05-08-2024 08:00,True,
john doe,general_dentist,05-08-2024 08:30,False,1000082.0
emily johnson,orthodontist,05-08-2024 09:00,True,
";

    #[test]
    fn test_csv_load_and_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("availability.csv");
        std::fs::write(&path, SAMPLE).unwrap();

        let backend = CsvBackend::new(&path);
        let mut slots = backend.load().unwrap();
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[1].patient_id, Some(1000082));

        slots[0].occupy(1234567);
        backend.persist(&slots).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("doctor_name,specialization,date_slot,is_available,patient_to_attend"));
        assert!(content.contains("john doe,general_dentist,05-08-2024 08:00,False,1234567"));
        assert_eq!(backend.load().unwrap(), slots);
    }

    #[test]
    fn test_csv_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let backend = CsvBackend::new(dir.path().join("nope.csv"));
        assert!(matches!(backend.load(), Err(StoreError::Io(_))));
    }

    #[test]
    fn test_csv_bad_row_reports_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("availability.csv");
        std::fs::write(
            &path,
            "doctor_name,specialization,date_slot,is_available,patient_to_attend\njohn doe,general_dentist,not-a-date,True,\n",
        )
        .unwrap();
        let err = CsvBackend::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 2, .. }));
    }
}
