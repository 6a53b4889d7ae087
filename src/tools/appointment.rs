//! 变更类动作：预约 / 取消 / 改约（默认受保护，需人工审批）
//!
//! 每个动作在一次 SchedulingStore::update 内完成「匹配 -> 翻转 -> 落盘」。
//! 业务失败（没有匹配的时段）以普通文本返回，只有参数错误与存储错误走 Err。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::Value;

use crate::scheduling::{AppointmentSlot, SchedulingStore};
use crate::tools::args::{
    parse_args, parse_date_time, schema_value, with_enum, BookArgs, CancelArgs, NameCatalog,
    RescheduleArgs,
};
use crate::tools::{Tool, ToolError};

pub const BOOKED: &str = "Successfully booked the appointment.";
pub const BOOK_NOT_FOUND: &str = "No available appointments for that case.";
pub const CANCELLED: &str = "Successfully cancelled.";
pub const CANCEL_NOT_FOUND: &str = "No matching appointment found.";
pub const RESCHEDULED: &str = "Rescheduled successfully.";
pub const NEW_SLOT_UNAVAILABLE: &str = "New time not available.";
pub const OLD_SLOT_NOT_FOUND: &str = "Old appointment not found.";

fn free_slot(slots: &[AppointmentSlot], doctor: &str, at: NaiveDateTime) -> Option<usize> {
    slots
        .iter()
        .position(|s| s.is_available && s.doctor_name == doctor && s.slot == at)
}

fn booked_slot(
    slots: &[AppointmentSlot],
    doctor: &str,
    at: NaiveDateTime,
    patient: u32,
) -> Option<usize> {
    slots
        .iter()
        .position(|s| s.doctor_name == doctor && s.slot == at && s.is_booked_by(patient))
}

pub struct BookTool {
    store: Arc<SchedulingStore>,
    catalog: Arc<NameCatalog>,
}

impl BookTool {
    pub fn new(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Tool for BookTool {
    fn name(&self) -> &str {
        "book"
    }

    fn description(&self) -> &str {
        "Book the free slot of a doctor at an exact date and time for a patient."
    }

    fn parameters_schema(&self) -> Value {
        with_enum(schema_value::<BookArgs>(), "doctor_name", self.catalog.doctors())
    }

    fn protected(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: BookArgs = parse_args(self.name(), args)?;
        let at = parse_date_time("desired_date", &args.desired_date)?;
        let patient = args.id_number.validate()?;
        let doctor = self.catalog.doctor(&args.doctor_name)?;

        let booked = self
            .store
            .update(|slots| match free_slot(slots, &doctor, at) {
                Some(i) => {
                    slots[i].occupy(patient);
                    true
                }
                None => false,
            })
            .await?;
        Ok(if booked { BOOKED } else { BOOK_NOT_FOUND }.to_string())
    }
}

pub struct CancelTool {
    store: Arc<SchedulingStore>,
    catalog: Arc<NameCatalog>,
}

impl CancelTool {
    pub fn new(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Tool for CancelTool {
    fn name(&self) -> &str {
        "cancel"
    }

    fn description(&self) -> &str {
        "Cancel an appointment booked for a patient with a doctor at an exact date and time."
    }

    fn parameters_schema(&self) -> Value {
        with_enum(schema_value::<CancelArgs>(), "doctor_name", self.catalog.doctors())
    }

    fn protected(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: CancelArgs = parse_args(self.name(), args)?;
        let at = parse_date_time("date", &args.date)?;
        let patient = args.id_number.validate()?;
        let doctor = self.catalog.doctor(&args.doctor_name)?;

        let cancelled = self
            .store
            .update(|slots| match booked_slot(slots, &doctor, at, patient) {
                Some(i) => {
                    slots[i].release();
                    true
                }
                None => false,
            })
            .await?;
        Ok(if cancelled { CANCELLED } else { CANCEL_NOT_FOUND }.to_string())
    }
}

pub struct RescheduleTool {
    store: Arc<SchedulingStore>,
    catalog: Arc<NameCatalog>,
}

impl RescheduleTool {
    pub fn new(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Tool for RescheduleTool {
    fn name(&self) -> &str {
        "reschedule"
    }

    fn description(&self) -> &str {
        "Move a patient's appointment with a doctor from one date and time to another free slot."
    }

    fn parameters_schema(&self) -> Value {
        with_enum(schema_value::<RescheduleArgs>(), "doctor_name", self.catalog.doctors())
    }

    fn protected(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: RescheduleArgs = parse_args(self.name(), args)?;
        let old_at = parse_date_time("old_date", &args.old_date)?;
        let new_at = parse_date_time("new_date", &args.new_date)?;
        let patient = args.id_number.validate()?;
        let doctor = self.catalog.doctor(&args.doctor_name)?;

        let outcome = self
            .store
            .update(|slots| {
                // 先确认新时段可约，再动旧预约
                let Some(new_idx) = free_slot(slots, &doctor, new_at) else {
                    return NEW_SLOT_UNAVAILABLE;
                };
                let Some(old_idx) = booked_slot(slots, &doctor, old_at, patient) else {
                    return OLD_SLOT_NOT_FOUND;
                };
                slots[old_idx].release();
                slots[new_idx].occupy(patient);
                RESCHEDULED
            })
            .await?;
        Ok(outcome.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::{MemoryBackend, DATE_SLOT_FORMAT};
    use serde_json::json;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_SLOT_FORMAT).unwrap()
    }

    fn fixture() -> (Arc<SchedulingStore>, Arc<NameCatalog>) {
        let slots = vec![
            AppointmentSlot::open("john doe", "general_dentist", at("05-08-2024 08:00")),
            AppointmentSlot::open("john doe", "general_dentist", at("05-08-2024 08:30")),
            AppointmentSlot::open("jane smith", "orthodontist", at("05-08-2024 08:00")),
        ];
        let store = Arc::new(SchedulingStore::new(Arc::new(MemoryBackend::new(slots))));
        (store, Arc::new(NameCatalog::default()))
    }

    async fn slot(store: &SchedulingStore, doctor: &str, when: &str) -> AppointmentSlot {
        let doctor = doctor.to_string();
        let when = at(when);
        store
            .query(move |s| s.doctor_name == doctor && s.slot == when)
            .await
            .unwrap()
            .remove(0)
    }

    #[tokio::test]
    async fn test_book_is_exclusive() {
        let (store, catalog) = fixture();
        let book = BookTool::new(store.clone(), catalog);
        let args = json!({"desired_date": "05-08-2024 08:00", "id_number": 1234567, "doctor_name": "john doe"});
        assert_eq!(book.execute(args.clone()).await.unwrap(), BOOKED);
        assert_eq!(book.execute(args).await.unwrap(), BOOK_NOT_FOUND);

        let s = slot(&store, "john doe", "05-08-2024 08:00").await;
        assert!(!s.is_available);
        assert_eq!(s.patient_id, Some(1234567));
        // 同一时间其他医生的时段不受影响
        assert!(slot(&store, "jane smith", "05-08-2024 08:00").await.is_available);
    }

    #[tokio::test]
    async fn test_book_then_cancel_restores_slot() {
        let (store, catalog) = fixture();
        let before = slot(&store, "john doe", "05-08-2024 08:30").await;
        let book = BookTool::new(store.clone(), catalog.clone());
        let cancel = CancelTool::new(store.clone(), catalog);

        book.execute(json!({"desired_date": "05-08-2024 08:30", "id_number": "7654321", "doctor_name": "john doe"}))
            .await
            .unwrap();
        let out = cancel
            .execute(json!({"date": "05-08-2024 08:30", "id_number": "7654321", "doctor_name": "john doe"}))
            .await
            .unwrap();
        assert_eq!(out, CANCELLED);
        assert_eq!(slot(&store, "john doe", "05-08-2024 08:30").await, before);
    }

    #[tokio::test]
    async fn test_cancel_requires_matching_patient() {
        let (store, catalog) = fixture();
        let book = BookTool::new(store.clone(), catalog.clone());
        let cancel = CancelTool::new(store.clone(), catalog);
        book.execute(json!({"desired_date": "05-08-2024 08:00", "id_number": 1234567, "doctor_name": "john doe"}))
            .await
            .unwrap();
        let out = cancel
            .execute(json!({"date": "05-08-2024 08:00", "id_number": 7654321, "doctor_name": "john doe"}))
            .await
            .unwrap();
        assert_eq!(out, CANCEL_NOT_FOUND);
        assert!(!slot(&store, "john doe", "05-08-2024 08:00").await.is_available);
    }

    #[tokio::test]
    async fn test_reschedule_moves_booking() {
        let (store, catalog) = fixture();
        let book = BookTool::new(store.clone(), catalog.clone());
        let reschedule = RescheduleTool::new(store.clone(), catalog);
        book.execute(json!({"desired_date": "05-08-2024 08:00", "id_number": 1234567, "doctor_name": "john doe"}))
            .await
            .unwrap();
        let out = reschedule
            .execute(json!({
                "old_date": "05-08-2024 08:00",
                "new_date": "05-08-2024 08:30",
                "id_number": 1234567,
                "doctor_name": "john doe"
            }))
            .await
            .unwrap();
        assert_eq!(out, RESCHEDULED);
        assert!(slot(&store, "john doe", "05-08-2024 08:00").await.is_available);
        assert!(slot(&store, "john doe", "05-08-2024 08:30").await.is_booked_by(1234567));
    }

    #[tokio::test]
    async fn test_reschedule_to_unavailable_slot_keeps_old_booking() {
        let (store, catalog) = fixture();
        let book = BookTool::new(store.clone(), catalog.clone());
        let reschedule = RescheduleTool::new(store.clone(), catalog);
        book.execute(json!({"desired_date": "05-08-2024 08:00", "id_number": 1234567, "doctor_name": "john doe"}))
            .await
            .unwrap();
        book.execute(json!({"desired_date": "05-08-2024 08:30", "id_number": 2222222, "doctor_name": "john doe"}))
            .await
            .unwrap();

        let out = reschedule
            .execute(json!({
                "old_date": "05-08-2024 08:00",
                "new_date": "05-08-2024 08:30",
                "id_number": 1234567,
                "doctor_name": "john doe"
            }))
            .await
            .unwrap();
        assert_eq!(out, NEW_SLOT_UNAVAILABLE);
        assert!(slot(&store, "john doe", "05-08-2024 08:00").await.is_booked_by(1234567));
        assert!(slot(&store, "john doe", "05-08-2024 08:30").await.is_booked_by(2222222));
    }

    #[tokio::test]
    async fn test_reschedule_without_old_booking() {
        let (store, catalog) = fixture();
        let reschedule = RescheduleTool::new(store.clone(), catalog);
        let out = reschedule
            .execute(json!({
                "old_date": "05-08-2024 08:00",
                "new_date": "05-08-2024 08:30",
                "id_number": 1234567,
                "doctor_name": "john doe"
            }))
            .await
            .unwrap();
        assert_eq!(out, OLD_SLOT_NOT_FOUND);
        assert!(slot(&store, "john doe", "05-08-2024 08:30").await.is_available);
    }

    #[tokio::test]
    async fn test_invalid_id_is_validation_error() {
        let (store, catalog) = fixture();
        let book = BookTool::new(store, catalog);
        let err = book
            .execute(json!({"desired_date": "05-08-2024 08:00", "id_number": 12, "doctor_name": "john doe"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("7 or 8 digits")));
    }
}
