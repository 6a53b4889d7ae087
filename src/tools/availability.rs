//! 查询类动作：按医生 / 按专科查看某天的空闲时段（无副作用，不需审批）

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveTime, Timelike};
use serde_json::Value;

use crate::scheduling::{SchedulingStore, DATE_FORMAT};
use crate::tools::args::{
    parse_args, parse_date, schema_value, with_enum, CheckByDoctorArgs, CheckBySpecializationArgs,
    NameCatalog,
};
use crate::tools::{Tool, ToolError};

/// 24 小时制转 12 小时制：09:30 -> 9:30 AM，00:15 -> 12:15 AM
pub fn format_am_pm(time: NaiveTime) -> String {
    let (pm, hour) = time.hour12();
    format!("{}:{:02} {}", hour, time.minute(), if pm { "PM" } else { "AM" })
}

fn join_times(times: &[NaiveTime]) -> String {
    times
        .iter()
        .map(|t| format_am_pm(*t))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct CheckByDoctorTool {
    store: Arc<SchedulingStore>,
    catalog: Arc<NameCatalog>,
}

impl CheckByDoctorTool {
    pub fn new(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Tool for CheckByDoctorTool {
    fn name(&self) -> &str {
        "check_by_doctor"
    }

    fn description(&self) -> &str {
        "List the free slots of one doctor on a given date."
    }

    fn parameters_schema(&self) -> Value {
        with_enum(
            schema_value::<CheckByDoctorArgs>(),
            "doctor_name",
            self.catalog.doctors(),
        )
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: CheckByDoctorArgs = parse_args(self.name(), args)?;
        let date = parse_date("desired_date", &args.desired_date)?;
        let doctor = self.catalog.doctor(&args.doctor_name)?;

        let mut times: Vec<NaiveTime> = self
            .store
            .query(|s| s.is_available && s.doctor_name == doctor && s.slot.date() == date)
            .await?
            .into_iter()
            .map(|s| s.slot.time())
            .collect();
        times.sort();

        let date = date.format(DATE_FORMAT);
        if times.is_empty() {
            return Ok(format!("No availability for {doctor} on {date}."));
        }
        Ok(format!(
            "Availability for {doctor} on {date}: {}",
            join_times(&times)
        ))
    }
}

pub struct CheckBySpecializationTool {
    store: Arc<SchedulingStore>,
    catalog: Arc<NameCatalog>,
}

impl CheckBySpecializationTool {
    pub fn new(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl Tool for CheckBySpecializationTool {
    fn name(&self) -> &str {
        "check_by_specialization"
    }

    fn description(&self) -> &str {
        "List the free slots of every doctor of a specialization on a given date, grouped by doctor."
    }

    fn parameters_schema(&self) -> Value {
        with_enum(
            schema_value::<CheckBySpecializationArgs>(),
            "specialization",
            self.catalog.specializations(),
        )
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: CheckBySpecializationArgs = parse_args(self.name(), args)?;
        let date = parse_date("desired_date", &args.desired_date)?;
        let specialization = self.catalog.specialization(&args.specialization)?;

        let slots = self
            .store
            .query(|s| {
                s.is_available && s.specialization == specialization && s.slot.date() == date
            })
            .await?;

        let mut by_doctor: BTreeMap<String, Vec<NaiveTime>> = BTreeMap::new();
        for slot in slots {
            by_doctor
                .entry(slot.doctor_name.clone())
                .or_default()
                .push(slot.slot.time());
        }
        if by_doctor.is_empty() {
            return Ok(format!(
                "No availability for {specialization} on {}.",
                date.format(DATE_FORMAT)
            ));
        }
        Ok(by_doctor
            .into_iter()
            .map(|(doctor, mut times)| {
                times.sort();
                format!("- {doctor}: {}", join_times(&times))
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::{AppointmentSlot, MemoryBackend, DATE_SLOT_FORMAT};
    use chrono::NaiveDateTime;
    use serde_json::json;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATE_SLOT_FORMAT).unwrap()
    }

    fn fixture() -> (Arc<SchedulingStore>, Arc<NameCatalog>) {
        let mut booked = AppointmentSlot::open("jane smith", "orthodontist", at("05-08-2024 10:00"));
        booked.occupy(1234567);
        let slots = vec![
            AppointmentSlot::open("john doe", "general_dentist", at("05-08-2024 13:30")),
            AppointmentSlot::open("john doe", "general_dentist", at("05-08-2024 08:00")),
            AppointmentSlot::open("jane smith", "orthodontist", at("05-08-2024 09:30")),
            booked,
            AppointmentSlot::open("emily johnson", "orthodontist", at("05-08-2024 11:00")),
            AppointmentSlot::open("emily johnson", "orthodontist", at("06-08-2024 11:00")),
        ];
        let store = Arc::new(SchedulingStore::new(Arc::new(MemoryBackend::new(slots))));
        (store, Arc::new(NameCatalog::default()))
    }

    #[test]
    fn test_format_am_pm() {
        let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
        assert_eq!(format_am_pm(t(9, 30)), "9:30 AM");
        assert_eq!(format_am_pm(t(13, 0)), "1:00 PM");
        assert_eq!(format_am_pm(t(0, 15)), "12:15 AM");
        assert_eq!(format_am_pm(t(12, 0)), "12:00 PM");
    }

    #[tokio::test]
    async fn test_check_by_doctor_lists_sorted_slots() {
        let (store, catalog) = fixture();
        let tool = CheckByDoctorTool::new(store, catalog);
        let out = tool
            .execute(json!({"desired_date": "05-08-2024", "doctor_name": "John Doe"}))
            .await
            .unwrap();
        assert_eq!(out, "Availability for john doe on 05-08-2024: 8:00 AM, 1:30 PM");
    }

    #[tokio::test]
    async fn test_check_by_doctor_none() {
        let (store, catalog) = fixture();
        let tool = CheckByDoctorTool::new(store, catalog);
        let out = tool
            .execute(json!({"desired_date": "01-01-2030", "doctor_name": "john doe"}))
            .await
            .unwrap();
        assert!(out.contains("No availability for john doe on 01-01-2030."));
    }

    #[tokio::test]
    async fn test_check_by_specialization_groups_by_doctor() {
        let (store, catalog) = fixture();
        let tool = CheckBySpecializationTool::new(store, catalog);
        let out = tool
            .execute(json!({"desired_date": "05-08-2024", "specialization": "orthodontist"}))
            .await
            .unwrap();
        assert_eq!(out, "- emily johnson: 11:00 AM\n- jane smith: 9:30 AM");
    }

    #[tokio::test]
    async fn test_check_by_specialization_none_and_bad_date() {
        let (store, catalog) = fixture();
        let tool = CheckBySpecializationTool::new(store, catalog);
        let out = tool
            .execute(json!({"desired_date": "07-08-2024", "specialization": "oral_surgeon"}))
            .await
            .unwrap();
        assert_eq!(out, "No availability for oral_surgeon on 07-08-2024.");

        let err = tool
            .execute(json!({"desired_date": "2024-08-07", "specialization": "oral_surgeon"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
