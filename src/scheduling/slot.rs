//! 预约时段（数据文件中的一行）

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::scheduling::StoreError;

/// date_slot 列格式
pub const DATE_SLOT_FORMAT: &str = "%d-%m-%Y %H:%M";
/// 只有日期时的格式
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// 一个医生在某个时间点的可预约单元；attending 仅在不可预约时存在
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppointmentSlot {
    pub doctor_name: String,
    pub specialization: String,
    pub slot: NaiveDateTime,
    pub is_available: bool,
    pub patient_id: Option<u32>,
}

impl AppointmentSlot {
    pub fn open(doctor_name: &str, specialization: &str, slot: NaiveDateTime) -> Self {
        Self {
            doctor_name: doctor_name.to_string(),
            specialization: specialization.to_string(),
            slot,
            is_available: true,
            patient_id: None,
        }
    }

    pub fn date_string(&self) -> String {
        self.slot.format(DATE_FORMAT).to_string()
    }

    pub fn time_string(&self) -> String {
        self.slot.format("%H:%M").to_string()
    }

    pub fn occupy(&mut self, patient_id: u32) {
        self.is_available = false;
        self.patient_id = Some(patient_id);
    }

    pub fn release(&mut self) {
        self.is_available = true;
        self.patient_id = None;
    }

    pub fn is_booked_by(&self, patient_id: u32) -> bool {
        !self.is_available && self.patient_id == Some(patient_id)
    }
}

/// CSV 行的原始形态（列名与数据文件一致）
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SlotRecord {
    pub doctor_name: String,
    pub specialization: String,
    pub date_slot: String,
    pub is_available: String,
    #[serde(default)]
    pub patient_to_attend: String,
}

impl SlotRecord {
    pub fn into_slot(self, line: usize) -> Result<AppointmentSlot, StoreError> {
        let parse_err = |message: String| StoreError::Parse { line, message };

        let slot = NaiveDateTime::parse_from_str(self.date_slot.trim(), DATE_SLOT_FORMAT)
            .map_err(|e| parse_err(format!("date_slot '{}': {}", self.date_slot, e)))?;
        let is_available = parse_bool(&self.is_available)
            .ok_or_else(|| parse_err(format!("is_available '{}'", self.is_available)))?;
        let patient_id = parse_patient(&self.patient_to_attend)
            .map_err(|_| parse_err(format!("patient_to_attend '{}'", self.patient_to_attend)))?;

        let slot = AppointmentSlot {
            doctor_name: self.doctor_name.trim().to_lowercase(),
            specialization: self.specialization.trim().to_lowercase(),
            slot,
            is_available,
            patient_id,
        };
        if slot.is_available == slot.patient_id.is_some() {
            tracing::warn!(
                line,
                doctor = %slot.doctor_name,
                date_slot = %self.date_slot,
                "slot availability and attending patient disagree"
            );
        }
        Ok(slot)
    }

    pub fn from_slot(slot: &AppointmentSlot) -> Self {
        Self {
            doctor_name: slot.doctor_name.clone(),
            specialization: slot.specialization.clone(),
            date_slot: slot.slot.format(DATE_SLOT_FORMAT).to_string(),
            // 与既有数据文件保持一致（True / False）
            is_available: if slot.is_available { "True" } else { "False" }.to_string(),
            patient_to_attend: slot.patient_id.map(|p| p.to_string()).unwrap_or_default(),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// 空值 / nan 视为无；兼容 "1234567.0" 这类浮点写法
fn parse_patient(raw: &str) -> Result<Option<u32>, ()> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    if let Ok(v) = raw.parse::<u32>() {
        return Ok(Some(v));
    }
    let f: f64 = raw.parse().map_err(|_| ())?;
    if f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 {
        Ok(Some(f as u32))
    } else {
        Err(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(available: &str, patient: &str) -> SlotRecord {
        SlotRecord {
            doctor_name: " John Doe ".into(),
            specialization: "general_dentist".into(),
            date_slot: "05-08-2024 08:30".into(),
            is_available: available.into(),
            patient_to_attend: patient.into(),
        }
    }

    #[test]
    fn test_parse_float_patient_id() {
        let slot = record("False", "1000082.0").into_slot(2).unwrap();
        assert_eq!(slot.patient_id, Some(1000082));
        assert!(!slot.is_available);
        assert_eq!(slot.doctor_name, "john doe");
        assert_eq!(slot.date_string(), "05-08-2024");
        assert_eq!(slot.time_string(), "08:30");
    }

    #[test]
    fn test_parse_empty_patient() {
        let slot = record("True", "").into_slot(2).unwrap();
        assert!(slot.is_available);
        assert_eq!(slot.patient_id, None);
    }

    #[test]
    fn test_bad_rows_report_line() {
        let err = record("perhaps", "").into_slot(7).unwrap_err();
        assert!(matches!(err, StoreError::Parse { line: 7, .. }));
        let mut bad_date = record("True", "");
        bad_date.date_slot = "2024-08-05 08:30".into();
        assert!(bad_date.into_slot(3).is_err());
    }

    #[test]
    fn test_record_roundtrip_format() {
        let mut slot = record("True", "").into_slot(2).unwrap();
        slot.occupy(1234567);
        let rec = SlotRecord::from_slot(&slot);
        assert_eq!(rec.date_slot, "05-08-2024 08:30");
        assert_eq!(rec.is_available, "False");
        assert_eq!(rec.patient_to_attend, "1234567");
        slot.release();
        assert!(slot.is_available);
        assert_eq!(slot.patient_id, None);
    }
}
