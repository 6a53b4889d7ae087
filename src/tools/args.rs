//! 动作参数：结构化类型 + 边界校验
//!
//! 模型给出的 JSON 先反序列化为 *Args（字段名即协议），再校验为强类型：
//! 日期 `DD-MM-YYYY`、日期时间 `DD-MM-YYYY HH:MM`、7~8 位数字病人 ID、医生 / 专科白名单。

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scheduling::{DATE_FORMAT, DATE_SLOT_FORMAT};
use crate::tools::ToolError;

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("static regex"))
}

fn date_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4} \d{2}:\d{2}$").expect("static regex"))
}

fn id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{7,8}$").expect("static regex"))
}

/// 把调用参数解析为 T；失败时给出可读的错误让模型向用户追问
pub fn parse_args<T: DeserializeOwned>(action: &str, args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid arguments for {action}: {e}")))
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, ToolError> {
    let raw = raw.trim();
    if !date_re().is_match(raw) {
        return Err(ToolError::InvalidArguments(format!(
            "{field}: expected format 'DD-MM-YYYY', got '{raw}'"
        )));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| ToolError::InvalidArguments(format!("{field}: '{raw}' is not a valid date ({e})")))
}

pub fn parse_date_time(field: &str, raw: &str) -> Result<NaiveDateTime, ToolError> {
    let raw = raw.trim();
    if !date_time_re().is_match(raw) {
        return Err(ToolError::InvalidArguments(format!(
            "{field}: expected format 'DD-MM-YYYY HH:MM', got '{raw}'"
        )));
    }
    NaiveDateTime::parse_from_str(raw, DATE_SLOT_FORMAT).map_err(|e| {
        ToolError::InvalidArguments(format!("{field}: '{raw}' is not a valid date and time ({e})"))
    })
}

/// 病人 ID：模型可能给数字也可能给字符串
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum IdNumber {
    Number(u64),
    Text(String),
}

impl IdNumber {
    pub fn validate(&self) -> Result<u32, ToolError> {
        let raw = match self {
            IdNumber::Number(n) => n.to_string(),
            IdNumber::Text(s) => s.trim().to_string(),
        };
        if !id_re().is_match(&raw) {
            return Err(ToolError::InvalidArguments(format!(
                "id_number: ID should be 7 or 8 digits, got '{raw}'"
            )));
        }
        raw.parse()
            .map_err(|_| ToolError::InvalidArguments(format!("id_number: '{raw}' is not a number")))
    }
}

/// 医生 / 专科白名单；列表为空表示不限制
#[derive(Debug, Clone, Default)]
pub struct NameCatalog {
    doctors: Vec<String>,
    specializations: Vec<String>,
}

impl NameCatalog {
    pub fn new(doctors: &[String], specializations: &[String]) -> Self {
        Self {
            doctors: doctors.iter().map(|d| normalize(d)).collect(),
            specializations: specializations.iter().map(|s| normalize(s)).collect(),
        }
    }

    pub fn doctor(&self, raw: &str) -> Result<String, ToolError> {
        check_listed("doctor_name", raw, &self.doctors)
    }

    pub fn specialization(&self, raw: &str) -> Result<String, ToolError> {
        check_listed("specialization", raw, &self.specializations)
    }

    pub fn doctors(&self) -> &[String] {
        &self.doctors
    }

    pub fn specializations(&self) -> &[String] {
        &self.specializations
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn check_listed(field: &str, raw: &str, allowed: &[String]) -> Result<String, ToolError> {
    let name = normalize(raw);
    if name.is_empty() {
        return Err(ToolError::InvalidArguments(format!("{field} is required")));
    }
    if !allowed.is_empty() && !allowed.contains(&name) {
        return Err(ToolError::InvalidArguments(format!(
            "{field}: unknown value '{raw}', expected one of: {}",
            allowed.join(", ")
        )));
    }
    Ok(name)
}

/// 在 schema 中给白名单字段加上 enum 约束
pub fn with_enum(mut schema: Value, field: &str, values: &[String]) -> Value {
    if values.is_empty() {
        return schema;
    }
    if let Some(prop) = schema
        .get_mut("properties")
        .and_then(|p| p.get_mut(field))
        .and_then(Value::as_object_mut)
    {
        prop.insert(
            "enum".to_string(),
            Value::Array(values.iter().cloned().map(Value::String).collect()),
        );
    }
    schema
}

/// 把 schemars 生成的根 schema 转成 JSON 值（去掉 $schema / title 噪音）
pub fn schema_value<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or(Value::Object(Map::new()));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// check_by_doctor
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckByDoctorArgs {
    /// Date as 'DD-MM-YYYY'
    pub desired_date: String,
    /// Doctor's full name, lower case
    pub doctor_name: String,
}

/// check_by_specialization
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckBySpecializationArgs {
    /// Date as 'DD-MM-YYYY'
    pub desired_date: String,
    /// Specialization, e.g. general_dentist
    pub specialization: String,
}

/// book
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BookArgs {
    /// Date and time as 'DD-MM-YYYY HH:MM'
    pub desired_date: String,
    /// Patient identification number, 7 or 8 digits
    pub id_number: IdNumber,
    pub doctor_name: String,
}

/// cancel
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelArgs {
    /// Date and time of the booked appointment as 'DD-MM-YYYY HH:MM'
    pub date: String,
    /// Patient identification number, 7 or 8 digits
    pub id_number: IdNumber,
    pub doctor_name: String,
}

/// reschedule
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RescheduleArgs {
    /// Current appointment as 'DD-MM-YYYY HH:MM'
    pub old_date: String,
    /// Desired new slot as 'DD-MM-YYYY HH:MM'
    pub new_date: String,
    /// Patient identification number, 7 or 8 digits
    pub id_number: IdNumber,
    pub doctor_name: String,
}
