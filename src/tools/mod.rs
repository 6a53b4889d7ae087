//! 动作层：注册表、参数校验、五个预约动作与执行器

pub mod appointment;
pub mod args;
pub mod availability;
pub mod executor;
pub mod registry;
pub mod schema;

pub use appointment::{BookTool, CancelTool, RescheduleTool};
pub use args::NameCatalog;
pub use availability::{format_am_pm, CheckByDoctorTool, CheckBySpecializationTool};
pub use executor::ToolExecutor;
pub use registry::{Tool, ToolError, ToolRegistry};
pub use schema::action_envelope_schema_json;

use std::sync::Arc;

use crate::scheduling::SchedulingStore;

/// 注册全部预约动作
pub fn appointment_registry(store: Arc<SchedulingStore>, catalog: Arc<NameCatalog>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(CheckByDoctorTool::new(store.clone(), catalog.clone()));
    tools.register(CheckBySpecializationTool::new(store.clone(), catalog.clone()));
    tools.register(BookTool::new(store.clone(), catalog.clone()));
    tools.register(CancelTool::new(store.clone(), catalog.clone()));
    tools.register(RescheduleTool::new(store, catalog));
    tools
}
