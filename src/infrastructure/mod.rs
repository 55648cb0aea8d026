pub mod js_executor;
pub mod store;

pub use js_executor::JsExecutor;
pub use store::{AuditStore, FileAuditStore, MemoryAuditStore};
