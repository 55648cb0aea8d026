pub mod action_executor;
pub mod chromium_executor;
pub mod dry_run_executor;
pub mod mapping;
pub mod masking;
pub mod validator;

pub use action_executor::{ActionExecutor, ExecutorFactory, SharedExecutor};
pub use chromium_executor::{ChromiumExecutor, ChromiumExecutorFactory, FormSettings};
pub use dry_run_executor::DryRunExecutor;
pub use mapping::{FieldMapping, SelectorCatalog};
pub use masking::{FieldMasker, MaskingError};
pub use validator::{RuleValidator, Validator};
