//! Record repository: validation and CRUD execution.

pub mod store;
pub mod validation;

pub use store::RecordStore;
pub use validation::{check_unique, missing_required, require_fields, unique_groups, UniqueGroup};
