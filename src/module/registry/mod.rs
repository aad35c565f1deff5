//! Module registry
//!
//! Live table of module instances plus the audit log of retired records.

pub mod retired;
pub mod table;

pub use retired::{RetiredEntry, RetiredLog};
pub use table::{ModuleRegistry, DEFAULT_RETIRED_CAPACITY, DEFAULT_RETIRED_TTL_SECS};
