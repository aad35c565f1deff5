//! Module validation
//!
//! Name, version and artifact reference checks applied before registration.

pub mod descriptor_validator;

pub use descriptor_validator::{
    is_valid_checksum, is_valid_name, is_valid_version, DescriptorValidator, ValidationResult,
};
