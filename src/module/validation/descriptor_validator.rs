//! Descriptor validation
//!
//! Checks module identity and artifact references before anything is
//! registered, so malformed commands never reach the registry.

use tracing::{debug, warn};

use crate::module::traits::{ArtifactRef, ModuleKey};

/// Maximum length of a module name or version
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// Length of a hex-encoded SHA-256 digest
pub const SHA256_HEX_LEN: usize = 64;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    /// Invalid with one message per problem found
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Joined error messages, empty when valid
    pub fn message(&self) -> String {
        match self {
            ValidationResult::Valid => String::new(),
            ValidationResult::Invalid(errors) => errors.join("; "),
        }
    }
}

/// Validator for module keys and artifact references
#[derive(Debug, Clone, Default)]
pub struct DescriptorValidator;

impl DescriptorValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a module key
    pub fn validate_key(&self, key: &ModuleKey) -> ValidationResult {
        let mut errors = Vec::new();
        self.check_key(key, &mut errors);
        self.finish(key, errors)
    }

    /// Validate a module key together with the artifact it will be loaded from
    pub fn validate_install(&self, key: &ModuleKey, artifact: &ArtifactRef) -> ValidationResult {
        let mut errors = Vec::new();
        self.check_key(key, &mut errors);

        if artifact.location.trim().is_empty() {
            errors.push("Artifact location cannot be empty".to_string());
        }

        if let Some(checksum) = &artifact.checksum {
            if !is_valid_checksum(checksum) {
                errors.push(format!(
                    "Invalid checksum: {} (expected {} hex characters)",
                    checksum, SHA256_HEX_LEN
                ));
            }
        }

        self.finish(key, errors)
    }

    fn check_key(&self, key: &ModuleKey, errors: &mut Vec<String>) {
        if !is_valid_name(&key.name) {
            errors.push(format!(
                "Invalid module name: {:?} (must be alphanumeric with dashes/underscores)",
                key.name
            ));
        }
        if !is_valid_version(&key.version) {
            errors.push(format!("Invalid module version: {:?}", key.version));
        }
    }

    fn finish(&self, key: &ModuleKey, errors: Vec<String>) -> ValidationResult {
        if errors.is_empty() {
            debug!("Descriptor validation passed for {}", key);
            ValidationResult::Valid
        } else {
            warn!("Descriptor validation failed for {}: {:?}", key, errors);
            ValidationResult::Invalid(errors)
        }
    }
}

/// Module name: alphanumeric start, then alphanumerics, dashes or underscores
#[inline]
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    if !name.chars().next().map_or(false, |c| c.is_alphanumeric()) {
        return false;
    }

    name.chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
}

/// Module version
///
/// Versions are opaque labels and are never ordered, so only the character
/// set is constrained: alphanumeric start, then alphanumerics or `.-_+`.
#[inline]
pub fn is_valid_version(version: &str) -> bool {
    if version.is_empty() || version.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    if !version.chars().next().map_or(false, |c| c.is_ascii_alphanumeric()) {
        return false;
    }

    version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'))
}

/// Hex-encoded SHA-256 digest
#[inline]
pub fn is_valid_checksum(checksum: &str) -> bool {
    checksum.len() == SHA256_HEX_LEN && checksum.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("biz"));
        assert!(is_valid_name("order-service_2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name(&"a".repeat(65)));
    }

    #[test]
    fn test_valid_versions() {
        assert!(is_valid_version("1.0.0"));
        assert!(is_valid_version("1.0.0-SNAPSHOT"));
        assert!(is_valid_version("2024.01+build.7"));
        assert!(is_valid_version("v2"));
        assert!(!is_valid_version(""));
        assert!(!is_valid_version(".1"));
        assert!(!is_valid_version("1.0/evil"));
    }

    #[test]
    fn test_checksum_format() {
        assert!(is_valid_checksum(&"ab".repeat(32)));
        assert!(!is_valid_checksum("abc"));
        assert!(!is_valid_checksum(&"zz".repeat(32)));
    }

    #[test]
    fn test_validate_install_collects_all_errors() {
        let validator = DescriptorValidator::new();
        let key = ModuleKey::new("", "");
        let artifact = ArtifactRef::new(" ").with_checksum("nope");

        match validator.validate_install(&key, &artifact) {
            ValidationResult::Invalid(errors) => assert_eq!(errors.len(), 4),
            ValidationResult::Valid => panic!("expected validation failure"),
        }
    }

    #[test]
    fn test_validate_install_ok() {
        let validator = DescriptorValidator::new();
        let result = validator.validate_install(
            &ModuleKey::new("biz", "1.0.0"),
            &ArtifactRef::new("file:///tmp/biz.jar"),
        );
        assert!(result.is_valid());
        assert!(result.message().is_empty());
    }
}
