//! Environment variable helpers

/// Get environment variable as Option
///
/// Returns `Some(value)` if set and non-empty.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get environment variable as boolean
///
/// Returns `true` if value is "true", "1", "yes", "on" (case-insensitive).
/// Returns `false` otherwise or if not set.
pub fn env_bool(key: &str) -> bool {
    env_bool_opt(key).unwrap_or(false)
}

/// Get environment variable as boolean, `None` if unset or unrecognized
pub fn env_bool_opt(key: &str) -> Option<bool> {
    let value = env_opt(key)?.trim().to_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Get environment variable as integer
///
/// Returns `Some(value)` if set and parseable, `None` otherwise.
pub fn env_int<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env_opt(key)?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_parsing() {
        std::env::set_var("ARKLET_TEST_BOOL", "Yes");
        std::env::set_var("ARKLET_TEST_INT", " 17 ");
        std::env::set_var("ARKLET_TEST_EMPTY", "");

        assert!(env_bool("ARKLET_TEST_BOOL"));
        assert_eq!(env_int::<u32>("ARKLET_TEST_INT"), Some(17));
        assert_eq!(env_opt("ARKLET_TEST_EMPTY"), None);
        assert_eq!(env_bool_opt("ARKLET_TEST_EMPTY"), None);
        assert!(!env_bool("ARKLET_TEST_UNSET_VARIABLE"));

        std::env::remove_var("ARKLET_TEST_BOOL");
        std::env::remove_var("ARKLET_TEST_INT");
        std::env::remove_var("ARKLET_TEST_EMPTY");
    }
}
