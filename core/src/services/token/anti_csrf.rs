//! Anti-CSRF values bound to token issuance.

use constant_time_eq::constant_time_eq;
use uuid::Uuid;

/// Mints a fresh anti-CSRF value to bind to a token issuance
pub fn generate_anti_csrf_token() -> String {
    Uuid::new_v4().to_string()
}

/// Constant-time comparison of the value bound into a token against the one
/// presented in the request
pub fn anti_csrf_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.map_or(false, |p| {
        constant_time_eq(expected.as_bytes(), p.as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_values_are_unique() {
        assert_ne!(generate_anti_csrf_token(), generate_anti_csrf_token());
    }

    #[test]
    fn test_matching_value_passes() {
        let value = generate_anti_csrf_token();
        assert!(anti_csrf_matches(&value, Some(&value)));
    }

    #[test]
    fn test_wrong_or_absent_value_fails() {
        let value = generate_anti_csrf_token();
        assert!(!anti_csrf_matches(&value, Some("something-else")));
        assert!(!anti_csrf_matches(&value, None));
    }
}
