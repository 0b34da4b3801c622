//! API-key gate for the HTTP surface.
//!
//! Every session route is guarded by an optional API-key check: the presented
//! header value is trimmed of surrounding whitespace and compared against a
//! configured allow-list. An empty allow-list disables the gate entirely.
//! This is plumbing around the session core, not token logic — rejections here
//! are plain 401s, never part of the session status vocabulary.

use constant_time_eq::constant_time_eq;

/// Configured API-key allow-list
#[derive(Debug, Clone, Default)]
pub struct ApiKeyGate {
    keys: Vec<String>,
}

impl ApiKeyGate {
    /// Builds a gate from configured keys; keys are trimmed and empties
    /// discarded, so a config of `" , "` yields a disabled gate.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// A gate that lets everything through.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Checks a presented header value against the allow-list.
    ///
    /// Returns `true` when the gate is disabled, or when the trimmed value
    /// matches any configured key. Comparison per candidate is constant-time.
    pub fn authorize(&self, header_value: Option<&str>) -> bool {
        if !self.is_enabled() {
            return true;
        }
        let Some(presented) = header_value.map(str::trim) else {
            return false;
        };
        if presented.is_empty() {
            return false;
        }
        self.keys
            .iter()
            .any(|key| constant_time_eq(key.as_bytes(), presented.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_gate_admits_anything() {
        let gate = ApiKeyGate::disabled();
        assert!(!gate.is_enabled());
        assert!(gate.authorize(None));
        assert!(gate.authorize(Some("whatever")));
    }

    #[test]
    fn enabled_gate_requires_a_key() {
        let gate = ApiKeyGate::new(vec!["k1".into(), "k2".into()]);
        assert!(gate.is_enabled());
        assert!(!gate.authorize(None));
        assert!(!gate.authorize(Some("")));
        assert!(!gate.authorize(Some("k3")));
        assert!(gate.authorize(Some("k2")));
    }

    #[test]
    fn presented_value_is_trimmed() {
        let gate = ApiKeyGate::new(vec!["secret".into()]);
        assert!(gate.authorize(Some("  secret  ")));
        assert!(gate.authorize(Some("\tsecret\n")));
        assert!(!gate.authorize(Some("sec ret")));
    }

    #[test]
    fn configured_keys_are_trimmed_and_empties_dropped() {
        let gate = ApiKeyGate::new(vec!["  k1 ".into(), "   ".into(), String::new()]);
        assert!(gate.is_enabled());
        assert!(gate.authorize(Some("k1")));

        let gate = ApiKeyGate::new(vec!["  ".into()]);
        assert!(!gate.is_enabled());
    }
}
