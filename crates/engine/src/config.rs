//! Runtime configuration of the engine.
//!
//! Configuration is either built explicitly with [`EngineConfig::new`] or
//! read once from `XFORMS_*` environment variables. Nothing else in the
//! engine consults the environment.

use core::time::Duration;
use std::env;
use xforms_dom::cache::DEFAULT_CACHE_SIZE;

/// Runtime configuration of a containing document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Whether dynamic XPath errors are logged and replaced by an empty
    /// result instead of failing the cycle.
    pub ignore_dynamic_xpath_errors: bool,
    /// Maximum number of trees in the shared instance cache.
    pub instance_cache_size: usize,
    /// TTL of shared instances that do not declare one.
    pub instance_cache_ttl_ms: Option<u64>,
    /// Whether revalidation runs `constraint`, `type` and `required` binds.
    pub bind_validation: bool,
    /// Deterministic ordering of outputs, for tests.
    pub test_mode: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(true, DEFAULT_CACHE_SIZE, None, true, false)
    }
}

impl EngineConfig {
    /// Construct a configuration with explicit values.
    ///
    /// A cache size of 0 is raised to 1 and a TTL of 0 means no expiry.
    #[inline]
    #[must_use]
    pub const fn new(
        ignore_dynamic_xpath_errors: bool,
        instance_cache_size: usize,
        instance_cache_ttl_ms: Option<u64>,
        bind_validation: bool,
        test_mode: bool,
    ) -> Self {
        let instance_cache_size = if instance_cache_size < 1 { 1 } else { instance_cache_size };
        let instance_cache_ttl_ms = match instance_cache_ttl_ms {
            Some(0) | None => None,
            Some(millis) => Some(millis),
        };
        Self {
            ignore_dynamic_xpath_errors,
            instance_cache_size,
            instance_cache_ttl_ms,
            bind_validation,
            test_mode,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// - `XFORMS_IGNORE_DYNAMIC_XPATH_ERRORS`: `1` to ignore dynamic XPath
    ///   errors (default: enabled)
    /// - `XFORMS_INSTANCE_CACHE_SIZE`: maximum cached instances (default: 200)
    /// - `XFORMS_INSTANCE_CACHE_TTL_MS`: default TTL, `0` for none (default: 0)
    /// - `XFORMS_BIND_VALIDATION`: `1` to validate with binds (default: enabled)
    /// - `XFORMS_TEST_MODE`: `1` for deterministic output (default: disabled)
    #[must_use]
    pub fn from_env() -> Self {
        let flag = |name: &str, default: bool| {
            env::var(name)
                .ok()
                .map_or(default, |value| value.trim() == "1" || value.trim().eq_ignore_ascii_case("true"))
        };
        let instance_cache_size = env::var("XFORMS_INSTANCE_CACHE_SIZE")
            .ok()
            .and_then(|val| val.parse::<usize>().ok())
            .unwrap_or(DEFAULT_CACHE_SIZE);
        let instance_cache_ttl_ms = env::var("XFORMS_INSTANCE_CACHE_TTL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok());
        Self::new(
            flag("XFORMS_IGNORE_DYNAMIC_XPATH_ERRORS", true),
            instance_cache_size,
            instance_cache_ttl_ms,
            flag("XFORMS_BIND_VALIDATION", true),
            flag("XFORMS_TEST_MODE", false),
        )
    }

    /// Default TTL of shared instances as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn instance_cache_ttl(&self) -> Option<Duration> {
        if let Some(millis) = self.instance_cache_ttl_ms {
            Some(Duration::from_millis(millis))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if explicit values are not normalised.
    #[test]
    fn explicit_values_are_normalised() {
        let config = EngineConfig::new(false, 0, Some(0), true, true);
        assert_eq!(config.instance_cache_size, 1);
        assert_eq!(config.instance_cache_ttl(), None);

        let config = EngineConfig::new(true, 10, Some(1500), false, false);
        assert_eq!(config.instance_cache_ttl(), Some(Duration::from_millis(1500)));
        assert!(!config.bind_validation);
    }

    /// # Panics
    /// Panics if defaults differ from the documented ones.
    #[test]
    fn defaults_are_lenient_and_validating() {
        let config = EngineConfig::default();
        assert!(config.ignore_dynamic_xpath_errors);
        assert!(config.bind_validation);
        assert_eq!(config.instance_cache_size, DEFAULT_CACHE_SIZE);
        assert!(!config.test_mode);
    }
}
