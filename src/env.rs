//! Environment variable substitution for configuration values
//!
//! Configuration values may reference environment variables with the
//! `${VAR_NAME}` syntax, e.g. `cephfs.id ${CEPH_CLIENT_ID}`.

use std::borrow::Cow;
use std::env;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::ConfigError;

/// Matches `${VAR_NAME}` references
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static pattern is valid")
});

/// Expand `${VAR}` references in a configuration value.
///
/// Values without references are returned borrowed. If any referenced
/// variable is unset the error lists every missing name once.
pub fn substitute_env_vars(input: &str) -> Result<Cow<'_, str>, ConfigError> {
    let mut missing: Vec<String> = Vec::new();

    let expanded = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "Missing environment variables: {}",
            missing.join(", ")
        )));
    }

    Ok(expanded)
}
