//! Per-open options and file layout hints
//!
//! The host passes opaque per-request options as a CGI-style string
//! (`k1=v1&k2=v2`). File opens pick the striping parameters out of it and
//! hand them to the client's layout-aware open.

use std::collections::HashMap;

use tracing::trace;

use crate::config::Variant;

/// Key/value options attached to a single host request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenEnv {
    vars: HashMap<String, String>,
}

impl OpenEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a CGI-style `k=v&k=v` string. Pairs without `=` are kept with
    /// an empty value; empty segments are skipped.
    pub fn from_cgi(cgi: &str) -> Self {
        let vars = cgi
            .trim_start_matches('?')
            .split('&')
            .filter(|seg| !seg.is_empty())
            .map(|seg| match seg.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (seg.to_string(), String::new()),
            })
            .collect();
        Self { vars }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Integer value for `key`; `None` when absent or not a number
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }
}

/// Striping and placement parameters for a newly created file.
/// Zero means "use the filesystem default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutHints {
    pub stripe_unit: u32,
    pub stripe_count: u32,
    pub object_size: u32,
    pub pool: Option<String>,
}

impl LayoutHints {
    /// Extract layout hints from per-open options using the variant's key
    /// namespace. Missing, malformed or negative numbers become zero.
    pub fn from_env(env: &OpenEnv, variant: Variant) -> Self {
        let prefix = variant.open_prefix();
        let key = |name: &str| format!("{}{}", prefix, name);

        let hints = Self {
            stripe_unit: clamp_hint(env.get_int(&key("stripe_unit"))),
            stripe_count: clamp_hint(env.get_int(&key("stripe_count"))),
            object_size: clamp_hint(env.get_int(&key("object_size"))),
            pool: env
                .get(&key(variant.pool_key()))
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        };
        trace!("layout hints: {:?}", hints);
        hints
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

fn clamp_hint(value: Option<i64>) -> u32 {
    match value {
        Some(v) if v > 0 => v.min(u32::MAX as i64) as u32,
        _ => 0,
    }
}
