//! Attribute container configuration
//!
//! Limits can be overridden programmatically or through the standard
//! `OTEL_ATTRIBUTE_COUNT_LIMIT` / `OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT`
//! environment variables.
use crate::global::{self, ErrorHandlers};
use crate::otel_warn;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Maximum number of attributes a single container accepts.
pub const OTEL_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_ATTRIBUTE_COUNT_LIMIT";
/// Maximum length of string attribute values.
pub const OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT: &str = "OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT";

pub(crate) const DEFAULT_ATTRIBUTE_COUNT_LIMIT: u32 = 128;

/// Limits applied to every [`AttributeContainer`](super::AttributeContainer).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct AttributeLimits {
    /// The max number of distinct keys visible through a container.
    pub attribute_count_limit: u32,
    /// The max length of string values, in characters. `None` means unlimited.
    pub attribute_value_length_limit: Option<u32>,
}

impl Default for AttributeLimits {
    fn default() -> Self {
        AttributeLimits {
            attribute_count_limit: DEFAULT_ATTRIBUTE_COUNT_LIMIT,
            attribute_value_length_limit: None,
        }
    }
}

impl AttributeLimits {
    /// Default limits overridden by any valid environment variable.
    pub fn from_env() -> Self {
        let mut limits = AttributeLimits::default();
        if let Some(count) = read_limit(OTEL_ATTRIBUTE_COUNT_LIMIT) {
            limits.attribute_count_limit = count;
        }
        if let Some(length) = read_limit(OTEL_ATTRIBUTE_VALUE_LENGTH_LIMIT) {
            limits.attribute_value_length_limit = Some(length);
        }
        limits
    }

    /// Overrides the attribute count limit.
    pub fn with_attribute_count_limit(mut self, limit: u32) -> Self {
        self.attribute_count_limit = limit;
        self
    }

    /// Overrides the value length limit.
    pub fn with_attribute_value_length_limit(mut self, limit: u32) -> Self {
        self.attribute_value_length_limit = Some(limit);
        self
    }
}

fn read_limit(var: &str) -> Option<u32> {
    let raw = env::var(var).ok()?;
    match u32::from_str(raw.trim()) {
        Ok(limit) => Some(limit),
        Err(_) => {
            otel_warn!(
                name: "AttributeLimits.InvalidEnvironmentValue",
                variable = var.to_string(),
                value = raw,
                message = "value must be a non-negative integer, falling back to the default"
            );
            None
        }
    }
}

/// Configuration consumed when creating attribute containers.
#[derive(Clone, Debug)]
pub struct Config {
    /// Count and length limits.
    pub limits: AttributeLimits,
    error_handlers: Option<Arc<dyn ErrorHandlers>>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            limits: AttributeLimits::from_env(),
            error_handlers: None,
        }
    }
}

impl Config {
    /// Configuration with the given limits and the global error handlers.
    pub fn new(limits: AttributeLimits) -> Self {
        Config {
            limits,
            error_handlers: None,
        }
    }

    /// Routes this configuration's diagnostics to `handlers` instead of the
    /// global ones.
    pub fn with_error_handlers<H: ErrorHandlers + 'static>(mut self, handlers: H) -> Self {
        self.error_handlers = Some(Arc::new(handlers));
        self
    }

    pub(crate) fn resolve_error_handlers(&self) -> Arc<dyn ErrorHandlers> {
        self.error_handlers
            .clone()
            .unwrap_or_else(global::error_handlers)
    }
}
