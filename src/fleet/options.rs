//! Coordinator options

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{FleetError, Result};

/// Opaque key/value properties pushed to every configured engine
pub type Properties = BTreeMap<String, String>;

pub const DEFAULT_RETRY_COUNT: u32 = 1;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;

/// Options controlling fleet initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetOptions {
    /// Number of configuration rounds (at least 1)
    pub retry_count: u32,
    /// Pause before every round after the first
    pub retry_delay: Duration,
    /// Run with the engines that did configure when some never do
    pub continue_on_fail: bool,
    /// Properties sent to each engine after a successful configure
    pub properties: Properties,
    /// Upper bound on every remote call, if any
    pub call_timeout: Option<Duration>,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            continue_on_fail: false,
            properties: Properties::new(),
            call_timeout: None,
        }
    }
}

impl FleetOptions {
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_continue_on_fail(mut self, continue_on_fail: bool) -> Self {
        self.continue_on_fail = continue_on_fail;
        self
    }

    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Reject options the retry loop cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.retry_count == 0 {
            return Err(FleetError::Validation(
                "retry_count must be at least 1".to_string(),
            ));
        }
        if self.call_timeout == Some(Duration::ZERO) {
            return Err(FleetError::Validation(
                "call_timeout must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}
