use crate::{Error, Result};
use core::time::Duration;

/// Default number of items per batch.
pub const DEFAULT_MAX_BATCH: usize = 50;

/// Default flush window, measured from the first item of a batch.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(16);

/// Flush policy for a [`Batcher`](crate::Batcher).
///
/// A batch is closed as soon as it holds `max_batch` items, or once `wait` has
/// elapsed since its first item arrived, whichever comes first. `max_batch` is
/// also the capacity of the intake channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub max_batch: usize,
    pub wait: Duration,
}

impl BatchConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_batch` is zero or `wait` is
    /// zero.
    pub fn new(max_batch: usize, wait: Duration) -> Result<Self> {
        let config = Self { max_batch, wait };
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub const fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    #[must_use]
    pub const fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Checks the invariants required by the worker loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] describing the first violated bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 {
            return Err(Error::InvalidConfig {
                reason: "max_batch must be greater than 0".to_string(),
            });
        }
        if self.wait.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "wait must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch: DEFAULT_MAX_BATCH,
            wait: DEFAULT_WAIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = BatchConfig::default();
        assert_eq!(config.max_batch, 50);
        assert_eq!(config.wait, Duration::from_millis(16));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_batch() {
        let err = BatchConfig::new(0, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("max_batch"));
    }

    #[test]
    fn rejects_zero_wait() {
        let err = BatchConfig::default()
            .with_wait(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("wait"));
    }

    #[test]
    fn builders_override_fields() {
        let config = BatchConfig::default()
            .with_max_batch(3)
            .with_wait(Duration::from_secs(1));
        assert_eq!(config, BatchConfig::new(3, Duration::from_secs(1)).unwrap());
    }
}
