use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::delay::RetryDelay;
use crate::error::Error;

/// Environment variable holding the ceiling on a single retry wait, in seconds.
pub const MAX_WAIT_SECONDS_VAR: &str = "TOY_SETTINGS_MAX_WAIT_SECONDS";
/// Environment variable holding the maximum number of retries.
pub const MAX_RETRIES_VAR: &str = "TOY_SETTINGS_MAX_RETRIES";

const DEFAULT_MAX_RETRIES: u32 = 10;

/// How [`execute`](crate::execute) retries a command that hit stale state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteConfig {
    max_retries: u32,
    retry_delay: RetryDelay,
}

impl ExecuteConfig {
    /// Read overrides from the environment on top of the defaults.
    ///
    /// Unset variables keep their default; malformed ones are an
    /// [`Error::InvalidConfig`].
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(seconds) = parse_var::<u64>(MAX_WAIT_SECONDS_VAR)? {
            config = config.with_max_wait_seconds(seconds);
        }
        if let Some(retries) = parse_var::<u32>(MAX_RETRIES_VAR)? {
            config = config.with_max_retries(retries)?;
        }
        Ok(config)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> RetryDelay {
        self.retry_delay
    }

    /// Wait before the next attempt, given that `retries` retries already
    /// happened, or `None` once the retry budget is spent.
    pub fn backoff(&self, retries: u32) -> Option<Duration> {
        (retries < self.max_retries).then(|| self.retry_delay.calculate_delay(retries))
    }

    pub fn with_max_retries(self, max_retries: u32) -> Result<Self, Error> {
        if max_retries == 0 {
            return Err(Error::invalid_config(
                "max_retries cannot be 0",
                "max_retries",
            ));
        }
        Ok(Self {
            max_retries,
            ..self
        })
    }

    pub fn with_base_delay(self, base_delay_ms: u64) -> Result<Self, Error> {
        if base_delay_ms == 0 {
            return Err(Error::invalid_config(
                "base_retry_delay_ms cannot be 0",
                "base_retry_delay_ms",
            ));
        }
        Ok(Self {
            retry_delay: RetryDelay::new(base_delay_ms, self.retry_delay.max_delay_ms()),
            ..self
        })
    }

    /// Cap any single wait between attempts at `max_wait_seconds`. Zero
    /// retries immediately.
    pub fn with_max_wait_seconds(self, max_wait_seconds: u64) -> Self {
        Self {
            retry_delay: RetryDelay::new(
                self.retry_delay.base_delay_ms(),
                max_wait_seconds.saturating_mul(1_000),
            ),
            ..self
        }
    }

    pub fn with_retry_delay(self, retry_delay: RetryDelay) -> Self {
        Self {
            retry_delay,
            ..self
        }
    }
}

impl Default for ExecuteConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: RetryDelay::default(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>, Error>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| Error::invalid_config(format!("{raw:?} is not valid: {err}"), name)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(Error::invalid_config("not valid unicode", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ExecuteConfig::default();
        assert_eq!(config.max_retries(), 10);
        assert_eq!(config.retry_delay().base_delay_ms(), 100);
        assert_eq!(config.retry_delay().max_delay_ms(), 5_000);
    }

    #[test]
    fn max_wait_is_converted_to_milliseconds() {
        let config = ExecuteConfig::default().with_max_wait_seconds(10);
        assert_eq!(config.retry_delay().max_delay_ms(), 10_000);
        assert_eq!(config.retry_delay().base_delay_ms(), 100);
    }

    #[test]
    fn base_delay_keeps_the_ceiling() {
        let config = ExecuteConfig::default()
            .with_max_wait_seconds(2)
            .with_base_delay(7)
            .unwrap();
        assert_eq!(config.retry_delay(), RetryDelay::new(7, 2_000));
    }

    #[test]
    fn backoff_stops_at_the_retry_budget() {
        let config = ExecuteConfig::default()
            .with_max_retries(2)
            .unwrap()
            .with_retry_delay(RetryDelay::new(10, 20));

        assert!(config.backoff(0).is_some_and(|wait| wait <= Duration::from_millis(10)));
        assert!(config.backoff(1).is_some_and(|wait| wait <= Duration::from_millis(20)));
        assert_eq!(config.backoff(2), None);
        assert_eq!(config.backoff(u32::MAX), None);
    }

    #[test]
    fn malformed_variable_is_invalid_config() {
        // not read by any other test
        let name = "TOY_SETTINGS_TEST_MALFORMED";
        unsafe { env::set_var(name, "soon") };
        match parse_var::<u64>(name) {
            Err(Error::InvalidConfig { parameter, .. }) => {
                assert_eq!(parameter.as_deref(), Some(name));
            }
            other => panic!("Expected InvalidConfig error, got {:?}", other),
        }
        unsafe { env::remove_var(name) };
        assert!(matches!(parse_var::<u64>(name), Ok(None)));
    }
}
