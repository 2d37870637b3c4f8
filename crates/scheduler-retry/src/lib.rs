//! Bounded backoff for optimistic store transactions.
//!
//! The store gateway (`scheduler-store`) re-invokes a transaction body on
//! conflict up to a configured bound, per spec §4.1 and §5 ("Bounded
//! retries (e.g., 5) with small backoff; exhaustion → `transient_error`").
//! This crate isolates the delay calculation so it can be property-tested
//! on its own, the way the teacher isolates `calculate_delay` from the
//! engine that calls it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff shape for calculating delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// No delay between attempts.
    Immediate,
    /// Delay doubles each attempt (default).
    #[default]
    Exponential,
    /// Delay increases linearly each attempt.
    Linear,
}

/// Configuration for the store transaction retry loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Maximum number of attempts, including the first. Exhaustion surfaces
    /// as `SchedulerError::Transient` (spec §4.1, §5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", with = "duration_millis")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", with = "duration_millis")]
    pub max_delay: Duration,
    /// Jitter factor in `[0.0, 1.0]`; 0.5 means delay * (0.5 to 1.5).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay() -> Duration {
    Duration::from_millis(20)
}

fn default_max_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_jitter() -> f64 {
    0.3
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// `attempt` is 1-based: the delay to wait *before* the given attempt
/// number (attempt 1 never delays under any strategy's definition here,
/// since the caller always makes the first attempt immediately).
pub fn calculate_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let raw = match config.strategy {
        BackoffStrategy::Immediate => Duration::ZERO,
        BackoffStrategy::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        BackoffStrategy::Linear => config.base_delay.saturating_mul(attempt),
    };

    let capped = raw.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::RngExt;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::rng();
    let random_value: f64 = rng.random();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round().max(0.0) as u64;
    Duration::from_millis(millis)
}

/// Outcome of a retry loop that gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptsExhausted {
    pub attempts: u32,
}

impl From<AttemptsExhausted> for scheduler_types::SchedulerError {
    fn from(e: AttemptsExhausted) -> Self {
        scheduler_types::SchedulerError::Transient(format!(
            "store transaction did not land after {} attempts",
            e.attempts
        ))
    }
}

/// Run `body` up to `config.max_attempts` times, sleeping between attempts
/// per `calculate_delay`. `body` returns `Ok(Retry::Done(t))` to stop, or
/// `Ok(Retry::Conflict)` to try again; an `Err` short-circuits immediately
/// (the store gateway uses this for non-retryable failures).
pub enum Retry<T> {
    Done(T),
    Conflict,
}

pub async fn with_retry<T, E, F, Fut>(config: &BackoffConfig, mut body: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<Retry<T>, E>>,
    E: From<AttemptsExhausted>,
{
    for attempt in 1..=config.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(calculate_delay(config, attempt)).await;
        }
        match body(attempt).await? {
            Retry::Done(t) => return Ok(t),
            Retry::Conflict => continue,
        }
    }
    Err(AttemptsExhausted {
        attempts: config.max_attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_delay_doubles_and_caps() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Exponential,
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_millis(10));
        assert_eq!(calculate_delay(&config, 2), Duration::from_millis(20));
        assert_eq!(calculate_delay(&config, 3), Duration::from_millis(40));
        assert_eq!(calculate_delay(&config, 10), Duration::from_millis(100));
    }

    #[test]
    fn immediate_strategy_never_delays() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Immediate,
            ..BackoffConfig::default()
        };
        assert_eq!(calculate_delay(&config, 5), Duration::ZERO);
    }

    #[test]
    fn linear_delay_scales_with_attempt() {
        let config = BackoffConfig {
            strategy: BackoffStrategy::Linear,
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&config, 3), Duration::from_millis(30));
    }

    proptest::proptest! {
        #[test]
        fn delay_never_exceeds_max(
            base_ms in 1u64..5000,
            max_ms in 1u64..100_000,
            attempt in 1u32..50,
        ) {
            let config = BackoffConfig {
                strategy: BackoffStrategy::Exponential,
                max_attempts: 50,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms),
                jitter: 0.5,
            };
            let delay = calculate_delay(&config, attempt);
            // jitter can push up to 1.5x over the capped value
            assert!(delay.as_millis() as f64 <= max_ms as f64 * 1.5 + 1.0);
        }
    }

    #[derive(Debug)]
    enum TestError {
        Exhausted,
    }

    impl From<AttemptsExhausted> for TestError {
        fn from(_: AttemptsExhausted) -> Self {
            TestError::Exhausted
        }
    }

    #[tokio::test]
    async fn with_retry_returns_first_success() {
        let config = BackoffConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(0),
            ..BackoffConfig::default()
        };
        let result: Result<u32, TestError> =
            with_retry(&config, |attempt| async move { Ok(Retry::Done(attempt)) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn with_retry_exhausts_after_max_attempts() {
        let config = BackoffConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(0),
            ..BackoffConfig::default()
        };
        let result: Result<u32, TestError> =
            with_retry(&config, |_attempt| async move { Ok(Retry::Conflict) }).await;
        assert!(matches!(result, Err(TestError::Exhausted)));
    }

    #[tokio::test]
    async fn with_retry_succeeds_after_conflicts() {
        let config = BackoffConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(0),
            ..BackoffConfig::default()
        };
        let result: Result<u32, TestError> = with_retry(&config, |attempt| async move {
            if attempt < 3 {
                Ok(Retry::Conflict)
            } else {
                Ok(Retry::Done(attempt))
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }
}
