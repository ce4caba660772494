use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("min_compensation ({min:?}) exceeds max_compensation ({max:?})")]
    MinExceedsMax { min: Duration, max: Duration },
    #[error("snapshot_buffer_size must be at least 1")]
    EmptyBuffer,
    #[error("Unknown preset '{0}' (expected 'default' or 'high-latency')")]
    UnknownPreset(String),
}

/// Named compensation presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    /// Regular broadband players, rewinds up to 500 ms
    Default,
    /// Anonymizing networks and satellite links, rewinds up to 5 s
    HighLatency,
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Preset::Default),
            "high-latency" | "high_latency" => Ok(Preset::HighLatency),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}

/// Lag compensation bounds
///
/// Immutable once handed to a `LagCompensator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationConfig {
    /// Furthest a rewind may reach into the past
    pub max_compensation: Duration,
    /// Floor applied to any non-zero claimed latency
    pub min_compensation: Duration,
    /// Number of snapshots retained in the ring buffer
    pub snapshot_buffer_size: usize,
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            max_compensation: Duration::from_millis(500),
            min_compensation: Duration::ZERO,
            // 1.6 s of history at the 20 Hz reference tick rate
            snapshot_buffer_size: 32,
        }
    }
}

impl CompensationConfig {
    /// Preset for anonymizing/satellite links
    pub fn high_latency() -> Self {
        Self {
            max_compensation: Duration::from_millis(5000),
            min_compensation: Duration::ZERO,
            // 6.4 s of history at 20 Hz
            snapshot_buffer_size: 128,
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Default => Self::default(),
            Preset::HighLatency => Self::high_latency(),
        }
    }

    /// Custom bounds, validated
    pub fn custom(
        max_compensation: Duration,
        min_compensation: Duration,
        snapshot_buffer_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_compensation,
            min_compensation,
            snapshot_buffer_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// History a full buffer holds when recording every `tick_interval`
    pub fn history_span(&self, tick_interval: Duration) -> Duration {
        let gaps = u32::try_from(self.snapshot_buffer_size.saturating_sub(1)).unwrap_or(u32::MAX);
        tick_interval.saturating_mul(gaps)
    }

    /// Smallest buffer whose history reaches back `max_compensation`
    pub fn required_buffer_size(&self, tick_interval: Duration) -> usize {
        if tick_interval.is_zero() {
            return self.snapshot_buffer_size;
        }
        let ticks = self
            .max_compensation
            .as_nanos()
            .div_ceil(tick_interval.as_nanos());
        usize::try_from(ticks).unwrap_or(usize::MAX).saturating_add(1)
    }

    /// Grow the buffer until a full history covers `max_compensation`
    ///
    /// A shorter history would answer in-bounds latencies from the oldest
    /// snapshot without flagging a latency clamp.
    pub fn fit_to_tick_interval(mut self, tick_interval: Duration) -> Self {
        let required = self.required_buffer_size(tick_interval);
        if self.snapshot_buffer_size < required {
            tracing::warn!(
                "Snapshot buffer of {} covers {:?} at {:?} ticks, below max_compensation {:?}; growing to {}",
                self.snapshot_buffer_size,
                self.history_span(tick_interval),
                tick_interval,
                self.max_compensation,
                required
            );
            self.snapshot_buffer_size = required;
        }
        self
    }

    /// Load config from environment or use defaults
    ///
    /// `LAGCOMP_PRESET` selects the base preset, then `LAGCOMP_MAX_MS`,
    /// `LAGCOMP_MIN_MS` and `LAGCOMP_BUFFER_SIZE` override individual fields.
    pub fn load_or_default() -> Self {
        let mut config = match std::env::var("LAGCOMP_PRESET") {
            Ok(name) => match name.parse::<Preset>() {
                Ok(preset) => Self::from_preset(preset),
                Err(e) => {
                    tracing::warn!("{}, using default preset", e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };

        if let Ok(max_ms) = std::env::var("LAGCOMP_MAX_MS") {
            if let Ok(parsed) = max_ms.parse::<u64>() {
                config.max_compensation = Duration::from_millis(parsed);
            } else {
                tracing::warn!("Invalid LAGCOMP_MAX_MS '{}', using default", max_ms);
            }
        }

        if let Ok(min_ms) = std::env::var("LAGCOMP_MIN_MS") {
            if let Ok(parsed) = min_ms.parse::<u64>() {
                config.min_compensation = Duration::from_millis(parsed);
            } else {
                tracing::warn!("Invalid LAGCOMP_MIN_MS '{}', using default", min_ms);
            }
        }

        if let Ok(size) = std::env::var("LAGCOMP_BUFFER_SIZE") {
            if let Ok(parsed) = size.parse::<usize>() {
                if parsed > 0 && parsed <= 100_000 {
                    config.snapshot_buffer_size = parsed;
                } else {
                    tracing::warn!("LAGCOMP_BUFFER_SIZE must be 1-100000, using default");
                }
            } else {
                tracing::warn!("Invalid LAGCOMP_BUFFER_SIZE '{}', using default", size);
            }
        }

        if let Err(e) = config.validate() {
            tracing::warn!("Invalid compensation config from environment ({}), using defaults", e);
            return Self::default();
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_compensation > self.max_compensation {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_compensation,
                max: self.max_compensation,
            });
        }
        if self.snapshot_buffer_size == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        Ok(())
    }
}

/// Settings for the demo session run by the binary
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Snapshots recorded per second
    pub tick_rate: u32,
    /// Simulated entities moving through the world
    pub entity_count: usize,
    /// Port for the Prometheus metrics endpoint
    pub metrics_port: u16,
    /// Hit claims generated per second across all simulated shooters
    pub claim_rate: u32,
    /// Capacity of the hit-claim queue between shooters and validators
    pub claim_buffer_size: usize,
    /// Number of validator workers draining the claim queue
    pub validator_workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            entity_count: 16,
            metrics_port: 9090,
            claim_rate: 40,
            claim_buffer_size: 1000,
            validator_workers: 4,
        }
    }
}

impl SessionConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=240).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-240, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Ok(count) = std::env::var("ENTITY_COUNT") {
            match count.parse::<usize>() {
                Ok(parsed) if parsed >= 2 => config.entity_count = parsed,
                Ok(_) => tracing::warn!("ENTITY_COUNT must be at least 2, using default"),
                Err(_) => tracing::warn!("Invalid ENTITY_COUNT '{}', using default", count),
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.metrics_port = parsed,
                Ok(_) => tracing::warn!("METRICS_PORT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid METRICS_PORT '{}', using default", port),
            }
        }

        if let Ok(rate) = std::env::var("CLAIM_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) => config.claim_rate = parsed,
                Err(_) => tracing::warn!("Invalid CLAIM_RATE '{}', using default", rate),
            }
        }

        if let Ok(size) = std::env::var("CLAIM_BUFFER_SIZE") {
            match size.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.claim_buffer_size = parsed,
                Ok(_) => tracing::warn!("CLAIM_BUFFER_SIZE must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid CLAIM_BUFFER_SIZE '{}', using default", size),
            }
        }

        if let Ok(workers) = std::env::var("VALIDATOR_WORKERS") {
            match workers.parse::<usize>() {
                Ok(parsed) if (1..=64).contains(&parsed) => config.validator_workers = parsed,
                Ok(_) => tracing::warn!("VALIDATOR_WORKERS must be 1-64, using default"),
                Err(_) => tracing::warn!("Invalid VALIDATOR_WORKERS '{}', using default", workers),
            }
        }

        config
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset() {
        let config = CompensationConfig::default();
        assert_eq!(config.max_compensation, Duration::from_millis(500));
        assert_eq!(config.min_compensation, Duration::ZERO);
        assert!(config.snapshot_buffer_size > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_high_latency_preset() {
        let config = CompensationConfig::high_latency();
        assert_eq!(config.max_compensation, Duration::from_millis(5000));
        assert!(config.snapshot_buffer_size >= CompensationConfig::default().snapshot_buffer_size);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!("default".parse::<Preset>().unwrap(), Preset::Default);
        assert_eq!("High-Latency".parse::<Preset>().unwrap(), Preset::HighLatency);
        assert!(matches!(
            "lan".parse::<Preset>(),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_from_preset_matches_constructors() {
        assert_eq!(
            CompensationConfig::from_preset(Preset::HighLatency),
            CompensationConfig::high_latency()
        );
        assert_eq!(
            CompensationConfig::from_preset(Preset::Default),
            CompensationConfig::default()
        );
    }

    #[test]
    fn test_custom_valid() {
        let config = CompensationConfig::custom(
            Duration::from_millis(300),
            Duration::from_millis(20),
            16,
        )
        .unwrap();
        assert_eq!(config.max_compensation, Duration::from_millis(300));
        assert_eq!(config.min_compensation, Duration::from_millis(20));
        assert_eq!(config.snapshot_buffer_size, 16);
    }

    #[test]
    fn test_custom_min_above_max() {
        let result = CompensationConfig::custom(
            Duration::from_millis(100),
            Duration::from_millis(200),
            16,
        );
        assert!(matches!(result, Err(ConfigError::MinExceedsMax { .. })));
    }

    #[test]
    fn test_custom_zero_buffer() {
        let result = CompensationConfig::custom(Duration::from_millis(100), Duration::ZERO, 0);
        assert_eq!(result, Err(ConfigError::EmptyBuffer));
    }

    #[test]
    fn test_load_or_default() {
        let config = CompensationConfig::load_or_default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_cover_max_at_reference_tick_rate() {
        let tick = SessionConfig::default().tick_interval();
        assert_eq!(tick, Duration::from_millis(50));

        for preset in [Preset::Default, Preset::HighLatency] {
            let config = CompensationConfig::from_preset(preset);
            assert!(config.history_span(tick) >= config.max_compensation);
            assert!(config.snapshot_buffer_size >= config.required_buffer_size(tick));
            assert_eq!(config.fit_to_tick_interval(tick), config);
        }
    }

    #[test]
    fn test_history_span() {
        let config = CompensationConfig::default();
        assert_eq!(config.history_span(Duration::from_millis(50)), Duration::from_millis(1550));

        let single =
            CompensationConfig::custom(Duration::from_millis(100), Duration::ZERO, 1).unwrap();
        assert_eq!(single.history_span(Duration::from_millis(50)), Duration::ZERO);
    }

    #[test]
    fn test_fit_grows_buffer_at_high_tick_rate() {
        let session = SessionConfig {
            tick_rate: 120,
            ..SessionConfig::default()
        };
        let tick = session.tick_interval();

        let config = CompensationConfig::default();
        assert!(config.history_span(tick) < config.max_compensation);

        let fitted = config.fit_to_tick_interval(tick);
        assert!(fitted.snapshot_buffer_size > config.snapshot_buffer_size);
        assert!(fitted.history_span(tick) >= fitted.max_compensation);
        assert_eq!(fitted.max_compensation, config.max_compensation);
        assert_eq!(fitted.min_compensation, config.min_compensation);
    }

    #[test]
    fn test_fit_zero_interval_is_noop() {
        let config = CompensationConfig::default();
        assert_eq!(config.fit_to_tick_interval(Duration::ZERO), config);
    }

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.tick_rate, 20);
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert!(config.entity_count >= 2);
    }
}
