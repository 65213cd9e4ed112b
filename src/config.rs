//! Runtime configuration: the `{timeSliceMs, schedulingStrategy,
//! errorManagerMaxSize, debug}` fields from spec.md §6, plus the nested
//! per-facet config map SPEC_FULL.md §1.1 adds, following this crate's
//! message routing layer's `RouterConfig` builder/presets pattern.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::{ErrorHistorySize, TimeSliceMs};
use crate::error::ConfigError;
use crate::scheduler::{ADAPTIVE_LOAD_THRESHOLD, ADAPTIVE_LOAD_TICKS, SchedulingStrategy};

/// Serde-friendly mirror of [`SchedulingStrategy`], so config files spell
/// the strategy as a lowercase string rather than requiring the enum's
/// derive to live on `scheduler.rs` itself (that module has no serde
/// dependency today, and gains none from this).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingStrategyName {
    /// See [`SchedulingStrategy::RoundRobin`].
    RoundRobin,
    /// See [`SchedulingStrategy::Priority`].
    Priority,
    /// See [`SchedulingStrategy::LoadBased`].
    LoadBased,
    /// See [`SchedulingStrategy::Adaptive`].
    Adaptive,
}

impl SchedulingStrategyName {
    /// Converts to the scheduler's own strategy enum.
    #[must_use]
    pub fn to_strategy(self) -> SchedulingStrategy {
        match self {
            Self::RoundRobin => SchedulingStrategy::RoundRobin,
            Self::Priority => SchedulingStrategy::Priority,
            Self::LoadBased => SchedulingStrategy::LoadBased,
            Self::Adaptive => SchedulingStrategy::Adaptive,
        }
    }

    /// Parses a strategy name from a free-form string (as might arrive via
    /// CLI flag or environment variable), rejecting anything unrecognised.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSchedulingStrategy`] if `s` isn't one
    /// of `round-robin`, `priority`, `load-based`, `adaptive`.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "round-robin" => Ok(Self::RoundRobin),
            "priority" => Ok(Self::Priority),
            "load-based" => Ok(Self::LoadBased),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(ConfigError::UnknownSchedulingStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Runtime configuration, serializable and buildable via
/// [`RuntimeConfigBuilder`] (spec.md §6, SPEC_FULL.md §1.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    time_slice_ms: TimeSliceMs,
    tick_interval_ms: u64,
    scheduling_strategy: SchedulingStrategyName,
    error_manager_max_size: ErrorHistorySize,
    debug: bool,
    adaptive_load_threshold: f64,
    adaptive_load_ticks: u32,
    facet_config: HashMap<String, Value>,
}

impl RuntimeConfig {
    /// Starts a builder seeded with this crate's own defaults (50ms time
    /// slice, round-robin, 1000 retained errors, debug off).
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// A preset tuned for local development: debug logging on, a shorter
    /// time slice so manual testing feels responsive, and a small error
    /// history (mirroring this crate's `RouterConfig::development()`).
    #[must_use]
    pub fn development() -> Self {
        Self::builder()
            .debug(true)
            .time_slice_ms(10)
            .error_manager_max_size(100)
            .build()
            .expect("development preset values are always in range")
    }

    /// A preset tuned for production: debug off, the full default time
    /// slice and error history.
    #[must_use]
    pub fn production() -> Self {
        Self::builder()
            .build()
            .expect("production preset values are always in range")
    }

    /// The scheduler's time slice per tick.
    #[must_use]
    pub fn time_slice_ms(&self) -> TimeSliceMs {
        self.time_slice_ms
    }

    /// The interval the scheduler sleeps between ticks.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The active scheduling strategy.
    #[must_use]
    pub fn scheduling_strategy(&self) -> SchedulingStrategy {
        self.scheduling_strategy.to_strategy()
    }

    /// The error manager's bounded history capacity.
    #[must_use]
    pub fn error_manager_max_size(&self) -> ErrorHistorySize {
        self.error_manager_max_size
    }

    /// Whether debug-level logging and diagnostics are enabled.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// The adaptive strategy's utilisation threshold.
    #[must_use]
    pub fn adaptive_load_threshold(&self) -> f64 {
        self.adaptive_load_threshold
    }

    /// The adaptive strategy's consecutive-tick requirement.
    #[must_use]
    pub fn adaptive_load_ticks(&self) -> u32 {
        self.adaptive_load_ticks
    }

    /// This facet kind's slice of the config, or `Value::Null` if none was
    /// configured (passed verbatim as [`crate::facet::HookContext::config`]).
    #[must_use]
    pub fn facet_config(&self, kind: &str) -> Value {
        self.facet_config.get(kind).cloned().unwrap_or(Value::Null)
    }

    /// The full per-facet config map as one JSON object, the shape
    /// [`crate::coordinator::Coordinator::register_subsystem`] hands every
    /// hook builder as its shared [`crate::facet::HookContext::config`].
    #[must_use]
    pub fn facet_config_map(&self) -> Value {
        Value::Object(self.facet_config.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Builds a [`RuntimeConfig`], validating every field against its domain
/// type before finalizing.
#[derive(Debug, Clone)]
pub struct RuntimeConfigBuilder {
    time_slice_ms: u64,
    tick_interval_ms: u64,
    scheduling_strategy: SchedulingStrategyName,
    error_manager_max_size: usize,
    debug: bool,
    adaptive_load_threshold: f64,
    adaptive_load_ticks: u32,
    facet_config: HashMap<String, Value>,
}

impl Default for RuntimeConfigBuilder {
    fn default() -> Self {
        Self {
            time_slice_ms: TimeSliceMs::default().into_inner(),
            tick_interval_ms: 50,
            scheduling_strategy: SchedulingStrategyName::RoundRobin,
            error_manager_max_size: ErrorHistorySize::default().into_inner(),
            debug: false,
            adaptive_load_threshold: ADAPTIVE_LOAD_THRESHOLD,
            adaptive_load_ticks: ADAPTIVE_LOAD_TICKS,
            facet_config: HashMap::new(),
        }
    }
}

impl RuntimeConfigBuilder {
    /// Overrides the scheduler's time slice, in milliseconds.
    #[must_use]
    pub fn time_slice_ms(mut self, ms: u64) -> Self {
        self.time_slice_ms = ms;
        self
    }

    /// Overrides the interval the scheduler sleeps between ticks, in
    /// milliseconds.
    #[must_use]
    pub fn tick_interval_ms(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    /// Overrides the active scheduling strategy.
    #[must_use]
    pub fn scheduling_strategy(mut self, strategy: SchedulingStrategyName) -> Self {
        self.scheduling_strategy = strategy;
        self
    }

    /// Overrides the error manager's retained history size.
    #[must_use]
    pub fn error_manager_max_size(mut self, size: usize) -> Self {
        self.error_manager_max_size = size;
        self
    }

    /// Overrides whether debug diagnostics are enabled.
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Overrides the adaptive strategy's utilisation threshold.
    #[must_use]
    pub fn adaptive_load_threshold(mut self, threshold: f64) -> Self {
        self.adaptive_load_threshold = threshold;
        self
    }

    /// Overrides the adaptive strategy's consecutive-tick requirement.
    #[must_use]
    pub fn adaptive_load_ticks(mut self, ticks: u32) -> Self {
        self.adaptive_load_ticks = ticks;
        self
    }

    /// Sets `kind`'s slice of the per-facet config map.
    #[must_use]
    pub fn facet_config(mut self, kind: impl Into<String>, config: Value) -> Self {
        self.facet_config.insert(kind.into(), config);
        self
    }

    /// Validates every field and produces a [`RuntimeConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if `time_slice_ms` or
    /// `error_manager_max_size` falls outside its domain type's valid
    /// range.
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        let time_slice_ms = TimeSliceMs::try_new(self.time_slice_ms).map_err(|e| ConfigError::ValidationError {
            field: "time_slice_ms",
            reason: e.to_string(),
        })?;
        let error_manager_max_size =
            ErrorHistorySize::try_new(self.error_manager_max_size).map_err(|e| ConfigError::ValidationError {
                field: "error_manager_max_size",
                reason: e.to_string(),
            })?;

        Ok(RuntimeConfig {
            time_slice_ms,
            tick_interval_ms: self.tick_interval_ms,
            scheduling_strategy: self.scheduling_strategy,
            error_manager_max_size,
            debug: self.debug,
            adaptive_load_threshold: self.adaptive_load_threshold,
            adaptive_load_ticks: self.adaptive_load_ticks,
            facet_config: self.facet_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_preset_enables_debug() {
        let config = RuntimeConfig::development();
        assert!(config.debug());
        assert_eq!(config.time_slice_ms(), TimeSliceMs::try_new(10).unwrap());
    }

    #[test]
    fn production_preset_matches_domain_defaults() {
        let config = RuntimeConfig::production();
        assert!(!config.debug());
        assert_eq!(config.time_slice_ms(), TimeSliceMs::default());
    }

    #[test]
    fn out_of_range_time_slice_is_rejected() {
        let err = RuntimeConfig::builder().time_slice_ms(0).build().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { field: "time_slice_ms", .. }));
    }

    #[test]
    fn unknown_scheduling_strategy_name_is_rejected() {
        let err = SchedulingStrategyName::parse("block").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSchedulingStrategy { .. }));
    }

    #[test]
    fn facet_config_defaults_to_null_when_unset() {
        let config = RuntimeConfig::production();
        assert_eq!(config.facet_config("storage"), Value::Null);
    }

    #[test]
    fn facet_config_round_trips_through_builder() {
        let config = RuntimeConfig::builder()
            .facet_config("storage", serde_json::json!({"path": "/tmp"}))
            .build()
            .unwrap();
        assert_eq!(config.facet_config("storage"), serde_json::json!({"path": "/tmp"}));
    }

    #[test]
    fn facet_config_map_collects_every_entry() {
        let config = RuntimeConfig::builder()
            .facet_config("storage", serde_json::json!({"path": "/tmp"}))
            .facet_config("network", serde_json::json!({"port": 8080}))
            .build()
            .unwrap();
        assert_eq!(
            config.facet_config_map(),
            serde_json::json!({"storage": {"path": "/tmp"}, "network": {"port": 8080}})
        );
    }
}
