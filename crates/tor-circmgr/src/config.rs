//! Configuration for circuit timing and preemptive pool sizing.
//!
//! Grounded on the shape (field names, defaults) of the teacher's
//! `tor-circmgr/src/config.rs` `CircuitTiming`/`PreemptiveCircuitConfig`,
//! stripped of its `derive_builder` machinery: per SPEC_FULL.md §10.3 these
//! are plain structs deriving `Clone`, `Debug`, and `serde`, validated by a
//! constructor rather than a generated builder.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tor_error::{ErrorKind, HasKind};

/// A configuration value failed validation.
///
/// Per SPEC_FULL.md §7/§10.3: configuration errors surface at construction,
/// so the core never starts in an invalid state.
#[derive(Error, Debug, Clone)]
#[error("invalid circuit pool configuration: {0}")]
pub struct ConfigBuildError(String);

impl HasKind for ConfigBuildError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

/// How long to keep using a circuit, and how long to wait while building
/// one.
///
/// Corresponds to the `circuit_build_timeout`, `max_circuit_dirtiness`, and
/// `new_circuit_period` options of SPEC_FULL.md §6.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitTiming {
    /// How long a circuit build (the whole path, not just one extension)
    /// may run before [`crate::mgr::CircMgr`] gives up on it.
    #[serde(with = "duration_secs")]
    pub circuit_build_timeout: Duration,

    /// How long after a circuit was first used before it is too dirty to
    /// hand out for a new, differently-isolated request.
    #[serde(with = "duration_secs")]
    pub max_circuit_dirtiness: Duration,

    /// The minimum interval between successive preemptive circuit builds.
    #[serde(with = "duration_secs")]
    pub new_circuit_period: Duration,
}

impl Default for CircuitTiming {
    fn default() -> Self {
        CircuitTiming {
            circuit_build_timeout: Duration::from_secs(60),
            max_circuit_dirtiness: Duration::from_secs(10 * 60),
            new_circuit_period: Duration::from_secs(30),
        }
    }
}

impl CircuitTiming {
    /// Check this configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigBuildError> {
        if self.circuit_build_timeout.is_zero() {
            return Err(ConfigBuildError(
                "circuit_build_timeout must be nonzero".into(),
            ));
        }
        Ok(())
    }
}

/// How large to keep the pool of pre-built, unleased circuits.
///
/// Corresponds to the `enable_circuit_prebuilding`, `circuit_pool_min_size`,
/// and `circuit_pool_max_size` options of SPEC_FULL.md §6.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreemptiveCircuitConfig {
    /// Whether the pool's maintenance task tops up the idle pool at all.
    pub enable_circuit_prebuilding: bool,

    /// The idle pool is kept at least this large while prebuilding is
    /// enabled.
    pub circuit_pool_min_size: usize,

    /// `GetWithIsolation` refuses to build a new circuit once the pool
    /// (idle plus leased) already holds this many.
    pub circuit_pool_max_size: usize,
}

impl Default for PreemptiveCircuitConfig {
    fn default() -> Self {
        PreemptiveCircuitConfig {
            enable_circuit_prebuilding: true,
            circuit_pool_min_size: 2,
            circuit_pool_max_size: 12,
        }
    }
}

impl PreemptiveCircuitConfig {
    /// Check this configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigBuildError> {
        if self.circuit_pool_min_size > self.circuit_pool_max_size {
            return Err(ConfigBuildError(format!(
                "circuit_pool_min_size ({}) exceeds circuit_pool_max_size ({})",
                self.circuit_pool_min_size, self.circuit_pool_max_size
            )));
        }
        Ok(())
    }
}

/// Serialize/deserialize a [`Duration`] as a whole number of seconds,
/// rather than pulling in `humantime_serde` for this one crate's two
/// fields that need it.
mod duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(ser)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(de)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_validates() {
        assert!(CircuitTiming::default().validate().is_ok());
    }

    #[test]
    fn zero_build_timeout_is_rejected() {
        let timing = CircuitTiming {
            circuit_build_timeout: Duration::ZERO,
            ..CircuitTiming::default()
        };
        assert!(timing.validate().is_err());
    }

    #[test]
    fn default_pool_sizing_validates() {
        assert!(PreemptiveCircuitConfig::default().validate().is_ok());
    }

    #[test]
    fn min_size_over_max_size_is_rejected() {
        let config = PreemptiveCircuitConfig {
            circuit_pool_min_size: 20,
            circuit_pool_max_size: 5,
            ..PreemptiveCircuitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn timing_round_trips_through_json() {
        let timing = CircuitTiming::default();
        let json = serde_json::to_string(&timing).unwrap();
        let back: CircuitTiming = serde_json::from_str(&json).unwrap();
        assert_eq!(timing, back);
    }
}
