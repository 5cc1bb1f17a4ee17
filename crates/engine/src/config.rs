//! Engine tuning knobs. Defaults match the game's balance numbers; the
//! operational knobs can be overridden from the environment.

use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded wait for a user's ledger lock before the call fails `Busy`.
    pub user_lock_timeout: Duration,
    /// Maximum distance from a zone centroid at which it can be engaged.
    pub attack_range_m: f64,
    /// EP for claiming a neutral cell.
    pub capture_ep: u64,
    /// EP for a non-lethal attack hit.
    pub attack_hit_ep: u64,
    /// EP for taking a zone over by dropping its defense to zero.
    pub takeover_ep: u64,
    /// EP for defending an owned zone.
    pub defend_ep: u64,
    /// Defense score a zone starts with when claimed or taken over.
    pub initial_defense: u8,
    /// Defense added when the owner re-captures their own zone.
    pub reinforce_boost: u8,
    /// Defense at or above which a contested zone settles back to safe.
    pub safe_defense_threshold: u8,
    /// How long starter missions stay open.
    pub mission_expiry: chrono::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_lock_timeout: Duration::from_secs(5),
            attack_range_m: 50.0,
            capture_ep: 10,
            attack_hit_ep: 2,
            takeover_ep: 25,
            defend_ep: 5,
            initial_defense: 50,
            reinforce_boost: 5,
            safe_defense_threshold: 70,
            mission_expiry: chrono::Duration::days(7),
        }
    }
}

impl EngineConfig {
    /// Defaults with operational overrides from the environment:
    /// `TURF_USER_LOCK_TIMEOUT_MS` and `TURF_ATTACK_RANGE_M`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("TURF_USER_LOCK_TIMEOUT_MS") {
            match raw.parse::<u64>() {
                Ok(ms) => config.user_lock_timeout = Duration::from_millis(ms),
                Err(_) => warn!("Ignoring unparsable TURF_USER_LOCK_TIMEOUT_MS: {}", raw),
            }
        }

        if let Ok(raw) = std::env::var("TURF_ATTACK_RANGE_M") {
            match raw.parse::<f64>() {
                Ok(m) if m > 0.0 => config.attack_range_m = m,
                _ => warn!("Ignoring unparsable TURF_ATTACK_RANGE_M: {}", raw),
            }
        }

        config
    }
}
