use serde::Deserialize;

use crate::error::AppError;

/// Runtime tuning knobs for the automation pipeline. Defaults match the
/// shipped behavior; a `screenpilot.toml` file or `SCREENPILOT_*` env vars
/// override individual fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Target capture interval. 100ms gives the 10 Hz pipeline rate.
    pub frame_interval_ms: u64,
    /// Sleep applied when the capture source returns no frame.
    pub capture_backoff_ms: u64,
    pub inference_workers: usize,
    pub inference_queue_depth: usize,
    pub execution_queue_depth: usize,
    /// How long `stop()` waits for in-flight work before abandoning it.
    pub shutdown_grace_ms: u64,
    /// Execution under this bound earns the latency reward bonus.
    pub fast_execution_ms: u64,
    pub recovery_max_attempts: u32,
    pub recovery_cooldown_secs: u64,
    /// Total memory budget the model catalog accounts against.
    pub model_memory_budget_mb: f64,
    /// A model load is skipped when less than this margin remains.
    pub model_min_free_mb: f64,
    /// Reclaim hint threshold as a fraction of the budget.
    pub model_pressure_ratio: f64,
    pub prefs_path: String,
    pub session_dir: String,
    pub policy_path: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_interval_ms: 100,
            capture_backoff_ms: 50,
            inference_workers: 2,
            inference_queue_depth: 4,
            execution_queue_depth: 8,
            shutdown_grace_ms: 2_000,
            fast_execution_ms: 100,
            recovery_max_attempts: 3,
            recovery_cooldown_secs: 30,
            model_memory_budget_mb: 512.0,
            model_min_free_mb: 50.0,
            model_pressure_ratio: 0.8,
            prefs_path: "screenpilot_prefs.json".to_string(),
            session_dir: "sessions".to_string(),
            policy_path: "policy_weights.json".to_string(),
        }
    }
}

impl Configuration {
    /// Layered load: defaults, then an optional `screenpilot.toml`, then
    /// `SCREENPILOT_*` environment variables.
    pub fn load() -> Result<Self, AppError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("screenpilot").required(false))
            .add_source(config::Environment::with_prefix("SCREENPILOT"))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_give_ten_hertz_pacing() {
        let configuration = Configuration::default();
        assert_eq!(configuration.frame_interval_ms, 100);
        assert_eq!(configuration.inference_workers, 2);
    }

    #[test]
    fn recovery_budget_defaults() {
        let configuration = Configuration::default();
        assert_eq!(configuration.recovery_max_attempts, 3);
        assert_eq!(configuration.recovery_cooldown_secs, 30);
    }
}
