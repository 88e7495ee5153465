//! `converge.yaml` から読み込むエンジン設定
//!
//! ```yaml
//! limiter:
//!   capacity: 5
//!   acquire_timeout_secs: 120
//! convergence:
//!   timeout_secs: 900
//!   poll_interval_secs: 10
//! resources:
//!   load_balancer:
//!     timeout_secs: 1800
//!     initial_delay_secs: 30
//! ```

use crate::error::{ConfigError, Result};
use converge_engine::{ConvergencePolicy, LimiterSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hash;
use std::path::Path;
use std::time::Duration;

/// エンジンの調整可能な設定一式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub limiter: LimiterConfig,

    /// 全リソースタイプ共通の待機設定
    pub convergence: ConvergenceTimings,

    /// リソースタイプごとの上書き (キーはリソース種別)
    pub resources: BTreeMap<String, TimingOverride>,
}

/// レート制限のある呼び出し用の同時実行リミッター
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// 同時実行数の上限
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// 再試行までの待機の下限 (ミリ秒)
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,
    /// 再試行までの待機の上限 (ミリ秒)
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
    /// 枠の取得を諦めるまでの時間 (秒)
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_capacity() -> usize {
    10
}
fn default_jitter_min() -> u64 {
    200
}
fn default_jitter_max() -> u64 {
    400
}
fn default_acquire_timeout() -> u64 {
    300 // 5分
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl LimiterConfig {
    pub fn to_limiter_settings(&self) -> LimiterSettings {
        LimiterSettings {
            capacity: self.capacity,
            jitter_min: Duration::from_millis(self.jitter_min_ms),
            jitter_max: Duration::from_millis(self.jitter_max_ms),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }
}

/// 収束待ちのタイミング (Exponential Backoff)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTimings {
    /// 待機全体の上限 (秒)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// ポーリング間隔 (秒)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// 最初のポーリングまでの待機 (秒)
    #[serde(default)]
    pub initial_delay_secs: u64,
    /// ポーリング間隔の増加率 (有限かつ 1.0 以上)
    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,
    /// 増加後のポーリング間隔の上限 (秒)
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,
}

fn default_timeout() -> u64 {
    600 // 10分
}
fn default_poll_interval() -> u64 {
    5
}
fn default_multiplier() -> f64 {
    1.0
}
fn default_max_poll_interval() -> u64 {
    60
}

impl Default for ConvergenceTimings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            poll_interval_secs: default_poll_interval(),
            initial_delay_secs: 0,
            backoff_multiplier: default_multiplier(),
            max_poll_interval_secs: default_max_poll_interval(),
        }
    }
}

impl ConvergenceTimings {
    /// `policy` のタイミングを置き換える (ステータス集合はそのまま)
    pub fn apply_to<S: Eq + Hash>(&self, policy: ConvergencePolicy<S>) -> ConvergencePolicy<S> {
        policy
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_poll_interval(Duration::from_secs(self.poll_interval_secs))
            .with_initial_delay(Duration::from_secs(self.initial_delay_secs))
            .with_backoff(
                self.backoff_multiplier,
                Duration::from_secs(self.max_poll_interval_secs),
            )
    }

    /// `other` で指定されたフィールドを上書き
    pub fn merge(&mut self, other: &TimingOverride) {
        if let Some(timeout) = other.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(interval) = other.poll_interval_secs {
            self.poll_interval_secs = interval;
        }
        if let Some(delay) = other.initial_delay_secs {
            self.initial_delay_secs = delay;
        }
        if let Some(multiplier) = other.backoff_multiplier {
            self.backoff_multiplier = multiplier;
        }
        if let Some(max) = other.max_poll_interval_secs {
            self.max_poll_interval_secs = max;
        }
    }

    fn validate(&self, prefix: &str) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.timeout_secs"),
                "must be greater than 0",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.poll_interval_secs"),
                "must be greater than 0",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                format!("{prefix}.backoff_multiplier"),
                "must be a finite number of at least 1.0",
            ));
        }
        Ok(())
    }
}

/// リソースタイプごとのタイミング上書き (未指定はデフォルトのまま)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingOverride {
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub initial_delay_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_poll_interval_secs: Option<u64>,
}

impl EngineSettings {
    /// YAML テキストから設定をパース
    pub fn from_yaml(content: &str, source: &str) -> Result<Self> {
        let settings: EngineSettings =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                path: source.to_string(),
                source: e,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    /// 設定ファイルを読み込んでパース
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            path: "<settings>".to_string(),
            source: e,
        })
    }

    /// `kind` の有効なタイミング (デフォルトに上書きを適用)
    pub fn timings_for(&self, kind: &str) -> ConvergenceTimings {
        let mut timings = self.convergence.clone();
        if let Some(over) = self.resources.get(kind) {
            timings.merge(over);
        }
        timings
    }

    /// `kind` の有効なタイミングを適用した `policy`
    pub fn policy_for<S: Eq + Hash>(
        &self,
        kind: &str,
        policy: ConvergencePolicy<S>,
    ) -> ConvergencePolicy<S> {
        self.timings_for(kind).apply_to(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limiter.capacity == 0 {
            return Err(ConfigError::invalid(
                "limiter.capacity",
                "must be greater than 0",
            ));
        }
        if self.limiter.jitter_min_ms > self.limiter.jitter_max_ms {
            return Err(ConfigError::invalid(
                "limiter.jitter_min_ms",
                "must not exceed limiter.jitter_max_ms",
            ));
        }
        self.convergence.validate("convergence")?;
        for kind in self.resources.keys() {
            self.timings_for(kind)
                .validate(&format!("resources.{kind}"))?;
        }
        Ok(())
    }

    /// `CONVERGE_*` 環境変数による上書きを適用
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_value("CONVERGE_LIMITER_CAPACITY")? {
            self.limiter.capacity = v;
        }
        if let Some(v) = env_value("CONVERGE_ACQUIRE_TIMEOUT_SECS")? {
            self.limiter.acquire_timeout_secs = v;
        }
        if let Some(v) = env_value("CONVERGE_WAIT_TIMEOUT_SECS")? {
            self.convergence.timeout_secs = v;
        }
        if let Some(v) = env_value("CONVERGE_POLL_INTERVAL_SECS")? {
            self.convergence.poll_interval_secs = v;
        }
        self.validate()
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = EngineSettings::from_yaml("{}", "test").unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert_eq!(settings.limiter.capacity, 10);
        assert_eq!(settings.limiter.acquire_timeout_secs, 300);
        assert_eq!(settings.convergence.timeout_secs, 600);
    }

    #[test]
    fn test_partial_sections_keep_field_defaults() {
        let yaml = "limiter:\n  capacity: 3\nconvergence:\n  poll_interval_secs: 2\n";
        let settings = EngineSettings::from_yaml(yaml, "test").unwrap();

        assert_eq!(settings.limiter.capacity, 3);
        assert_eq!(settings.limiter.jitter_min_ms, 200);
        assert_eq!(settings.convergence.poll_interval_secs, 2);
        assert_eq!(settings.convergence.timeout_secs, 600);
    }

    #[test]
    fn test_resource_override_merges_over_defaults() {
        let yaml = "\
convergence:
  timeout_secs: 900
resources:
  load_balancer:
    initial_delay_secs: 30
";
        let settings = EngineSettings::from_yaml(yaml, "test").unwrap();

        let lb = settings.timings_for("load_balancer");
        assert_eq!(lb.timeout_secs, 900);
        assert_eq!(lb.initial_delay_secs, 30);
        assert_eq!(settings.timings_for("member").initial_delay_secs, 0);
    }

    #[test]
    fn test_policy_for_keeps_status_sets() {
        let settings = EngineSettings::from_yaml(
            "resources:\n  load_balancer:\n    timeout_secs: 42\n",
            "test",
        )
        .unwrap();
        let policy = settings.policy_for(
            "load_balancer",
            ConvergencePolicy::new(["creating".to_string()], ["active".to_string()]),
        );

        assert_eq!(policy.timeout, Duration::from_secs(42));
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert!(policy.target.contains("active"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = EngineSettings::from_yaml("limiter:\n  capacity: 0\n", "test").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "limiter.capacity"));

        let err = EngineSettings::from_yaml(
            "resources:\n  pool:\n    backoff_multiplier: 0.5\n",
            "test",
        )
        .unwrap_err();
        assert!(
            matches!(err, ConfigError::Invalid { ref field, .. } if field == "resources.pool.backoff_multiplier")
        );
    }

    #[test]
    fn test_non_finite_backoff_is_rejected() {
        for value in [".nan", ".inf", "-.inf"] {
            let yaml = format!("convergence:\n  backoff_multiplier: {value}\n");
            let err = EngineSettings::from_yaml(&yaml, "test").unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { ref field, .. } if field == "convergence.backoff_multiplier"),
                "{value}: {err}"
            );
        }

        let yaml = "resources:\n  load_balancer:\n    backoff_multiplier: .inf\n";
        assert!(EngineSettings::from_yaml(yaml, "test").is_err());

        let settings =
            EngineSettings::from_yaml("convergence:\n  backoff_multiplier: 2.5\n", "test").unwrap();
        assert_eq!(settings.convergence.backoff_multiplier, 2.5);
    }

    #[test]
    fn test_malformed_yaml_names_source() {
        let err = EngineSettings::from_yaml("limiter: [", "converge.yaml").unwrap_err();
        assert!(err.to_string().contains("converge.yaml"));
    }

    #[test]
    fn test_limiter_settings_conversion() {
        let limiter = LimiterConfig::default().to_limiter_settings();
        assert_eq!(limiter, LimiterSettings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        unsafe {
            std::env::set_var("CONVERGE_LIMITER_CAPACITY", "4");
            std::env::set_var("CONVERGE_WAIT_TIMEOUT_SECS", "120");
        }

        let mut settings = EngineSettings::default();
        let result = settings.apply_env_overrides();

        unsafe {
            std::env::remove_var("CONVERGE_LIMITER_CAPACITY");
            std::env::remove_var("CONVERGE_WAIT_TIMEOUT_SECS");
        }

        result.unwrap();
        assert_eq!(settings.limiter.capacity, 4);
        assert_eq!(settings.convergence.timeout_secs, 120);
    }

    #[test]
    #[serial]
    fn test_env_override_rejects_garbage() {
        unsafe {
            std::env::set_var("CONVERGE_POLL_INTERVAL_SECS", "soon");
        }

        let result = EngineSettings::default().apply_env_overrides();

        unsafe {
            std::env::remove_var("CONVERGE_POLL_INTERVAL_SECS");
        }

        match result {
            Err(ConfigError::InvalidEnv { name, value }) => {
                assert_eq!(name, "CONVERGE_POLL_INTERVAL_SECS");
                assert_eq!(value, "soon");
            }
            other => panic!("Expected InvalidEnv error, got {other:?}"),
        }
    }
}
