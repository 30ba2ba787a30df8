use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::types::TabletType;

/// Top-level router configuration (`shardgate.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub scatter: ScatterConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
}

/// Fan-out limits for multi-shard execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatterConfig {
    /// Upper bound on one fan-out, in milliseconds (0 = no timeout).
    pub timeout_ms: u64,
    /// Max shards executing concurrently for one request (0 = unbounded).
    pub max_parallelism: usize,
}

impl Default for ScatterConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_parallelism: 0,
        }
    }
}

impl ScatterConfig {
    /// Fan-out timeout, or `None` when unbounded.
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Append `/* vtgate:: keyspace_id:... */` to single-shard DML.
    pub annotate_keyspace_ids: bool,
    /// Tablet type used when the request does not name one.
    pub default_tablet_type: TabletType,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            annotate_keyspace_ids: true,
            default_tablet_type: TabletType::Primary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Bind variable carrying the number of values requested from a sequence.
    pub count_bind_var: String,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            count_bind_var: "n".to_string(),
        }
    }
}

impl RouterConfig {
    /// Parse from TOML text. Missing sections take their defaults.
    pub fn from_toml_str(s: &str) -> GateResult<Self> {
        let config: RouterConfig =
            toml::from_str(s).map_err(|e| GateError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file on disk.
    pub fn load(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GateError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded router configuration");
        Ok(config)
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.sequence.count_bind_var.is_empty() {
            return Err(GateError::Config(
                "sequence.count_bind_var must not be empty".into(),
            ));
        }
        if self.sequence.count_bind_var.starts_with(':') {
            return Err(GateError::Config(format!(
                "sequence.count_bind_var {:?} must be a bare name",
                self.sequence.count_bind_var
            )));
        }
        Ok(())
    }
}
