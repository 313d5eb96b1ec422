//! Layer store configuration.

use serde::{Deserialize, Serialize};

use crate::StageSize;

/// How the store treats an update or removal aimed at a missing layer id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Leave the collection untouched and report nothing.
    #[default]
    Lenient,
    /// Fail with [`StoreError::LayerNotFound`](crate::StoreError::LayerNotFound).
    Strict,
}

impl std::str::FromStr for UpdatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown update policy: {other}")),
        }
    }
}

/// Initial settings for a [`LayerStore`](crate::LayerStore).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Initial stage dimensions.
    pub stage: StageSize,
    /// Missing-layer handling.
    pub update_policy: UpdatePolicy,
}

impl StoreConfig {
    /// Create a store configuration from environment variables or defaults.
    ///
    /// Environment variables:
    /// - `MEME_STAGE_WIDTH`: Stage width in pixels (default: 800)
    /// - `MEME_STAGE_HEIGHT`: Stage height in pixels (default: 600)
    /// - `MEME_UPDATE_POLICY`: `lenient` or `strict` (default: lenient)
    ///
    /// Unparsable values fall back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = StageSize::default();
        let width = lookup("MEME_STAGE_WIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.width());
        let height = lookup("MEME_STAGE_HEIGHT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.height());
        let stage = StageSize::new(width, height).unwrap_or_else(|| {
            tracing::warn!("Ignoring zero stage size {width}x{height}, using {defaults}");
            defaults
        });
        let update_policy = lookup("MEME_UPDATE_POLICY")
            .and_then(|v| v.parse().ok())
            .unwrap_or_default();
        Self {
            stage,
            update_policy,
        }
    }

    /// Set the update policy.
    #[must_use]
    pub fn with_update_policy(mut self, update_policy: UpdatePolicy) -> Self {
        self.update_policy = update_policy;
        self
    }

    /// Set the initial stage size.
    #[must_use]
    pub fn with_stage(mut self, stage: StageSize) -> Self {
        self.stage = stage;
        self
    }
}
