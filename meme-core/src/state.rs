//! Canvas-wide state pieces held next to the layer collection.

use std::num::NonZeroU32;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Layer, LayerId};

/// Default stage width in pixels.
pub const DEFAULT_STAGE_WIDTH: u32 = 800;

/// Default stage height in pixels.
pub const DEFAULT_STAGE_HEIGHT: u32 = 600;

/// Stage (canvas) dimensions in pixels. Both sides are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageSize {
    width: NonZeroU32,
    height: NonZeroU32,
}

impl StageSize {
    /// Create a stage size, or `None` if either side is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(self) -> u32 {
        self.width.get()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(self) -> u32 {
        self.height.get()
    }
}

impl Default for StageSize {
    fn default() -> Self {
        Self {
            width: NonZeroU32::new(DEFAULT_STAGE_WIDTH).unwrap_or(NonZeroU32::MIN),
            height: NonZeroU32::new(DEFAULT_STAGE_HEIGHT).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl std::fmt::Display for StageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// What pointer input on the stage does.
///
/// One enum instead of one flag per mode, so two modes can never be active
/// at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    /// Default mode - select and drag layers.
    #[default]
    Select,
    /// Freehand drawing.
    Draw,
}

impl InteractionMode {
    /// Whether this is drawing mode.
    #[must_use]
    pub fn is_drawing(self) -> bool {
        self == Self::Draw
    }
}

/// Everything a renderer needs to paint one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasSnapshot {
    /// Layers in back-to-front paint order.
    pub layers: Arc<Vec<Arc<Layer>>>,
    /// Selected layer, if any.
    pub selected: Option<LayerId>,
    /// Stage dimensions.
    pub stage: StageSize,
    /// Current interaction mode.
    pub mode: InteractionMode,
}
