//! Canvas layers - the positioned, typed building blocks of a meme.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open attribute bag carried by every layer.
pub type Attrs = serde_json::Map<String, Value>;

/// Top-level keys owned by [`Layer`] itself. They never land in `extra`.
const RESERVED_KEYS: [&str; 5] = ["id", "type", "x", "y", "attrs"];

/// Unique identifier for a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(u64);

impl LayerId {
    /// Create a layer ID from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for LayerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a layer draws.
///
/// Serialized as a lowercase string. Unknown strings round-trip through
/// [`LayerKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LayerKind {
    /// Caption text.
    Text,
    /// A bitmap, typically an uploaded photo or a background-removed cut-out.
    Image,
    /// A vector shape (rectangle, ellipse, arrow).
    Shape,
    /// A freehand stroke recorded in drawing mode.
    Drawing,
    /// Any other kind a caller introduces.
    Custom(String),
}

impl LayerKind {
    /// The wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Shape => "shape",
            Self::Drawing => "drawing",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for LayerKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "shape" => Self::Shape,
            "drawing" => Self::Drawing,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for LayerKind {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<LayerKind> for String {
    fn from(kind: LayerKind) -> Self {
        match kind {
            LayerKind::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single layer on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique identifier.
    pub id: LayerId,
    /// Layer content type.
    #[serde(rename = "type")]
    pub kind: LayerKind,
    /// X position (pixels from the stage's left edge).
    pub x: f64,
    /// Y position (pixels from the stage's top edge).
    pub y: f64,
    /// Kind-specific attributes (text, color, image source, size...).
    #[serde(default)]
    pub attrs: Attrs,
    /// Additional top-level fields merged in by callers.
    #[serde(flatten)]
    pub extra: Attrs,
}

impl Layer {
    /// Create a layer at the origin with no attributes.
    #[must_use]
    pub fn new(id: impl Into<LayerId>, kind: impl Into<LayerKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            x: 0.0,
            y: 0.0,
            attrs: Attrs::new(),
            extra: Attrs::new(),
        }
    }

    /// Create a text layer.
    #[must_use]
    pub fn text(id: impl Into<LayerId>, content: impl Into<String>) -> Self {
        Self::new(id, LayerKind::Text).with_attr("text", content.into())
    }

    /// Create an image layer showing `src`.
    #[must_use]
    pub fn image(id: impl Into<LayerId>, src: impl Into<String>) -> Self {
        Self::new(id, LayerKind::Image).with_attr("src", src.into())
    }

    /// Set the position.
    #[must_use]
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Set one attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Shallow-merge `patch` into a copy of this layer.
    ///
    /// Fields present in the patch overwrite the layer's; absent fields are
    /// kept. `attrs` is replaced as a whole, never merged key by key.
    #[must_use]
    pub fn merged(&self, patch: &LayerPatch) -> Self {
        let mut layer = self.clone();
        layer.apply(patch);
        layer
    }

    /// Shallow-merge `patch` into this layer in place.
    pub fn apply(&mut self, patch: &LayerPatch) {
        if let Some(kind) = &patch.kind {
            self.kind = kind.clone();
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(attrs) = &patch.attrs {
            self.attrs = attrs.clone();
        }
        for (key, value) in &patch.extra {
            if RESERVED_KEYS.contains(&key.as_str()) {
                tracing::debug!("Ignoring reserved key {key:?} in layer patch");
                continue;
            }
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// A partial layer update.
///
/// The layer `id` is deliberately not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerPatch {
    /// New layer type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<LayerKind>,
    /// New X position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    /// New Y position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    /// Replacement attribute bag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attrs>,
    /// Other top-level fields.
    #[serde(flatten)]
    pub extra: Attrs,
}

impl LayerPatch {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the layer type.
    #[must_use]
    pub fn kind(mut self, kind: impl Into<LayerKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the X position.
    #[must_use]
    pub fn x(mut self, x: f64) -> Self {
        self.x = Some(x);
        self
    }

    /// Set the Y position.
    #[must_use]
    pub fn y(mut self, y: f64) -> Self {
        self.y = Some(y);
        self
    }

    /// Replace the attribute bag.
    #[must_use]
    pub fn attrs(mut self, attrs: Attrs) -> Self {
        self.attrs = Some(attrs);
        self
    }

    /// Set an arbitrary top-level field.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Whether this patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kind.is_none()
            && self.x.is_none()
            && self.y.is_none()
            && self.attrs.is_none()
            && self.extra.is_empty()
    }

    /// Combine two patches. Fields set in `later` win.
    #[must_use]
    pub fn merge(mut self, later: Self) -> Self {
        if later.kind.is_some() {
            self.kind = later.kind;
        }
        if later.x.is_some() {
            self.x = later.x;
        }
        if later.y.is_some() {
            self.y = later.y;
        }
        if later.attrs.is_some() {
            self.attrs = later.attrs;
        }
        self.extra.extend(later.extra);
        self
    }
}
