//! Shared layer storage for the meme canvas.
//!
//! Provides a cloneable [`LayerStore`] that is the single source of truth for
//! canvas composition: the ordered layer collection, the selection, the stage
//! size and the interaction mode. Each piece is an [`Observable`], so the
//! renderer and any other reader can subscribe and receive a full snapshot
//! after every mutation.

use std::sync::Arc;

use crate::observable::{Dispatcher, Observable, Subscription};
use crate::{
    CanvasSnapshot, InteractionMode, Layer, LayerId, LayerPatch, StageSize, StoreConfig,
    StoreError, StoreResult, UpdatePolicy,
};

/// The ordered layer collection, back-to-front.
pub type Layers = Vec<Arc<Layer>>;

/// Canvas composition state shared across the application.
///
/// Cloning yields another handle to the same state. Pass it explicitly to
/// whatever needs it; there is no global instance.
///
/// All four pieces deliver through one queue: a mutation made from inside a
/// subscriber callback, on any piece, reaches subscribers only after the
/// mutation being delivered has reached all of them.
///
/// # Example
///
/// ```
/// use meme_core::{Layer, LayerId, LayerPatch, LayerStore};
///
/// let store = LayerStore::new();
/// store.set_layers(vec![Layer::text(1, "ONE DOES NOT SIMPLY")]);
///
/// store.update_layer(LayerId::new(1), &LayerPatch::new().x(10.0)).unwrap();
/// assert_eq!(store.layer(LayerId::new(1)).unwrap().x, 10.0);
/// ```
#[derive(Debug, Clone)]
pub struct LayerStore {
    layers: Observable<Layers>,
    selection: Observable<Option<LayerId>>,
    stage: Observable<StageSize>,
    mode: Observable<InteractionMode>,
    update_policy: UpdatePolicy,
}

impl Default for LayerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStore {
    /// Create an empty store with an 800x600 stage and lenient updates.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store from `config`.
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let dispatcher = Dispatcher::new();
        Self {
            layers: Observable::with_dispatcher(Vec::new(), dispatcher.clone()),
            selection: Observable::with_dispatcher(None, dispatcher.clone()),
            stage: Observable::with_dispatcher(config.stage, dispatcher.clone()),
            mode: Observable::with_dispatcher(InteractionMode::default(), dispatcher),
            update_policy: config.update_policy,
        }
    }

    /// The policy applied to updates and removals of missing layers.
    #[must_use]
    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Replace the whole layer collection.
    ///
    /// Ids are not checked for uniqueness; callers must supply unique ids.
    pub fn set_layers(&self, layers: impl IntoIterator<Item = Layer>) {
        let layers: Layers = layers.into_iter().map(Arc::new).collect();
        tracing::debug!(count = layers.len(), "Replacing layer collection");
        self.layers.set(layers);
    }

    /// Set the selected layer, or clear it with `None`.
    ///
    /// The id is not checked against the collection.
    pub fn select(&self, id: impl Into<Option<LayerId>>) {
        let id = id.into();
        tracing::debug!(selected = ?id, "Selecting layer");
        self.selection.set(id);
    }

    /// Shallow-merge `patch` into the layer with this id.
    ///
    /// Every other layer keeps its `Arc` identity. Returns `Ok(true)` when a
    /// layer was updated. A missing id returns `Ok(false)` and changes nothing
    /// under [`UpdatePolicy::Lenient`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LayerNotFound`] for a missing id under
    /// [`UpdatePolicy::Strict`].
    pub fn update_layer(&self, id: LayerId, patch: &LayerPatch) -> StoreResult<bool> {
        let updated = self.layers.update(|layers| {
            if !layers.iter().any(|layer| layer.id == id) {
                return None;
            }
            Some(
                layers
                    .iter()
                    .map(|layer| {
                        if layer.id == id {
                            Arc::new(layer.merged(patch))
                        } else {
                            Arc::clone(layer)
                        }
                    })
                    .collect(),
            )
        });

        if updated {
            tracing::debug!(layer = %id, "Updated layer");
            Ok(true)
        } else {
            self.missing(id, "update").map(|()| false)
        }
    }

    /// Replace the stage dimensions.
    pub fn resize_stage(&self, size: StageSize) {
        tracing::debug!(stage = %size, "Resizing stage");
        self.stage.set(size);
    }

    /// Enter or leave drawing mode.
    ///
    /// Leaving drawing mode returns to [`InteractionMode::Select`].
    pub fn set_drawing(&self, drawing: bool) {
        self.set_mode(if drawing {
            InteractionMode::Draw
        } else {
            InteractionMode::Select
        });
    }

    /// Set the interaction mode.
    pub fn set_mode(&self, mode: InteractionMode) {
        tracing::debug!(?mode, "Setting interaction mode");
        self.mode.set(mode);
    }

    /// Append a layer on top of the stack.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateLayer`] if the id is already taken.
    pub fn add_layer(&self, layer: Layer) -> StoreResult<()> {
        let id = layer.id;
        let layer = Arc::new(layer);
        let added = self.layers.update(|layers| {
            if layers.iter().any(|existing| existing.id == id) {
                return None;
            }
            let mut next = layers.clone();
            next.push(layer);
            Some(next)
        });

        if added {
            tracing::debug!(layer = %id, "Added layer");
            Ok(())
        } else {
            Err(StoreError::DuplicateLayer(id))
        }
    }

    /// Remove a layer, clearing the selection first if it points at it.
    ///
    /// Returns the removed layer. A missing id returns `Ok(None)` under
    /// [`UpdatePolicy::Lenient`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LayerNotFound`] for a missing id under
    /// [`UpdatePolicy::Strict`].
    pub fn remove_layer(&self, id: LayerId) -> StoreResult<Option<Arc<Layer>>> {
        if self.layer(id).is_none() {
            return self.missing(id, "remove").map(|()| None);
        }

        self.selection
            .update(|selected| (*selected == Some(id)).then_some(None));

        let mut removed = None;
        self.layers.update(|layers| {
            let index = layers.iter().position(|layer| layer.id == id)?;
            let mut next = layers.clone();
            removed = Some(next.remove(index));
            Some(next)
        });

        tracing::debug!(layer = %id, "Removed layer");
        Ok(removed)
    }

    fn missing(&self, id: LayerId, action: &str) -> StoreResult<()> {
        match self.update_policy {
            UpdatePolicy::Lenient => {
                tracing::debug!(layer = %id, "Ignoring {action} of missing layer");
                Ok(())
            }
            UpdatePolicy::Strict => Err(StoreError::LayerNotFound(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Readers
    // -----------------------------------------------------------------------

    /// The current layer collection, back-to-front.
    #[must_use]
    pub fn layers(&self) -> Arc<Layers> {
        self.layers.get()
    }

    /// Look up one layer by id.
    #[must_use]
    pub fn layer(&self, id: LayerId) -> Option<Arc<Layer>> {
        self.layers
            .get()
            .iter()
            .find(|layer| layer.id == id)
            .map(Arc::clone)
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.get().len()
    }

    /// The selected layer id, if any.
    #[must_use]
    pub fn selection(&self) -> Option<LayerId> {
        *self.selection.get()
    }

    /// The selected layer, if the selection points at an existing layer.
    #[must_use]
    pub fn selected_layer(&self) -> Option<Arc<Layer>> {
        self.selection().and_then(|id| self.layer(id))
    }

    /// The stage dimensions.
    #[must_use]
    pub fn stage(&self) -> StageSize {
        *self.stage.get()
    }

    /// The interaction mode.
    #[must_use]
    pub fn mode(&self) -> InteractionMode {
        *self.mode.get()
    }

    /// Whether drawing mode is active.
    #[must_use]
    pub fn is_drawing(&self) -> bool {
        self.mode().is_drawing()
    }

    /// All four state pieces at once.
    #[must_use]
    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            layers: self.layers(),
            selected: self.selection(),
            stage: self.stage(),
            mode: self.mode(),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Receive the layer collection now and after every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_layers<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<Layers>) + Send + Sync + 'static,
    {
        self.layers.subscribe(callback)
    }

    /// Receive the selection now and after every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_selection<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<LayerId>) + Send + Sync + 'static,
    {
        self.selection.subscribe(move |selected| callback(**selected))
    }

    /// Receive the stage size now and after every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_stage<F>(&self, callback: F) -> Subscription
    where
        F: Fn(StageSize) + Send + Sync + 'static,
    {
        self.stage.subscribe(move |size| callback(**size))
    }

    /// Receive the interaction mode now and after every change.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe_mode<F>(&self, callback: F) -> Subscription
    where
        F: Fn(InteractionMode) + Send + Sync + 'static,
    {
        self.mode.subscribe(move |mode| callback(**mode))
    }
}
