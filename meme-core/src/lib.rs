//! # Meme Canvas Core
//!
//! Canvas composition state for the meme editor.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 LayerStore                  │
//! ├─────────────────────────────────────────────┤
//! │  layers     Observable<Vec<Arc<Layer>>>     │
//! │  selection  Observable<Option<LayerId>>     │
//! │  stage      Observable<StageSize>           │
//! │  mode       Observable<InteractionMode>     │
//! └─────────────────────────────────────────────┘
//!        │ full snapshot on every mutation
//!        ▼
//!   renderer / UI subscribers
//! ```
//!
//! Layers are only ever changed through [`LayerStore`] operations. Readers get
//! immutable `Arc` snapshots; an update replaces the touched layer and leaves
//! every other layer pointer-identical.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod layer;
pub mod observable;
pub mod state;
pub mod store;

pub use config::{StoreConfig, UpdatePolicy};
pub use error::{StoreError, StoreResult};
pub use layer::{Attrs, Layer, LayerId, LayerKind, LayerPatch};
pub use observable::{Dispatcher, Observable, Subscription};
pub use state::{CanvasSnapshot, InteractionMode, StageSize};
pub use store::{LayerStore, Layers};

/// Meme core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
