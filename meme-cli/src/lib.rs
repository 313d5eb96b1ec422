//! # Meme CLI
//!
//! Cuts the background out of one image and places the result on a fresh
//! canvas, next to the original.
//!
//! ```text
//! meme photo.jpg --output cutout.png --endpoint http://localhost:7000
//! ```
//!
//! The input may be a local file (sent as a data URI) or an `http(s)://` /
//! `data:` reference passed through as-is.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use meme_bgremove::{
    sniff_content_type, BackgroundRemover, HttpSegmentationConfig, HttpSegmentationService,
    ImageRef,
};
use meme_core::{
    Layer, LayerId, LayerPatch, LayerStore, StageSize, StoreConfig, UpdatePolicy,
};

/// Layer id of the original image on the fresh canvas.
pub const SOURCE_LAYER: LayerId = LayerId::new(1);
/// Layer id of the cut-out placed above it.
pub const CUTOUT_LAYER: LayerId = LayerId::new(2);

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Remove the background of an image
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "meme")]
pub struct Cli {
    /// Input image file, URL, or data URI
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Where to write the cut-out image
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Segmentation service URL
    #[arg(long, env = "MEME_SEGMENTATION_URL")]
    pub endpoint: String,

    /// Bearer token for the segmentation service
    #[arg(long, env = "MEME_SEGMENTATION_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Write the resulting canvas state as JSON; the cut-out layer refers
    /// to the output file
    #[arg(long, value_name = "PATH")]
    pub snapshot: Option<PathBuf>,

    /// Fail on updates to missing layers instead of ignoring them
    #[arg(long)]
    pub strict: bool,

    /// Stage width in pixels (default from MEME_STAGE_WIDTH or 800)
    #[arg(long, requires = "stage_height")]
    pub stage_width: Option<u32>,

    /// Stage height in pixels (default from MEME_STAGE_HEIGHT or 600)
    #[arg(long, requires = "stage_width")]
    pub stage_height: Option<u32>,
}

impl Cli {
    /// Store configuration: environment defaults overridden by flags.
    ///
    /// # Errors
    ///
    /// Fails if a stage dimension is zero.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut config = StoreConfig::from_env();
        if self.strict {
            config = config.with_update_policy(UpdatePolicy::Strict);
        }
        if let (Some(width), Some(height)) = (self.stage_width, self.stage_height) {
            let Some(stage) = StageSize::new(width, height) else {
                bail!("stage size must be non-zero, got {width}x{height}");
            };
            config = config.with_stage(stage);
        }
        Ok(config)
    }

    /// Segmentation client configuration.
    #[must_use]
    pub fn segmentation_config(&self) -> HttpSegmentationConfig {
        let config = HttpSegmentationConfig::new(self.endpoint.clone());
        match &self.api_key {
            Some(key) => config.with_api_key(key.clone()),
            None => config,
        }
    }
}

/// What a successful run produced.
#[derive(Debug)]
pub struct RunSummary {
    /// Path the cut-out was written to.
    pub output: PathBuf,
    /// Size of the cut-out in bytes.
    pub bytes: usize,
    /// Media type reported by the service, if any.
    pub content_type: Option<String>,
    /// The canvas after placing the cut-out, with the cut-out layer's `src`
    /// set to the output path.
    pub store: LayerStore,
}

/// Turn the input argument into an image reference.
///
/// URLs and data URIs pass through; anything else is read as a file.
///
/// # Errors
///
/// Fails if the file cannot be read.
pub fn load_input(input: &str) -> Result<ImageRef> {
    if ["http://", "https://", "data:"]
        .iter()
        .any(|prefix| input.starts_with(prefix))
    {
        return Ok(ImageRef::new(input));
    }

    let path = Path::new(input);
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let content_type = sniff_content_type(&bytes).unwrap_or_else(|| {
        tracing::warn!(path = %path.display(), "Unrecognized image format, sending as {FALLBACK_CONTENT_TYPE}");
        FALLBACK_CONTENT_TYPE
    });
    tracing::debug!(path = %path.display(), size = bytes.len(), content_type, "Loaded input image");
    Ok(ImageRef::from_bytes(content_type, &bytes))
}

/// Run one removal end to end.
///
/// # Errors
///
/// Fails on bad configuration, unreadable input, any segmentation error,
/// or if the output cannot be written.
pub async fn run(cli: &Cli) -> Result<RunSummary> {
    let store = LayerStore::with_config(cli.store_config()?);
    let source = load_input(&cli.input)?;

    store.set_layers([Layer::image(SOURCE_LAYER, display_source(&cli.input, &source))]);

    let service = HttpSegmentationService::with_config(cli.segmentation_config())
        .context("configuring segmentation service")?;
    tracing::info!(endpoint = %service.endpoint(), "Removing background");
    let remover = BackgroundRemover::new(service);

    let handle = remover
        .remove_background(&source)
        .await
        .context("background removal failed")?;

    store.add_layer(Layer::image(CUTOUT_LAYER, handle.url()))?;
    store.select(CUTOUT_LAYER);

    let payload = remover
        .handles()
        .resolve(&handle)
        .context("cut-out handle was released early")?;
    std::fs::write(&cli.output, payload.bytes())
        .with_context(|| format!("writing {}", cli.output.display()))?;
    remover.handles().revoke(handle);

    // The handle URL dies with this process; point the layer at the file.
    let mut attrs = store
        .layer(CUTOUT_LAYER)
        .map(|layer| layer.attrs.clone())
        .unwrap_or_default();
    attrs.insert("src".into(), cli.output.display().to_string().into());
    store.update_layer(CUTOUT_LAYER, &LayerPatch::new().attrs(attrs))?;

    if let Some(path) = &cli.snapshot {
        let json = serde_json::to_string_pretty(&store.snapshot())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(RunSummary {
        output: cli.output.clone(),
        bytes: payload.len(),
        content_type: payload.content_type().map(str::to_string),
        store,
    })
}

/// Keep data URIs out of layer attributes and logs; local files are
/// referenced by path.
fn display_source(input: &str, source: &ImageRef) -> String {
    if source.is_data_uri() && !input.starts_with("data:") {
        input.to_string()
    } else {
        source.as_str().to_string()
    }
}
