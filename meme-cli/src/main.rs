//! # Meme CLI
//!
//! Removes the background of one image through a segmentation service.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use meme_cli::Cli;

/// Initialize structured tracing with optional JSON format.
///
/// Set `RUST_LOG` to control log levels (default: info,meme_core=debug,meme_bgremove=debug).
/// Set `RUST_LOG_FORMAT=json` for JSON output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,meme_core=debug,meme_bgremove=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    tracing::info!(
        version = meme_core::VERSION,
        input = %cli.input,
        output = %cli.output.display(),
        "Starting meme"
    );

    let summary = meme_cli::run(&cli).await?;

    tracing::info!(
        bytes = summary.bytes,
        content_type = summary.content_type.as_deref().unwrap_or("unknown"),
        layers = summary.store.layer_count(),
        "Cut-out written"
    );
    println!("{}", summary.output.display());
    Ok(())
}
