use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{render_swatches, AnalysisClient, ImageSelection, DEFAULT_SERVER_URL};

/// Upload an image to the color analysis service and print its palette.
#[derive(Parser, Debug)]
struct Args {
    /// Image file to analyze.
    image: PathBuf,
    /// Base URL of the analysis service.
    #[arg(long, default_value = DEFAULT_SERVER_URL)]
    server_url: String,
    /// Palette size to request (1-20); the service default applies when omitted.
    #[arg(long)]
    colors: Option<u8>,
    /// Print the received palette as JSON instead of formatted rows.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let bytes = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let filename = args
        .image
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    let mime_type = mime_guess::from_path(&args.image)
        .first_raw()
        .map(str::to_string);

    let client = AnalysisClient::new(args.server_url);
    client
        .select_image(ImageSelection {
            filename,
            mime_type,
            bytes,
        })
        .await?;
    let palette = client.trigger_upload(args.colors).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&palette)?);
        return Ok(());
    }

    if palette.is_empty() {
        println!("Analysis service returned an empty palette.");
        return Ok(());
    }
    for row in render_swatches(&palette) {
        let name = if row.name.is_empty() {
            "(unnamed)"
        } else {
            row.name.as_str()
        };
        println!("{}  {:>7}  {}", row.hex, row.percentage_label(), name);
    }
    Ok(())
}
