//! Runtime bridge between the UI command queue and the upload workflow.

use std::{
    path::{Path, PathBuf},
    thread,
};

use client_core::{render_swatches, AnalysisClient, ImageSelection, DEFAULT_SERVER_URL};
use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::{UiError, UiErrorContext, UiEvent};

pub fn launch(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                    UiErrorContext::BackendStartup,
                    format!("backend worker startup failure: failed to build runtime: {err}"),
                )));
                tracing::error!("failed to build backend runtime: {err}");
                return;
            }
        };

        runtime.block_on(async move {
            let mut client = AnalysisClient::new(DEFAULT_SERVER_URL);
            let mut selected_path: Option<PathBuf> = None;
            let _ = ui_tx.try_send(UiEvent::Info("Backend worker ready".to_string()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    BackendCommand::SelectImage { path } => {
                        tracing::info!(path = %path.display(), "backend: select_image");
                        let selection = match read_selection(&path).await {
                            Ok(selection) => selection,
                            Err(err) => {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::SelectImage,
                                    err,
                                )));
                                continue;
                            }
                        };
                        match client.select_image(selection).await {
                            Ok(()) => {
                                selected_path = Some(path);
                                if let Some(image) = client.preview().await {
                                    let filename =
                                        client.selected_filename().await.unwrap_or_default();
                                    let _ = ui_tx
                                        .try_send(UiEvent::PreviewLoaded { filename, image });
                                }
                            }
                            Err(err) => {
                                tracing::error!("backend: select_image failed: {err}");
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::SelectImage,
                                    err.to_string(),
                                )));
                            }
                        }
                    }
                    BackendCommand::Upload {
                        server_url,
                        num_colors,
                    } => {
                        tracing::info!(%server_url, num_colors, "backend: upload");
                        if client.server_url() != server_url.trim_end_matches('/') {
                            // The endpoint is fixed per controller, so a URL edit
                            // means a fresh controller plus a re-selection of the
                            // last picked file.
                            client = AnalysisClient::new(server_url);
                            let Some(path) = selected_path.clone() else {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::Upload,
                                    "no image selected; choose an image before uploading",
                                )));
                                continue;
                            };
                            let reselected = match read_selection(&path).await {
                                Ok(selection) => client.select_image(selection).await,
                                Err(err) => {
                                    let _ = ui_tx.try_send(UiEvent::Error(
                                        UiError::from_message(UiErrorContext::SelectImage, err),
                                    ));
                                    continue;
                                }
                            };
                            if let Err(err) = reselected {
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::SelectImage,
                                    err.to_string(),
                                )));
                                continue;
                            }
                        }

                        match client.trigger_upload(Some(num_colors)).await {
                            Ok(colors) => {
                                let _ = ui_tx.try_send(UiEvent::SwatchesReady {
                                    swatches: render_swatches(&colors),
                                    image_size: client.image_size().await,
                                    source: client.analyzed_filename().await,
                                });
                            }
                            Err(err) => {
                                tracing::error!("backend: upload failed: {err}");
                                let _ = ui_tx.try_send(UiEvent::Error(UiError::from_message(
                                    UiErrorContext::Upload,
                                    err.to_string(),
                                )));
                            }
                        }
                    }
                }
            }
        });
    });
}

async fn read_selection(path: &Path) -> Result<ImageSelection, String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string();
    let mime_type = mime_guess::from_path(path).first_raw().map(str::to_string);
    Ok(ImageSelection {
        filename,
        mime_type,
        bytes,
    })
}
