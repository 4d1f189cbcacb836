use std::{ops::RangeInclusive, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::GenericImageView;
use reqwest::{multipart, Client};
use shared::{
    error::ApiErrorBody,
    protocol::{AnalyzeResponse, ColorSwatch, ImageSize},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Default base URL of the analysis service.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
/// Fixed analyze endpoint path on the service.
pub const ANALYZE_PATH: &str = "/analyze";
/// Multipart field name the service expects the image under.
pub const UPLOAD_FIELD_NAME: &str = "file";
/// Palette sizes the service accepts for `num_colors`.
pub const PALETTE_SIZE_RANGE: RangeInclusive<u8> = 1..=20;

const PREVIEW_MAX_EDGE: u32 = 240;
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Upload workflow status. Mutated only inside [`AnalysisClient`]
/// operations; there are no terminal states, every state accepts a new
/// selection or upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    ImageSelected,
    Uploading,
    ResultsReady,
    UploadFailed,
}

impl WorkflowState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ImageSelected => "image selected",
            Self::Uploading => "uploading",
            Self::ResultsReady => "results ready",
            Self::UploadFailed => "upload failed",
        }
    }
}

/// A file chosen through some picker. The workflow never inspects the
/// payload beyond decoding a preview; validation of the actual content is
/// the analysis service's job.
#[derive(Debug, Clone)]
pub struct ImageSelection {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Locally renderable preview derived from the current selection,
/// downscaled so the longest edge fits `PREVIEW_MAX_EDGE`.
#[derive(Clone)]
pub struct PreviewImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("no image selected; choose an image before uploading")]
    NoImageSelected,
    #[error("an upload is already in flight")]
    UploadInFlight,
    #[error("palette size {requested} is outside the supported range 1-20")]
    InvalidPaletteSize { requested: u8 },
    #[error("could not decode selected image: {reason}")]
    DecodeFailure { reason: String },
    #[error("analysis request failed: {reason}")]
    TransportFailure { status: Option<u16>, reason: String },
    #[error("analysis response was malformed: {reason}")]
    MalformedResponse { reason: String },
}

#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    PreviewReady {
        filename: String,
        width: usize,
        height: usize,
    },
    SelectionRejected {
        reason: String,
    },
    ResultsReady {
        count: usize,
    },
    UploadFailed {
        reason: String,
    },
}

/// Object-safe surface of the upload workflow, for UIs that hold the
/// controller behind a trait object.
#[async_trait]
pub trait WorkflowHandle: Send + Sync {
    async fn select_image(&self, selection: ImageSelection) -> Result<(), UploadError>;
    async fn trigger_upload(&self, num_colors: Option<u8>)
        -> Result<Vec<ColorSwatch>, UploadError>;
    async fn state(&self) -> WorkflowState;
    async fn swatches(&self) -> Vec<ColorSwatch>;
    async fn preview(&self) -> Option<PreviewImage>;
    fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent>;
}

struct WorkflowInner {
    state: WorkflowState,
    selected: Option<ImageSelection>,
    preview: Option<PreviewImage>,
    swatches: Vec<ColorSwatch>,
    image_size: Option<ImageSize>,
    analyzed_filename: Option<String>,
}

/// The upload workflow controller: owns the selected image, its preview,
/// the last received palette, and the single outbound analyze request.
pub struct AnalysisClient {
    http: Client,
    server_url: String,
    inner: Mutex<WorkflowInner>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl AnalysisClient {
    pub fn new(server_url: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            http: Client::new(),
            server_url: server_url.into().trim_end_matches('/').to_string(),
            inner: Mutex::new(WorkflowInner {
                state: WorkflowState::Idle,
                selected: None,
                preview: None,
                swatches: Vec::new(),
                image_size: None,
                analyzed_filename: None,
            }),
            events,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Stores the selection and decodes its preview off the async thread.
    ///
    /// An empty payload (the picker was dismissed) is a no-op. A payload
    /// that does not decode abandons the selection: state, preview, and
    /// any displayed results stay exactly as they were. Displayed results
    /// are also kept on success; only a completed upload replaces them.
    pub async fn select_image(&self, selection: ImageSelection) -> Result<(), UploadError> {
        if selection.bytes.is_empty() {
            info!("empty file selection; workflow state untouched");
            return Ok(());
        }

        {
            let inner = self.inner.lock().await;
            if inner.state == WorkflowState::Uploading {
                return Err(UploadError::UploadInFlight);
            }
        }

        let bytes = selection.bytes.clone();
        let decoded =
            tokio::task::spawn_blocking(move || decode_preview_image(&bytes, PREVIEW_MAX_EDGE))
                .await
                .map_err(|err| UploadError::DecodeFailure {
                    reason: format!("preview decode task failed: {err}"),
                })
                .and_then(|result| {
                    result.map_err(|err| UploadError::DecodeFailure {
                        reason: format!("{err:#}"),
                    })
                });

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(filename = %selection.filename, error = %err, "selection abandoned");
                let _ = self.events.send(WorkflowEvent::SelectionRejected {
                    reason: err.to_string(),
                });
                return Err(err);
            }
        };

        info!(
            filename = %selection.filename,
            width = decoded.width,
            height = decoded.height,
            "image selected; preview decoded"
        );

        let event = WorkflowEvent::PreviewReady {
            filename: selection.filename.clone(),
            width: decoded.width,
            height: decoded.height,
        };

        let mut inner = self.inner.lock().await;
        inner.selected = Some(selection);
        inner.preview = Some(decoded);
        inner.state = WorkflowState::ImageSelected;
        drop(inner);

        let _ = self.events.send(event);
        Ok(())
    }

    /// Uploads the current selection to the analysis service. One multipart
    /// POST per invocation, no retry, no client-side timeout beyond the
    /// transport default.
    ///
    /// Fast-fails without touching the network (and without corrupting
    /// state) when nothing is selected, when an upload is already in
    /// flight, or when `num_colors` is outside [`PALETTE_SIZE_RANGE`].
    /// Any failure after the request starts moves the workflow to
    /// `UploadFailed` and leaves previously received swatches untouched.
    pub async fn trigger_upload(
        &self,
        num_colors: Option<u8>,
    ) -> Result<Vec<ColorSwatch>, UploadError> {
        if let Some(requested) = num_colors {
            if !PALETTE_SIZE_RANGE.contains(&requested) {
                return Err(UploadError::InvalidPaletteSize { requested });
            }
        }

        let (form, filename) = {
            let mut inner = self.inner.lock().await;
            if inner.state == WorkflowState::Uploading {
                return Err(UploadError::UploadInFlight);
            }
            let selected = inner.selected.as_ref().ok_or(UploadError::NoImageSelected)?;
            let part = build_file_part(selected);
            let filename = selected.filename.clone();
            inner.state = WorkflowState::Uploading;
            (multipart::Form::new().part(UPLOAD_FIELD_NAME, part), filename)
        };

        info!(filename = %filename, num_colors, "uploading image for analysis");

        let mut request = self
            .http
            .post(format!("{}{}", self.server_url, ANALYZE_PATH))
            .multipart(form);
        if let Some(palette_size) = num_colors {
            request = request.query(&[("num_colors", u32::from(palette_size))]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                return Err(self
                    .fail_upload(UploadError::TransportFailure {
                        status: None,
                        reason: err.to_string(),
                    })
                    .await);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = match ApiErrorBody::detail_from_body(&body) {
                Some(detail) => format!("analysis service returned {status}: {detail}"),
                None => format!("analysis service returned {status}"),
            };
            return Err(self
                .fail_upload(UploadError::TransportFailure {
                    status: Some(status.as_u16()),
                    reason,
                })
                .await);
        }

        let parsed: AnalyzeResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(err) => {
                return Err(self
                    .fail_upload(UploadError::MalformedResponse {
                        reason: err.to_string(),
                    })
                    .await);
            }
        };

        let mut inner = self.inner.lock().await;
        inner.swatches = parsed.colors.clone();
        inner.image_size = parsed.image_size;
        inner.analyzed_filename = parsed.filename.clone().or(Some(filename));
        inner.state = WorkflowState::ResultsReady;
        drop(inner);

        info!(count = parsed.colors.len(), "analysis results received");
        let _ = self.events.send(WorkflowEvent::ResultsReady {
            count: parsed.colors.len(),
        });
        Ok(parsed.colors)
    }

    async fn fail_upload(&self, err: UploadError) -> UploadError {
        {
            let mut inner = self.inner.lock().await;
            inner.state = WorkflowState::UploadFailed;
        }
        warn!(error = %err, "upload attempt failed");
        let _ = self.events.send(WorkflowEvent::UploadFailed {
            reason: err.to_string(),
        });
        err
    }

    pub async fn state(&self) -> WorkflowState {
        self.inner.lock().await.state
    }

    /// Last received palette, in service order.
    pub async fn swatches(&self) -> Vec<ColorSwatch> {
        self.inner.lock().await.swatches.clone()
    }

    pub async fn preview(&self) -> Option<PreviewImage> {
        self.inner.lock().await.preview.clone()
    }

    pub async fn image_size(&self) -> Option<ImageSize> {
        self.inner.lock().await.image_size
    }

    /// Filename the displayed palette was computed from. Survives a new
    /// selection, so a UI can tell stale results from fresh ones.
    pub async fn analyzed_filename(&self) -> Option<String> {
        self.inner.lock().await.analyzed_filename.clone()
    }

    pub async fn selected_filename(&self) -> Option<String> {
        self.inner
            .lock()
            .await
            .selected
            .as_ref()
            .map(|selection| selection.filename.clone())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl WorkflowHandle for AnalysisClient {
    async fn select_image(&self, selection: ImageSelection) -> Result<(), UploadError> {
        AnalysisClient::select_image(self, selection).await
    }

    async fn trigger_upload(
        &self,
        num_colors: Option<u8>,
    ) -> Result<Vec<ColorSwatch>, UploadError> {
        AnalysisClient::trigger_upload(self, num_colors).await
    }

    async fn state(&self) -> WorkflowState {
        AnalysisClient::state(self).await
    }

    async fn swatches(&self) -> Vec<ColorSwatch> {
        AnalysisClient::swatches(self).await
    }

    async fn preview(&self) -> Option<PreviewImage> {
        AnalysisClient::preview(self).await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<WorkflowEvent> {
        AnalysisClient::subscribe_events(self)
    }
}

/// One display row per received swatch.
#[derive(Debug, Clone, PartialEq)]
pub struct SwatchDisplay {
    pub rgb: [u8; 3],
    pub hex: String,
    pub percentage: f64,
    pub name: String,
    pub is_dark: bool,
}

impl SwatchDisplay {
    pub fn percentage_label(&self) -> String {
        format!("{:.2}%", self.percentage)
    }

    pub fn tooltip(&self) -> String {
        if self.name.is_empty() {
            format!("{} - {}", self.hex, self.percentage_label())
        } else {
            format!("{} ({}) - {}", self.name, self.hex, self.percentage_label())
        }
    }
}

/// Pure projection of a received palette into display rows: one row per
/// swatch, service order preserved, identical colors kept separate.
pub fn render_swatches(colors: &[ColorSwatch]) -> Vec<SwatchDisplay> {
    colors
        .iter()
        .map(|swatch| SwatchDisplay {
            rgb: swatch.rgb,
            hex: swatch.hex.clone(),
            percentage: swatch.percentage,
            name: swatch.name.clone(),
            is_dark: swatch.is_dark(),
        })
        .collect()
}

fn build_file_part(selected: &ImageSelection) -> multipart::Part {
    let base_part = || {
        multipart::Part::bytes(selected.bytes.clone()).file_name(selected.filename.clone())
    };
    match selected.mime_type.as_deref() {
        Some(mime) => base_part().mime_str(mime).unwrap_or_else(|_| {
            warn!(mime, "declared media type is not parseable; sending without one");
            base_part()
        }),
        None => base_part(),
    }
}

fn decode_preview_image(bytes: &[u8], max_edge: u32) -> Result<PreviewImage> {
    let decoded = image::load_from_memory(bytes).context("unsupported or corrupt image data")?;
    let (orig_w, orig_h) = decoded.dimensions();
    let scale = (max_edge as f32 / orig_w.max(orig_h) as f32).min(1.0);
    let resized = if scale < 1.0 {
        decoded.resize(
            (orig_w as f32 * scale).max(1.0) as u32,
            (orig_h as f32 * scale).max(1.0) as u32,
            image::imageops::FilterType::Triangle,
        )
    } else {
        decoded
    };
    let rgba = resized.to_rgba8();
    Ok(PreviewImage {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
