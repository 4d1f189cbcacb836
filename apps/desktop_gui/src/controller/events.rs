//! UI/backend events and error modeling for the desktop GUI controller.

use client_core::{PreviewImage, SwatchDisplay};
use shared::protocol::ImageSize;

pub enum UiEvent {
    Info(String),
    PreviewLoaded {
        filename: String,
        image: PreviewImage,
    },
    SwatchesReady {
        swatches: Vec<SwatchDisplay>,
        image_size: Option<ImageSize>,
        source: Option<String>,
    },
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Transport,
    Decode,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    SelectImage,
    Upload,
}

pub fn classify_upload_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
        || lower.contains("error sending request")
    {
        "Analysis service unreachable; check the server URL and try again.".to_string()
    } else {
        format!("Upload error: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("decode")
            || message_lower.contains("corrupt")
            || message_lower.contains("unsupported")
        {
            UiErrorCategory::Decode
        } else if message_lower.contains("no image selected")
            || message_lower.contains("palette size")
            || message_lower.contains("already in flight")
        {
            UiErrorCategory::Validation
        } else if message_lower.contains("connection")
            || message_lower.contains("timed out")
            || message_lower.contains("network")
            || message_lower.contains("request failed")
            || message_lower.contains("analysis service returned")
            || message_lower.contains("disconnect")
        {
            UiErrorCategory::Transport
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub fn err_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Transport => "Transport",
        UiErrorCategory::Decode => "Image decode",
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Unknown => "Unexpected",
    }
}
