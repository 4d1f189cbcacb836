use serde::{Deserialize, Serialize};

use crate::domain::Rgb;

/// One dominant color reported by the analysis service, in the order the
/// service ranked it. `rgb`, `hex`, `percentage`, and `name` are always
/// present; `is_dark` is an extra the service may include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSwatch {
    pub rgb: [u8; 3],
    pub hex: String,
    pub percentage: f64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dark: Option<bool>,
}

impl ColorSwatch {
    pub fn rgb(&self) -> Rgb {
        Rgb(self.rgb)
    }

    /// Service-provided flag when present, local luma estimate otherwise.
    pub fn is_dark(&self) -> bool {
        self.is_dark.unwrap_or_else(|| self.rgb().is_dark())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Successful `/analyze` response. Only `colors` decides whether the body
/// is well formed; everything else is advisory metadata the service adds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub colors: Vec<ColorSwatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_colors: Option<usize>,
}
