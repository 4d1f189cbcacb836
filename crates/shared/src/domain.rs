use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An 8-bit-per-channel color triple as reported by the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub [u8; 3]);

#[derive(Debug, Error)]
pub enum ParseHexError {
    #[error("hex color must be 7 characters of the form #RRGGBB, got {0:?}")]
    Malformed(String),
    #[error("hex color {0:?} contains a non-hexadecimal digit")]
    InvalidDigit(String),
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b])
    }

    pub fn r(&self) -> u8 {
        self.0[0]
    }

    pub fn g(&self) -> u8 {
        self.0[1]
    }

    pub fn b(&self) -> u8 {
        self.0[2]
    }

    /// Lowercase `#rrggbb`, the form the analysis service emits.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }

    pub fn from_hex(hex: &str) -> Result<Self, ParseHexError> {
        let digits = hex
            .strip_prefix('#')
            .filter(|rest| rest.len() == 6)
            .ok_or_else(|| ParseHexError::Malformed(hex.to_string()))?;
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ParseHexError::InvalidDigit(hex.to_string()))
        };
        Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?]))
    }

    /// BT.601 luma check, matching how the analysis service classifies
    /// swatches when it includes `is_dark` in its payload.
    pub fn is_dark(&self) -> bool {
        let [r, g, b] = self.0.map(|channel| f64::from(channel) / 255.0);
        r * 0.299 + g * 0.587 + b * 0.114 < 0.5
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(channels: [u8; 3]) -> Self {
        Self(channels)
    }
}
