use serde::{Deserialize, Serialize};

/// Error body the analysis service attaches to non-2xx responses,
/// e.g. `{"detail": "File must be an image"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
}

impl ApiErrorBody {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// Best-effort extraction of a service-provided failure reason from a
    /// raw response body. Returns `None` when the body is not the known
    /// error shape.
    pub fn detail_from_body(body: &str) -> Option<String> {
        serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .map(|parsed| parsed.detail)
            .filter(|detail| !detail.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_detail_from_service_error_body() {
        assert_eq!(
            ApiErrorBody::detail_from_body(r#"{"detail": "File must be an image"}"#),
            Some("File must be an image".to_string())
        );
    }

    #[test]
    fn ignores_bodies_without_the_error_shape() {
        assert_eq!(ApiErrorBody::detail_from_body("half a page of html"), None);
        assert_eq!(ApiErrorBody::detail_from_body(r#"{"detail": ""}"#), None);
        assert_eq!(ApiErrorBody::detail_from_body(r#"{"other": 1}"#), None);
    }
}
