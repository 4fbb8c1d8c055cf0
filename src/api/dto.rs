//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};

/// Predict response
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub confidence: f64,
    pub status: String,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Version of the library that fitted the model
    pub sklearn_version: String,
    pub version: String,
    pub classifier: String,
    pub n_estimators: usize,
    pub uptime_seconds: u64,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        // Callers always see something to act on
        let message = if message.trim().is_empty() {
            "unknown error".to_string()
        } else {
            message.to_string()
        };

        Self {
            status: "error".to_string(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_never_empty() {
        let err = ErrorResponse::new("  ");
        assert_eq!(err.status, "error");
        assert_eq!(err.message, "unknown error");
    }

    #[test]
    fn test_predict_response_shape() {
        let json = serde_json::to_value(PredictResponse {
            prediction: "Cancer Detected".to_string(),
            confidence: 0.87,
            status: "success".to_string(),
        })
        .unwrap();
        assert_eq!(json["prediction"], "Cancer Detected");
        assert_eq!(json["status"], "success");
        assert!(json["confidence"].is_f64());
    }
}
