//! Axum REST API handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::service::ClassifierService;

use super::dto::*;

/// Application state shared across handlers
pub struct AppState {
    pub service: Arc<ClassifierService>,
    pub start_time: Instant,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Create the REST API router
pub fn create_rest_router(
    state: Arc<AppState>,
    cors_origins: &[String],
    body_limit: usize,
) -> Router {
    Router::new()
        .route("/predict/", post(predict_handler))
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured browser origins, credentials allowed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    // Wildcards are not allowed together with credentials, so mirror instead
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn unprocessable(message: &str) -> ApiError {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorResponse::new(message)))
}

/// Keep the status multer reports (400 malformed, 413 over the body limit)
fn multipart_error(e: MultipartError) -> ApiError {
    warn!("Rejected multipart upload: {}", e.body_text());
    (e.status(), Json(ErrorResponse::new(&e.body_text())))
}

/// Classify an uploaded blood smear image
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| unprocessable(&e.body_text()))?;

    let mut image_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            image_data = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
        }
    }

    let image_data = image_data.ok_or_else(|| unprocessable("Missing file field"))?;

    let result = state.service.predict(&image_data).await.map_err(|e| {
        error!("Prediction failed: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(&e.to_string())),
        )
    })?;

    info!(
        "Prediction: {} ({:.1}%) in {}ms",
        result.diagnosis.as_str(),
        result.confidence * 100.0,
        result.inference_time_ms
    );

    Ok(Json(PredictResponse {
        prediction: result.diagnosis.as_str().to_string(),
        confidence: result.confidence,
        status: "success".to_string(),
    }))
}

/// Health check
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health();

    Json(HealthResponse {
        status: "healthy".to_string(),
        sklearn_version: health.ml_library_version,
        version: health.version,
        classifier: health.classifier,
        n_estimators: health.n_estimators,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::tests::brightness_artifact;
    use crate::engine::ModelHandle;
    use axum::body::Body;
    use axum::http::{header, Request};
    use image::{DynamicImage, Rgb, RgbImage};
    use tower::ServiceExt;

    const BOUNDARY: &str = "cellscan-test-boundary";

    fn app() -> Router {
        app_with_limit(50 * 1024 * 1024)
    }

    fn app_with_limit(body_limit: usize) -> Router {
        let model = ModelHandle::from_artifact(brightness_artifact(8), "mem");
        let state = Arc::new(AppState {
            service: Arc::new(ClassifierService::new(model)),
            start_time: Instant::now(),
        });
        create_rest_router(state, &["http://localhost:5173".to_string()], body_limit)
    }

    fn png(value: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([value; 3])));
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"cell.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn predict_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["sklearn_version"], "linfa-trees 0.8");
        assert_eq!(json["n_estimators"], 5);
        assert!(json["uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn test_predict_valid_image() {
        for (value, expected) in [(240u8, "Cancer Detected"), (15u8, "No Cancer Detected")] {
            let response = app()
                .oneshot(predict_request("/predict/", multipart_body("file", &png(value))))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = json_body(response).await;
            assert_eq!(json["status"], "success");
            assert_eq!(json["prediction"], expected);
            let confidence = json["confidence"].as_f64().unwrap();
            assert!((0.5..=1.0).contains(&confidence));
        }
    }

    #[tokio::test]
    async fn test_predict_without_trailing_slash() {
        let response = app()
            .oneshot(predict_request("/predict", multipart_body("file", &png(200))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_non_image_is_500() {
        let response = app()
            .oneshot(predict_request("/predict/", multipart_body("file", b"hello, not a picture")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_predict_missing_file_field() {
        let response = app()
            .oneshot(predict_request("/predict/", multipart_body("image", &png(100))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Missing file field");
    }

    #[tokio::test]
    async fn test_predict_not_multipart() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_predict_upload_over_body_limit() {
        let response = app_with_limit(1024)
            .oneshot(predict_request("/predict/", multipart_body("file", &[0u8; 8192])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = json_body(response).await;
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_cors_allowed_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }

    #[tokio::test]
    async fn test_cors_unknown_origin() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
