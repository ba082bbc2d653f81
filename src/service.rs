use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::analysis::{ANALYSIS_PROMPT, parse_analysis};
use crate::classify::UpstreamErrorClassifier;
use crate::gemini::{AnalysisModel, DEFAULT_MODEL, GeminiClient, InlineData};
use crate::models::AnalysisReply;
use crate::upload::UploadedFile;

type ApiResult<T> = Result<Json<T>, ApiError>;
type ApiError = (StatusCode, Json<Value>);

// The UI caps uploads at 10 MiB client-side; the server applies no check of
// its own, so the framework limit just needs to sit above the client cap.
const MAX_UPLOAD_BYTES: usize = 15 * 1024 * 1024;

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn configuration_error(message: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

fn upstream_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn pdf_not_supported_error() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "PDF analysis requires conversion",
            "message": "Please convert your PDF to a PNG or JPG image and try again.",
            "suggestion": "You can screenshot the relevant pages or use a free PDF-to-image converter."
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    /// None when no upstream credential was configured at startup; analyze
    /// requests then fail with a configuration error without any network call.
    pub model: Option<Arc<dyn AnalysisModel>>,
    pub classifier: Arc<UpstreamErrorClassifier>,
}

pub fn create_app() -> Router {
    build_router(create_app_state())
}

fn create_app_state() -> AppState {
    let model = match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            let model_id =
                std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
            Some(Arc::new(GeminiClient::new(key, model_id)) as Arc<dyn AnalysisModel>)
        }
        _ => {
            error!("GEMINI_API_KEY is not set; analysis requests will fail until it is configured");
            None
        }
    };

    AppState {
        model,
        classifier: Arc::new(UpstreamErrorClassifier::default()),
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analyze-report", post(analyze_report))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Report Analysis Service",
        "version": "1.0.0",
        "description": "AI-powered medical report analysis",
        "endpoints": {
            "POST /analyze-report": "Analyze an uploaded report image",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn analyze_report(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<AnalysisReply> {
    let file = read_upload(multipart)
        .await?
        .ok_or_else(|| bad_request_error("No file provided"))?;

    let model = state
        .model
        .clone()
        .ok_or_else(|| configuration_error("Gemini API key not configured"))?;

    let mime_type = file.resolved_mime_type();
    info!(
        "Processing file: name={} type={} size={}",
        file.file_name,
        mime_type,
        file.bytes.len()
    );

    // The model tier used here only takes image inputs; PDFs are turned away
    // with conversion guidance instead of being forwarded.
    if mime_type == "application/pdf" {
        return Err(pdf_not_supported_error());
    }

    let part = InlineData::encode(mime_type, &file.bytes);

    match model.generate(ANALYSIS_PROMPT, &part).await {
        Ok(text) => {
            let outcome = parse_analysis(&text);
            if outcome.fallback {
                warn!(
                    "Returning fallback analysis for {} (unparsable model reply)",
                    file.file_name
                );
            }
            Ok(Json(AnalysisReply {
                success: true,
                file_name: file.file_name,
                file_size: file.bytes.len() as u64,
                analysis: outcome.analysis,
            }))
        }
        Err(e) => {
            error!("Error analyzing report: {}", e);
            let details = e.to_string();
            Err(upstream_error(state.classifier.classify(&details), &details))
        }
    }
}

/// Pull the `file` field out of the multipart body. Other fields are ignored;
/// a body with no `file` field yields None.
async fn read_upload(mut multipart: Multipart) -> Result<Option<UploadedFile>, ApiError> {
    loop {
        let field = multipart.next_field().await.map_err(|e| {
            error!("Failed to read multipart body: {}", e);
            bad_request_error("Invalid multipart form data")
        })?;

        let Some(field) = field else {
            return Ok(None);
        };

        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| {
            error!("Failed to read uploaded file: {}", e);
            bad_request_error("Invalid multipart form data")
        })?;

        return Ok(Some(UploadedFile {
            file_name,
            content_type,
            bytes,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::ModelError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const VALID_REPLY: &str = r#"{
        "patientName": "Alex Rivera",
        "reportDate": "2024-01-15",
        "reportType": "Blood Test Summary",
        "keyFindings": [{
            "severity": "warning",
            "icon": "info",
            "color": "amber-500",
            "description": "Vitamin D slightly low."
        }],
        "testResults": [{
            "testName": "Hemoglobin (Hb)",
            "result": "11.2 g/dL",
            "referenceRange": "13.5 - 17.5 g/dL",
            "status": "low"
        }],
        "medications": [],
        "questions": ["When should I retest?"],
        "summary": "Mostly fine."
    }"#;

    enum MockReply {
        Text(&'static str),
        Fail(&'static str),
    }

    struct MockModel {
        reply: MockReply,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn new(reply: MockReply) -> Arc<Self> {
            Arc::new(MockModel {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AnalysisModel for MockModel {
        async fn generate(&self, _prompt: &str, _part: &InlineData) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                MockReply::Text(text) => Ok(text.to_string()),
                MockReply::Fail(body) => Err(ModelError::Api {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: body.to_string(),
                }),
            }
        }
    }

    fn app_with_model(model: Option<Arc<MockModel>>) -> Router {
        build_router(AppState {
            model: model.map(|m| m as Arc<dyn AnalysisModel>),
            classifier: Arc::new(UpstreamErrorClassifier::default()),
        })
    }

    fn upload_request(file_name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(b"--BOUNDARY\r\n");
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        if !content_type.is_empty() {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n--BOUNDARY--\r\n");

        Request::builder()
            .method("POST")
            .uri("/analyze-report")
            .header(
                "content-type",
                "multipart/form-data; boundary=BOUNDARY",
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let app = app_with_model(Some(MockModel::new(MockReply::Text(VALID_REPLY))));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response_json(response).await;
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn missing_file_field_is_a_400() {
        let model = MockModel::new(MockReply::Text(VALID_REPLY));
        let app = app_with_model(Some(model.clone()));

        let body = b"--BOUNDARY\r\n\
            Content-Disposition: form-data; name=\"note\"\r\n\r\n\
            hello\r\n\
            --BOUNDARY--\r\n";
        let request = Request::builder()
            .method("POST")
            .uri("/analyze-report")
            .header("content-type", "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body.as_slice()))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"], "No file provided");
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_credential_is_a_500_even_for_a_valid_file() {
        let app = app_with_model(None);
        let response = app
            .oneshot(upload_request("report.jpg", "image/jpeg", b"fakejpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Gemini API key not configured");
    }

    #[tokio::test]
    async fn pdf_upload_is_turned_away_without_an_upstream_call() {
        let model = MockModel::new(MockReply::Text(VALID_REPLY));
        let app = app_with_model(Some(model.clone()));

        let response = app
            .oneshot(upload_request(
                "results.pdf",
                "application/octet-stream",
                b"%PDF-1.4",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["error"], "PDF analysis requires conversion");
        assert!(json["suggestion"].as_str().unwrap().contains("converter"));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn well_formed_reply_returns_upstream_values_unmodified() -> anyhow::Result<()> {
        let model = MockModel::new(MockReply::Text(VALID_REPLY));
        let app = app_with_model(Some(model.clone()));

        let response = app
            .oneshot(upload_request("report.jpg", "image/jpeg", b"fakejpeg"))
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["fileName"], "report.jpg");
        assert_eq!(json["fileSize"], 8);
        assert_eq!(json["analysis"]["patientName"], "Alex Rivera");
        assert_eq!(
            json["analysis"]["testResults"][0]["testName"],
            "Hemoglobin (Hb)"
        );
        assert_eq!(json["analysis"]["testResults"][0]["status"], "low");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn fenced_reply_is_unwrapped_before_parsing() {
        let model = MockModel::new(MockReply::Text(
            "```json\n{\"patientName\":\"B\",\"reportDate\":\"d\",\"reportType\":\"t\",\"summary\":\"s\"}\n```",
        ));
        let app = app_with_model(Some(model));

        let response = app
            .oneshot(upload_request("report.png", "", b"fakepng"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["analysis"]["patientName"], "B");
        assert_eq!(json["analysis"]["testResults"], json!([]));
    }

    #[tokio::test]
    async fn unparsable_reply_still_succeeds_with_the_fallback_analysis() {
        let model = MockModel::new(MockReply::Text("Sorry, I can't read this image."));
        let app = app_with_model(Some(model));

        let response = app
            .oneshot(upload_request("blurry.jpg", "image/jpeg", b"fakejpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["analysis"]["patientName"], "Sample Patient");
        assert_eq!(json["analysis"]["testResults"], json!([]));
        assert_eq!(json["analysis"]["medications"], json!([]));
        let findings = json["analysis"]["keyFindings"].as_array().unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0]["severity"], "normal");
    }

    #[tokio::test]
    async fn quota_failures_get_the_quota_message_with_raw_details() {
        let model = MockModel::new(MockReply::Fail(
            "Resource has been exhausted (e.g. check quota).",
        ));
        let app = app_with_model(Some(model));

        let response = app
            .oneshot(upload_request("report.jpg", "image/jpeg", b"fakejpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("quota"));
        assert!(json["details"].as_str().unwrap().contains("exhausted"));
    }

    #[tokio::test]
    async fn api_key_failures_get_the_key_message() {
        let model = MockModel::new(MockReply::Fail(
            "API key not valid. Please pass a valid API key.",
        ));
        let app = app_with_model(Some(model));

        let response = app
            .oneshot(upload_request("report.jpg", "image/jpeg", b"fakejpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn unknown_failures_get_the_generic_message() {
        let model = MockModel::new(MockReply::Fail("something odd happened"));
        let app = app_with_model(Some(model));

        let response = app
            .oneshot(upload_request("report.jpg", "image/jpeg", b"fakejpeg"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"], crate::classify::GENERIC_FAILURE);
    }
}
