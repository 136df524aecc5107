use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use labscan_core::{
    entities::{AnalysisSummary, ClassifiedResult},
    narrative::{results_to_text, ReportAudience},
    render::{html::to_html, markdown::to_markdown},
    AnalyzeConfig, LabAnalyzer,
};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tempfile::NamedTempFile;
use tokio::fs::File;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const NO_DATA_MESSAGE: &str = "No data could be extracted from this PDF.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub analyzer: LabAnalyzer,
}

pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze_handler))
        .route("/report", post(report_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[tracing::instrument(skip_all)]
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse {
        success: true,
        data: Some("Service is healthy"),
        error: None,
    })
}

#[derive(Debug, Serialize)]
struct AnalyzeData {
    results: Vec<ClassifiedResult>,
    summary: AnalysisSummary,
    report_date: NaiveDate,
}

fn parse_report_date(raw: &str) -> Result<Option<NaiveDate>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid date {raw:?}: {e}")))
}

#[tracing::instrument(skip_all)]
async fn analyze_handler(
    state: State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<AnalyzeData>>, ApiError> {
    let mut temp_file = NamedTempFile::new().map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to create temp file: {e}"),
        )
    })?;
    let mut doc_name = None;
    let mut written = 0usize;
    let mut report_date = None;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Failed to get next field: {e}"),
        )
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            // Only the first uploaded file is analyzed
            "files" | "file" if doc_name.is_none() => {
                doc_name = Some(
                    field
                        .file_name()
                        .and_then(|n| n.split('.').next())
                        .filter(|n| !n.is_empty())
                        .map(|n| n.to_owned())
                        .unwrap_or_else(|| Uuid::new_v4().to_string()),
                );
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    api_error(StatusCode::BAD_REQUEST, format!("Failed to read chunk: {e}"))
                })? {
                    temp_file.write_all(&chunk).map_err(|e| {
                        api_error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Failed to write to temp file: {e}"),
                        )
                    })?;
                    written += chunk.len();
                }
                temp_file.flush().map_err(|e| {
                    api_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Failed to flush temp file: {e}"),
                    )
                })?;
            }
            "date" => {
                let raw = field.text().await.map_err(|e| {
                    api_error(StatusCode::BAD_REQUEST, format!("Failed to read date: {e}"))
                })?;
                report_date = parse_report_date(&raw)?;
            }
            _ => continue,
        }
    }

    let doc_name = match doc_name {
        Some(doc_name) if written > 0 => doc_name,
        _ => return Err(api_error(StatusCode::BAD_REQUEST, "No file provided")),
    };

    let file = File::open(temp_file.path()).await.map_err(|e| {
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to open temp file: {e}"),
        )
    })?;
    // Safety: the temp file is owned by this handler and no longer written to.
    let mmap = unsafe {
        Mmap::map(&file).map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to memory map file: {e}"),
            )
        })?
    };

    let config = AnalyzeConfig {
        report_date,
        ..Default::default()
    };
    let analysis = state
        .analyzer
        .analyze_document(&mmap, doc_name, config, Some(|_| {}))
        .await
        .map_err(|e| {
            // An unreadable document yields no data, same as an empty one
            tracing::error!("can't analyze uploaded document: {e:?}");
            api_error(StatusCode::BAD_REQUEST, NO_DATA_MESSAGE)
        })?;

    if analysis.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, NO_DATA_MESSAGE));
    }
    tracing::info!(
        "analyzed {}: {} results, {} out of range",
        analysis.doc_name,
        analysis.summary.total,
        analysis.summary.out_of_range()
    );

    Ok(Json(ApiResponse {
        success: true,
        data: Some(AnalyzeData {
            results: analysis.results,
            summary: analysis.summary,
            report_date: analysis.report_date,
        }),
        error: None,
    }))
}

#[derive(Debug, Deserialize)]
struct ReportRequest {
    #[serde(rename = "type")]
    report_type: String,
    #[serde(default)]
    results: Vec<ClassifiedResult>,
    #[serde(default)]
    report_date: Option<NaiveDate>,
}

fn with_content_type(content_type: &'static str, body: String) -> Response {
    ([(CONTENT_TYPE, content_type)], body).into_response()
}

#[tracing::instrument(skip_all)]
async fn report_handler(
    headers: HeaderMap,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("Invalid report request: {}", e.body_text()),
        )
    })?;
    let audience: ReportAudience = request
        .report_type
        .parse()
        .map_err(|e: anyhow::Error| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
    if request.results.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No results provided"));
    }

    let accept_header = headers
        .get(ACCEPT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    let results = request.results.as_slice();

    if accept_header.contains("text/html") {
        let html = to_html(results, audience.title(), audience, request.report_date)
            .map_err(|e| {
                api_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to render html: {e}"),
                )
            })?;
        Ok(with_content_type("text/html; charset=utf-8", html))
    } else if accept_header.contains("text/plain") {
        Ok(with_content_type(
            "text/plain; charset=utf-8",
            results_to_text(results),
        ))
    } else {
        // NOTE: Default to markdown
        let markdown = to_markdown(results, audience, request.report_date).map_err(|e| {
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to convert to markdown: {e}"),
            )
        })?;
        Ok(with_content_type("text/markdown; charset=utf-8", markdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const BOUNDARY: &str = "labscan-test-boundary";

    fn test_app() -> Router {
        app(
            AppState {
                analyzer: LabAnalyzer::new(),
            },
            1024 * 1024,
        )
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn report_request(accept: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/report")
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn multipart_request(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, file_name, content) in parts {
            body.push_str(&format!("--{BOUNDARY}\r\n"));
            match file_name {
                Some(file_name) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/pdf\r\n\r\n"
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn sample_results() -> Value {
        json!([
            {"name": "Glucose", "value": 95.0, "unit": "mg/dL", "ref_low": 70.0, "ref_high": 100.0, "status": "Normal"},
            {"name": "HDL", "value": 35.0, "unit": "mg/dL", "ref_low": 40.0, "ref_high": null, "status": "Near"}
        ])
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], "Service is healthy");
    }

    #[tokio::test]
    async fn test_report_markdown_by_default() {
        let req = report_request(
            "*/*",
            json!({"type": "patient", "results": sample_results()}),
        );
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/markdown"));

        let body = body_string(response).await;
        assert!(body.starts_with("# Your Lab Results"));
        assert!(body.contains("| Glucose | 95.0 | mg/dL | 70.0–100.0 | Normal |"));
        assert!(body.contains("> 40.0"));
    }

    #[tokio::test]
    async fn test_report_html() {
        let req = report_request(
            "text/html",
            json!({"type": "doctor", "results": sample_results(), "report_date": "2024-03-15"}),
        );
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.contains("Laboratory Results Report"));
        assert!(body.contains("Report date: 2024-03-15"));
        assert!(body.contains("Glucose"));
    }

    #[tokio::test]
    async fn test_report_plain_text() {
        let req = report_request(
            "text/plain",
            json!({"type": "paciente", "results": sample_results()}),
        );
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_string(response).await;
        assert!(body.starts_with("Here are the patient's laboratory results:\n\n"));
        assert!(body.contains("HDL: 35.0 mg/dL (reference range 40.0–inf). Status: Near."));
    }

    #[tokio::test]
    async fn test_report_rejects_empty_results() {
        let req = report_request("text/html", json!({"type": "doctor", "results": []}));
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "No results provided");
    }

    #[tokio::test]
    async fn test_report_rejects_unknown_type() {
        let req = report_request(
            "text/html",
            json!({"type": "nurse", "results": sample_results()}),
        );
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_report_rejects_malformed_json() {
        let req = Request::builder()
            .method("POST")
            .uri("/report")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{\"type\": "))
            .unwrap();
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_without_file() {
        let req = multipart_request(&[("date", None, "2024-03-15")]);
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn test_analyze_with_empty_file() {
        let req = multipart_request(&[("files", Some("report.pdf"), "")]);
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_analyze_unreadable_pdf_is_no_data() {
        let req = multipart_request(&[
            ("date", None, "2024-03-15"),
            ("files", Some("report.pdf"), "this is not a pdf document"),
        ]);
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], NO_DATA_MESSAGE);
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_date() {
        let req = multipart_request(&[("date", None, "15/03/2024")]);
        let response = test_app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Invalid date"));
    }

    #[test]
    fn test_parse_report_date() {
        assert_eq!(parse_report_date("  ").unwrap(), None);
        assert_eq!(
            parse_report_date("2024-03-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
        assert!(parse_report_date("2024-13-01").is_err());
    }
}
