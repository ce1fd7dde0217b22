//! HTTP request handlers for the filedrop server

use bytes::Bytes;
use filedrop_core::{FileDropError, Outcome};
use filedrop_engine::Ingestor;
use futures::{Stream, StreamExt};
use http_body_util::{BodyStream, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, SERVER};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use tracing::{debug, info};

use crate::assets;

pub type BoxBody = Full<Bytes>;

/// Header naming the destination in raw-body uploads
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
}

/// Main request handler
pub async fn handle_request(
    req: Request<Incoming>,
    state: AppState,
) -> Result<Response<BoxBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => handle_health(&state),
        (&Method::POST, "/send") => handle_send(req, &state).await,
        (_, "/send") => method_not_allowed("POST"),
        (&Method::GET, path) => handle_asset(path),
        _ => method_not_allowed("GET"),
    };

    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

/// Health check handler
fn handle_health(state: &AppState) -> Response<BoxBody> {
    let uploads: Vec<_> = state
        .ingestor
        .registry()
        .snapshot()
        .into_iter()
        .map(|(id, observation)| json!({ "id": id.get(), "progress": observation }))
        .collect();

    let body = json!({
        "status": "healthy",
        "service": "filedrop",
        "version": env!("CARGO_PKG_VERSION"),
        "active_uploads": uploads,
    });

    let mut response = empty_response(StatusCode::OK);
    *response.body_mut() = Full::new(Bytes::from(body.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Upload handler: multipart form data, or a raw body named by `X-File-Name`
async fn handle_send(req: Request<Incoming>, state: &AppState) -> Response<BoxBody> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(str::to_owned);

    // A form without a usable boundary is malformed, never a raw upload.
    let outcome = match content_type {
        Some(ct) if is_form_data(&ct) => match multer::parse_boundary(&ct) {
            Ok(boundary) => {
                state
                    .ingestor
                    .ingest_multipart(body_stream(req.into_body()), boundary)
                    .await
            }
            Err(e) => FileDropError::MalformedMultipart(e.to_string()).into(),
        },
        _ => {
            let file_name = req
                .headers()
                .get(FILE_NAME_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let content_length = req
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());

            state
                .ingestor
                .ingest_raw(file_name.as_deref(), content_length, body_stream(req.into_body()))
                .await
        }
    };

    outcome_response(&outcome)
}

/// Static frontend handler
fn handle_asset(path: &str) -> Response<BoxBody> {
    match assets::lookup(path) {
        Some(asset) => {
            let mut response = empty_response(StatusCode::OK);
            *response.body_mut() = Full::new(Bytes::from_static(asset.body.as_bytes()));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(asset.content_type));
            response
        }
        None => empty_response(StatusCode::NOT_FOUND),
    }
}

fn is_form_data(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
}

/// Data frames of a request body as a byte stream
fn body_stream(body: Incoming) -> impl Stream<Item = Result<Bytes, hyper::Error>> + Send + 'static {
    BodyStream::new(body)
        .filter_map(|result| async move { result.map(|frame| frame.into_data().ok()).transpose() })
}

/// Status-only response for an upload outcome
pub fn outcome_response(outcome: &Outcome) -> Response<BoxBody> {
    let status =
        StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    empty_response(status)
}

fn method_not_allowed(allow: &'static str) -> Response<BoxBody> {
    let mut response = empty_response(StatusCode::METHOD_NOT_ALLOWED);
    response.headers_mut().insert(ALLOW, HeaderValue::from_static(allow));
    response
}

fn empty_response(status: StatusCode) -> Response<BoxBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(SERVER, HeaderValue::from_static(concat!("filedrop/", env!("CARGO_PKG_VERSION"))));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_form_data() {
        assert!(is_form_data("multipart/form-data; boundary=abc"));
        assert!(is_form_data("Multipart/Form-Data; boundary=abc"));
        assert!(is_form_data("multipart/form-data"));
        assert!(!is_form_data("application/octet-stream"));
        assert!(!is_form_data("multipart/mixed; boundary=abc"));
    }

    #[test]
    fn test_outcome_response_status() {
        assert_eq!(outcome_response(&Outcome::Completed(3)).status(), StatusCode::OK);
        assert_eq!(
            outcome_response(&Outcome::BadRequest("missing file field".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            outcome_response(&Outcome::ServerError("disk full".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_asset_and_fallback_responses() {
        let response = handle_asset("/");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert_eq!(handle_asset("/nope").status(), StatusCode::NOT_FOUND);

        let response = method_not_allowed("POST");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST");
    }
}
