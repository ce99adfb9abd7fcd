use crate::errors::RelayError;
use bytes::Bytes;
use http::StatusCode;
use http::header::CONTENT_TYPE;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::Response;
use serde::Serialize;

pub type ServiceBody = BoxBody<Bytes, RelayError>;

pub fn full_body(bytes: Bytes) -> ServiceBody {
    Full::new(bytes).map_err(|e| match e {}).boxed()
}

/// Builds an application/json response from a serializable value.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<ServiceBody>, RelayError> {
    let bytes = serde_json::to_vec(value).map(Bytes::from)?;
    Ok(Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(full_body(bytes))?)
}

/// JSON error body of the shape `{"error": message}`.
pub fn error_response(
    status: StatusCode,
    message: &str,
) -> Result<Response<ServiceBody>, RelayError> {
    json_response(status, &serde_json::json!({"error": message}))
}
