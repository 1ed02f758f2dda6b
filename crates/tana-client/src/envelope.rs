use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;

/// Error payload inside a failed response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Raw `{ success, data | error }` envelope as sent by the server.
///
/// Decoded with explicit field checks rather than an untagged enum so a
/// failure body with a null `data` field cannot masquerade as success.
#[derive(Debug, Deserialize)]
pub(crate) struct RawEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

/// Decode a response body into the payload carried by a successful envelope.
pub(crate) fn decode_data(status: u16, body: &[u8]) -> Result<Value, ApiError> {
    let envelope: RawEnvelope = serde_json::from_slice(body).map_err(|e| {
        // Non-2xx responses are allowed to carry a non-JSON body.
        if !(200..300).contains(&status) {
            ApiError::Api {
                status,
                code: "http_error".to_string(),
                message: format!("request failed with status {status}"),
            }
        } else {
            ApiError::Decode(e.to_string())
        }
    })?;

    if envelope.success {
        // Mutations like DELETE return `data: null`; map it to JSON null so
        // callers deserializing `()` or `Option<T>` still work.
        return Ok(envelope.data.unwrap_or(Value::Null));
    }

    let (code, message) = envelope
        .error
        .map(|e| (e.code, e.message))
        .unwrap_or_else(|| ("unknown".to_string(), "request failed".to_string()));
    Err(ApiError::Api {
        status,
        code,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_yields_data() {
        let body = br#"{ "success": true, "data": { "count": 3 } }"#;
        let value = decode_data(200, body).unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn failure_envelope_yields_api_error() {
        let body = br#"{ "success": false, "error": { "code": "not_found", "message": "no such task" } }"#;
        let err = decode_data(404, body).unwrap_err();
        match err {
            ApiError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "not_found");
                assert_eq!(message, "no such task");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn null_data_maps_to_json_null() {
        let body = br#"{ "success": true, "data": null }"#;
        let value = decode_data(200, body).unwrap();
        assert!(value.is_null());
    }

    #[test]
    fn non_json_error_body_still_reports_status() {
        let err = decode_data(502, b"bad gateway").unwrap_err();
        match err {
            ApiError::Api { status, code, .. } => {
                assert_eq!(status, 502);
                assert_eq!(code, "http_error");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
