use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field name mapped to the messages explaining why it was rejected.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    BadRequest,
    NotFound,
    Unauthorized,
    TooManyRequests,
    InternalServerError,
}

impl RpcErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            RpcErrorCode::BadRequest => 400,
            RpcErrorCode::Unauthorized => 401,
            RpcErrorCode::NotFound => 404,
            RpcErrorCode::TooManyRequests => 429,
            RpcErrorCode::InternalServerError => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcErrorBody {
    pub code: RpcErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResult {
    pub data: Value,
}

/// Response body of every wire call: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RpcEnvelope {
    Result(RpcResult),
    Error(RpcErrorBody),
}

impl RpcEnvelope {
    pub fn ok(data: Value) -> Self {
        Self::Result(RpcResult { data })
    }

    pub fn into_result(self) -> Result<Value, RpcErrorBody> {
        match self {
            RpcEnvelope::Result(result) => Ok(result.data),
            RpcEnvelope::Error(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_shape() {
        let ok = RpcEnvelope::ok(json!([1, 2]));
        assert_eq!(
            serde_json::to_value(&ok).expect("serialize"),
            json!({"result": {"data": [1, 2]}})
        );

        let mut fields = FieldErrors::new();
        fields.insert("content".to_string(), vec!["too long".to_string()]);
        let err = RpcEnvelope::Error(RpcErrorBody {
            code: RpcErrorCode::BadRequest,
            message: "validation failed".to_string(),
            field_errors: Some(fields),
        });
        assert_eq!(
            serde_json::to_value(&err).expect("serialize"),
            json!({"error": {
                "code": "BAD_REQUEST",
                "message": "validation failed",
                "fieldErrors": {"content": ["too long"]}
            }})
        );
    }

    #[test]
    fn missing_field_errors_deserialize_as_none() {
        let body: RpcEnvelope = serde_json::from_value(json!({"error": {
            "code": "NOT_FOUND",
            "message": "user not found"
        }}))
        .expect("deserialize");
        let err = body.into_result().expect_err("error envelope");
        assert_eq!(err.code, RpcErrorCode::NotFound);
        assert!(err.field_errors.is_none());
    }
}
