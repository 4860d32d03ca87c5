use serde_json::json;
use tracing::{error, warn};

use crate::error::ErpError;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Failure of one handler, rendered with `err`.
#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ErpError> for HandlerErr {
    fn from(e: ErpError) -> Self {
        match &e {
            ErpError::Db(_) | ErpError::Internal(_) => error!(error = %e, "request failed"),
            ErpError::Conflict(_) | ErpError::State(_) | ErpError::BusinessRule(_) => {
                warn!(kind = e.kind(), "{e}")
            }
            _ => {}
        }
        HandlerErr {
            code: e.code(),
            message: e.to_string(),
            details: Some(e.details()),
        }
    }
}
