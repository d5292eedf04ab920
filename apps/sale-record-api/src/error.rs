//! Error types for the sale record service.
//!
//! Every failure resolves to one [`ErrorKind`] before it is recorded.
//! Business rule failures carry their own kind; lookup, storage and
//! encoding failures fall under `SaleRecord` with their own text as the
//! diagnostic.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use salerecord_core::{CoreError, ErrorKind};
use salerecord_db::DbError;

use crate::lookup::LookupError;

/// Service errors.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Failed to encode snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl ServiceError {
    /// Classifies the error for the outcome log.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Core(e) => e.kind(),
            _ => ErrorKind::SaleRecord,
        }
    }

    /// Diagnostic text recorded as `error`.
    pub fn diagnostic(&self) -> String {
        match self {
            ServiceError::Core(CoreError::Rule(kind)) => kind.message().to_string(),
            other => other.to_string(),
        }
    }

    /// Localized text shown to API callers.
    pub fn detail(&self) -> &'static str {
        self.kind().detail()
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::Core(_)
            | ServiceError::Lookup(_)
            | ServiceError::Json(_)
            | ServiceError::MissingParameter(_)
            | ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) | ServiceError::Db(DbError::NotFound { .. }) => {
                StatusCode::NOT_FOUND
            }
            ServiceError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ErrorKind> for ServiceError {
    fn from(kind: ErrorKind) -> Self {
        ServiceError::Core(kind.into())
    }
}

/// Convenience type alias for Results with ServiceError.
pub type ServiceResult<T> = Result<T, ServiceError>;

// =============================================================================
// Response Envelope
// =============================================================================

/// `{ success, result, error: { code, message, details } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub result: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: String,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(result: T) -> Self {
        ApiEnvelope {
            success: true,
            result: Some(result),
            error: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiEnvelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            // Rejections: localized detail for people, diagnostic for logs.
            ServiceError::Core(_) | ServiceError::Lookup(_) | ServiceError::Json(_) => ApiErrorBody {
                code: self.kind().tag().to_string(),
                message: self.detail().to_string(),
                details: self.diagnostic(),
            },
            ServiceError::MissingParameter(_) => ApiErrorBody {
                code: "MissParameter".to_string(),
                message: self.to_string(),
                details: String::new(),
            },
            _ => ApiErrorBody {
                code: status.as_u16().to_string(),
                message: self.to_string(),
                details: String::new(),
            },
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let envelope: ApiEnvelope<()> = ApiEnvelope {
            success: false,
            result: None,
            error: Some(body),
        };
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_error_classification() {
        let err = ServiceError::from(CoreError::Rule(ErrorKind::TotalPrice));
        assert_eq!(err.kind(), ErrorKind::TotalPrice);
        assert_eq!(err.diagnostic(), "TotalPrice not equals sum dtl price");
        assert_eq!(err.detail(), "总金额计算错误！");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_infrastructure_error_classification() {
        let err = ServiceError::from(LookupError::Remote {
            entity: "store",
            code: 500,
            message: "boom".into(),
        });
        assert_eq!(err.kind(), ErrorKind::SaleRecord);
        assert_eq!(err.diagnostic(), "Get store error:[500]boom");
        assert_eq!(err.detail(), "上传数据处理异常！");

        let err = ServiceError::from(DbError::not_found("SaleRecord", 9));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        let err = ServiceError::from(DbError::QueryFailed("locked".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
