//! Error taxonomy shared by the core engines and the HTTP layer.

use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde_json::json;
use validator::ValidationErrors;

#[derive(Debug)]
pub enum ForumError {
    /// Malformed input. 400.
    Validation(String),
    /// No or invalid session where one is required. 401.
    Unauthorized(String),
    /// Banned account or invalid admin credential. 403.
    Forbidden(String),
    /// Duplicate username or duplicate report. 409.
    Conflict(String),
    /// Unknown id, or a post that is not approved. 404.
    NotFound(String),
    /// Post cooldown has not elapsed. 429.
    RateLimited { retry_after_seconds: u64 },
    /// Submission hit the sensitive word list and was refused. 403.
    /// `account_banned` is false only for the protected super-admin.
    ContentBanned {
        hits: Vec<String>,
        account_banned: bool,
    },
    /// Storage failure. 500, details only in the log.
    Database(DbErr),
    /// Any other server-side failure. 500, details only in the log.
    Internal(String),
}

impl ForumError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn post_not_found() -> Self {
        Self::NotFound("post not found".to_string())
    }
}

impl std::fmt::Display for ForumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForumError::Validation(msg)
            | ForumError::Unauthorized(msg)
            | ForumError::Forbidden(msg)
            | ForumError::Conflict(msg)
            | ForumError::NotFound(msg) => write!(f, "{}", msg),
            ForumError::RateLimited {
                retry_after_seconds,
            } => write!(f, "posting too fast, retry in {}s", retry_after_seconds),
            ForumError::ContentBanned { account_banned, .. } => {
                write!(f, "post blocked due to sensitive content")?;
                if *account_banned {
                    write!(f, "; account banned")?;
                }
                Ok(())
            }
            ForumError::Database(e) => write!(f, "database error: {}", e),
            ForumError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ForumError {}

impl From<DbErr> for ForumError {
    fn from(e: DbErr) -> Self {
        ForumError::Database(e)
    }
}

impl From<ValidationErrors> for ForumError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        let message = fields
            .into_iter()
            .flat_map(|(field, errs)| errs.iter().map(move |e| (field, e)))
            .map(|(field, e)| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("invalid {}", field),
            })
            .next()
            .unwrap_or_else(|| "invalid input".to_string());

        ForumError::Validation(message)
    }
}

impl ResponseError for ForumError {
    fn status_code(&self) -> StatusCode {
        match self {
            ForumError::Validation(_) => StatusCode::BAD_REQUEST,
            ForumError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ForumError::Forbidden(_) | ForumError::ContentBanned { .. } => StatusCode::FORBIDDEN,
            ForumError::Conflict(_) => StatusCode::CONFLICT,
            ForumError::NotFound(_) => StatusCode::NOT_FOUND,
            ForumError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ForumError::Database(_) | ForumError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());
        match self {
            ForumError::RateLimited {
                retry_after_seconds,
            } => res
                .insert_header((header::RETRY_AFTER, retry_after_seconds.to_string()))
                .json(json!({ "error": self.to_string() })),
            ForumError::ContentBanned { hits, .. } => res.json(json!({
                "error": self.to_string(),
                "flagged": true,
                "sensitive_hits": hits,
            })),
            ForumError::Database(_) | ForumError::Internal(_) => {
                log::error!("Request failed: {}", self);
                res.json(json!({ "error": "internal server error" }))
            }
            _ => res.json(json!({ "error": self.to_string() })),
        }
    }
}
