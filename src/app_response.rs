use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Every failure the catalog can report to its caller.
///
/// None of these are fatal. The lifecycle manager returns them instead of
/// raising, and the host renders [`AppError::message`] verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppError {
    /// A field rule failed (missing property type, short name, ...).
    ValidationError(String),
    /// Another product already uses the requested name.
    ConflictError(String),
    NotFound(String),
    /// The store rejected a write; in-memory state was left untouched.
    PersistenceError(String),
    DatabaseError(String),
    SerializationError(String),
    BadRequest(String),
}

impl AppError {
    /// The user-facing text carried by the error, without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::ValidationError(msg)
            | AppError::ConflictError(msg)
            | AppError::NotFound(msg)
            | AppError::PersistenceError(msg)
            | AppError::DatabaseError(msg)
            | AppError::SerializationError(msg)
            | AppError::BadRequest(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::ConflictError(msg) => write!(f, "Conflict: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::PersistenceError(msg) => write!(f, "Persistence error: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<LmdbError> for AppError {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppError::NotFound("Key not found in store".to_string()),
            LmdbError::MapFull => {
                AppError::PersistenceError(format!("Storage quota exceeded: {}", err))
            }
            LmdbError::Corrupted | LmdbError::Panic => {
                AppError::DatabaseError(format!("Database is corrupted: {}", err))
            }
            _ => AppError::DatabaseError(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppError {
    fn from(err: SerdeError) -> Self {
        AppError::SerializationError(format!("JSON serialization error: {}", err))
    }
}

/// Uniform result of a catalog operation: success flag, optional error
/// message and optional payload.
///
/// This is the shape handed back across the C ABI:
///
/// ```json
/// { "ok": false, "error": "Name must be at least 3 characters" }
/// { "ok": true, "payload": { "id": 1700000000000, "name": "Casa Sol", ... } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppResponse<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> AppResponse<T> {
    pub fn success(payload: T) -> Self {
        AppResponse {
            ok: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failure(err: &AppError) -> Self {
        AppResponse {
            ok: false,
            error: Some(err.message().to_string()),
            payload: None,
        }
    }
}

impl<T> From<Result<T, AppError>> for AppResponse<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(payload) => AppResponse::success(payload),
            Err(e) => AppResponse::failure(&e),
        }
    }
}
