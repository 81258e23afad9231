//! HTTP request handlers organized by functionality

pub mod scan;

use crate::infra::errors::AppError;

/// Fallback for paths no route matches.
pub async fn not_found() -> AppError {
    AppError::not_found("Resource not found.")
}

/// Fallback for known paths hit with an unsupported method.
pub async fn method_not_allowed() -> AppError {
    AppError::method_not_allowed("Method not allowed.")
}
