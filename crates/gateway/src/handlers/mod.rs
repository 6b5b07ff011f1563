//! API handlers module

pub mod fragments;
pub mod health;
pub mod query;
pub mod tasks;

use counsel_common::errors::AppError;
use validator::ValidationErrors;

/// Map request-body validation failures onto the API error type
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let field = errors.field_errors().keys().next().map(|f| f.to_string());
    AppError::InvalidInput {
        message: errors.to_string(),
        field,
    }
}
