use std::fmt;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse},
};

use crate::templates;

#[derive(Debug)]
pub enum RequestError {
    NotFound,
    NotAuthorized(&'static str),
    Validation(String),
    ServerError,
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RequestError {
    fn from(value: sqlx::Error) -> Self {
        Self::DatabaseError(value)
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::NotFound => f.write_str("Not Found"),
            RequestError::NotAuthorized(message) => f.write_str(message),
            RequestError::Validation(message) => f.write_str(message),
            RequestError::ServerError => f.write_str("Internal Server Error"),
            RequestError::DatabaseError(_) => {
                f.write_str("The database could not complete the request, please try again")
            }
        }
    }
}

impl std::error::Error for RequestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequestError::DatabaseError(e) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for RequestError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if let RequestError::DatabaseError(e) = &self {
            log::error!("Database error: {}", e);
        }
        let page = templates::error_page(status_code, &self.to_string());
        (status_code, Html(page.into_string())).into_response()
    }
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::NotFound => StatusCode::NOT_FOUND,
            RequestError::NotAuthorized(_) => StatusCode::UNAUTHORIZED,
            RequestError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RequestError::ServerError | RequestError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// True when the error comes from a violated UNIQUE constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            RequestError::DatabaseError(sqlx::Error::Database(e)) => {
                e.message().contains("UNIQUE constraint failed")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(RequestError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            RequestError::Validation("Title is required".to_owned()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            RequestError::DatabaseError(sqlx::Error::PoolClosed).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn auth_errors_keep_their_generic_message() {
        let error = RequestError::NotAuthorized("Incorrect password");
        assert_eq!(error.to_string(), "Incorrect password");
        assert!(!error.is_unique_violation());
    }
}
