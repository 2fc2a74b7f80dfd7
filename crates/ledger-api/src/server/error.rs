#[derive(Debug)]
pub enum ServerError {
    Io(std::io::Error),
    Persistence(PersistenceError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "server io error: {err}"),
            Self::Persistence(err) => write!(f, "server persistence error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PersistenceError> for ServerError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}

#[derive(Debug)]
struct HttpApiError {
    status: StatusCode,
    error: ApiError,
}

impl HttpApiError {
    fn invalid_request(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: ApiError::new(ErrorCode::InvalidRequest, message, details),
        }
    }

    fn not_found(message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: ApiError::new(ErrorCode::NotFound, message, details),
        }
    }

    fn storage(details: Option<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: ApiError::new(ErrorCode::StorageError, "storage operation failed", details),
        }
    }

    fn from_ledger(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidClick => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::InvalidClick,
                    "click is invalid or already claimed",
                    None,
                ),
            },
            LedgerError::DwellNotMet {
                elapsed_ms,
                required_ms,
            } => Self {
                status: StatusCode::BAD_REQUEST,
                error: ApiError::new(
                    ErrorCode::DwellNotMet,
                    "dwell time not met",
                    Some(format!("elapsed_ms={elapsed_ms} required_ms={required_ms}")),
                ),
            },
            LedgerError::Storage(err) => Self::storage(Some(err.to_string())),
        }
    }
}

impl IntoResponse for HttpApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}
