use ::scraper::error::SelectorErrorKind;

/// Coarse classification of an [`IngestError`], used to decide where a
/// failure is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    /// Fetching a page failed or timed out.
    Network,
    /// A field or a whole record could not be extracted.
    Parse,
    /// The store rejected a write; the transaction was rolled back.
    Persistence,
}

/// All errors that can occur while harvesting and storing esports data.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// HTTP request failed (network, DNS, TLS, etc.).
    #[error("http request failed for {url}: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    /// The upstream host did not answer within the configured timeout.
    #[error("request timed out for {url}")]
    Timeout { url: String },

    /// A request URL could not be built.
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Server returned a non-success HTTP status code.
    #[error("unexpected status {status} for {url}")]
    UnexpectedStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Failed to read the response body as text.
    #[error("failed to read response body from {url}: {source}")]
    ResponseBody {
        url: String,
        source: reqwest::Error,
    },

    /// A CSS selector string could not be parsed.
    #[error("invalid CSS selector: {0}")]
    Selector(String),

    /// An expected HTML element was not found on the page.
    #[error("expected element not found: {context}")]
    ElementNotFound { context: &'static str },

    /// The page was served but is the site's "not found" page.
    #[error("page not found: {url}")]
    PageNotFound { url: String },

    /// The store failed a query or a transaction.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A structured blob could not be encoded or decoded.
    #[error("invalid json blob: {0}")]
    Json(#[from] serde_json::Error),

    /// The directory for the database file could not be created.
    #[error("failed to create store directory {path}: {source}")]
    StoreDir {
        path: String,
        source: std::io::Error,
    },

    /// A stored column held a value that does not map to the domain type.
    #[error("invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },
}

impl IngestError {
    /// Which layer is expected to recover from this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Http { .. }
            | IngestError::Timeout { .. }
            | IngestError::InvalidUrl { .. }
            | IngestError::UnexpectedStatus { .. }
            | IngestError::ResponseBody { .. } => ErrorKind::Network,
            IngestError::Selector(_)
            | IngestError::ElementNotFound { .. }
            | IngestError::PageNotFound { .. } => ErrorKind::Parse,
            IngestError::Database(_)
            | IngestError::Json(_)
            | IngestError::StoreDir { .. }
            | IngestError::InvalidColumn { .. } => ErrorKind::Persistence,
        }
    }
}

impl IngestError {
    /// Whether the upstream page does not exist, either as a real 404 or as
    /// the site's soft "not found" page.
    pub fn is_not_found(&self) -> bool {
        match self {
            IngestError::PageNotFound { .. } => true,
            IngestError::UnexpectedStatus { status, .. } => {
                *status == reqwest::StatusCode::NOT_FOUND
            }
            _ => false,
        }
    }
}

impl<'a> From<SelectorErrorKind<'a>> for IngestError {
    fn from(err: SelectorErrorKind<'a>) -> Self {
        IngestError::Selector(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let timeout = IngestError::Timeout {
            url: "https://www.vlr.gg/matches".to_string(),
        };
        assert_eq!(timeout.kind(), ErrorKind::Network);

        let missing = IngestError::ElementNotFound {
            context: "match header",
        };
        assert_eq!(missing.kind(), ErrorKind::Parse);

        let column = IngestError::InvalidColumn {
            column: "status",
            value: "paused".to_string(),
        };
        assert_eq!(column.kind(), ErrorKind::Persistence);
        assert_eq!(ErrorKind::Persistence.to_string(), "persistence");
    }

    #[test]
    fn test_is_not_found() {
        let soft = IngestError::PageNotFound {
            url: "https://www.vlr.gg/team/nope".to_string(),
        };
        assert!(soft.is_not_found());

        let hard = IngestError::UnexpectedStatus {
            url: "https://www.vlr.gg/team/nope".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        };
        assert!(hard.is_not_found());

        let server = IngestError::UnexpectedStatus {
            url: "https://www.vlr.gg/team/2".to_string(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert!(!server.is_not_found());
    }
}
