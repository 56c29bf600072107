use crate::pages::StrategyFailure;
use thiserror::Error;

/// Error type shared by every fallible operation in the crate.
///
/// Fetch-level failures are split into transient and permanent variants so
/// the retry logic in the fetch client can decide locally; everything else
/// propagates to the run level.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem operation failed (mirror reads, asset writes).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection-level HTTP failure (DNS, reset, TLS).
    #[error("network error: {0}")]
    Network(reqwest::Error),

    /// Server answered with a non-success status.
    #[error("http status {status} for {url}")]
    Http { status: u16, url: String },

    /// A request or the whole run exceeded its time budget.
    #[error("timed out: {0}")]
    Timeout(String),

    /// WebDriver session failure while rendering a page.
    #[error("browser error: {0}")]
    Browser(String),

    /// Content could not be parsed (sitemap XML, unusable page body).
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Repository mirror could not be created or read.
    #[error("repository error: {0}")]
    Repository(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Every strategy in the chain failed; carries one reason per attempt.
    #[error("all strategies failed: {}", render_failures(.0))]
    AllStrategiesFailed(Vec<StrategyFailure>),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err)
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for Error {
    fn from(err: fantoccini::error::CmdError) -> Self {
        Self::Browser(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for Error {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        Self::Browser(err.to_string())
    }
}

impl Error {
    /// Whether a retry might succeed.
    ///
    /// Timeouts, connection failures, 5xx responses and lost browser
    /// sessions are worth another attempt; 4xx responses and parse
    /// failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Browser(_) => true,
            Self::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Http { status, .. } => *status >= 500,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

fn render_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.strategy, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
