use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Timed out after {timeout_ms}ms waiting for {what} on {url}")]
    FetchTimeout {
        url: String,
        what: String,
        timeout_ms: u64,
    },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Browser could not be started: {0}")]
    BrowserLaunch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Missing data")]
    MissingFields,

    #[error("Already subscribed")]
    AlreadySubscribed,

    #[error("Event not found")]
    EventNotFound,

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),
}

impl ScraperError {
    /// Errors that only affect one source and leave the rest of a run intact.
    pub fn is_source_local(&self) -> bool {
        matches!(
            self,
            ScraperError::FetchTimeout { .. }
                | ScraperError::Navigation { .. }
                | ScraperError::Http(_)
        )
    }
}

impl From<rusqlite::Error> for ScraperError {
    fn from(e: rusqlite::Error) -> Self {
        ScraperError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
