use thiserror::Error;

/// Error types for eBird and BirdReport operations.
///
/// This enum covers network issues, authentication failures, markup that no
/// longer looks the way the scrapers expect, and the local files the jobs
/// read and write.
///
/// # Error Handling Examples
///
/// ```rust,no_run
/// use ebird_sync::{CredentialStore, EBirdClient, EBirdConfig, SyncError};
///
/// # tokio_test::block_on(async {
/// let store = CredentialStore::open("secrets.ini").unwrap();
/// let http = http_client::native::NativeClient::new();
/// let client = EBirdClient::from_store(Box::new(http), store, EBirdConfig::default()).unwrap();
///
/// match client.validate_or_refresh().await {
///     Ok(_) => println!("Session ready"),
///     Err(SyncError::Auth(msg)) => eprintln!("Login failed: {}", msg),
///     Err(SyncError::TokenNotFound) => eprintln!("CAS login page changed"),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # });
/// ```
#[derive(Error, Debug)]
pub enum SyncError {
    /// HTTP/network related errors.
    ///
    /// Connection failures and timeouts end up here.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A request could not be built or routed: bad URL, bad redirect target,
    /// redirect loop. Never retried.
    #[error("Request error: {0}")]
    Request(String),

    /// The server answered with a status the caller cannot use.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Final URL of the request
        url: String,
    },

    /// Authentication failures.
    ///
    /// # Common Causes
    /// - Invalid username/password
    /// - The CAS page stopped rendering the sign-out marker after login
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The CAS `execution` token was not found on the login page.
    #[error("Login token not found")]
    TokenNotFound,

    /// Failed to parse a page, export or API payload.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Missing or incomplete configuration file.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A REST endpoint accepted the request but reported a failure.
    #[error("API error: {0}")]
    Api(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<rust_xlsxwriter::XlsxError> for SyncError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        SyncError::Spreadsheet(e.to_string())
    }
}

impl From<calamine::Error> for SyncError {
    fn from(e: calamine::Error) -> Self {
        SyncError::Spreadsheet(e.to_string())
    }
}
