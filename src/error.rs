use thiserror::Error;

/// Errors from the HTTP transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request to {url} failed: {source}")]
    RequestFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the access-token lifecycle. Fatal for the current sync run.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No refresh token configured; run the authorization bootstrap first")]
    MissingRefreshToken,

    #[error("Token refresh rejected with status {status}")]
    RefreshRejected { status: u16 },

    #[error("Malformed token response: {0}")]
    InvalidTokenResponse(#[from] serde_json::Error),

    #[error("Access token rejected twice in a row; refresh credential is likely invalid")]
    TokenRejected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors when fetching or parsing the station feed
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Failed to fetch station feed: {0}")]
    Fetch(#[from] TransportError),

    #[error("Station feed returned status {status}")]
    BadStatus { status: u16 },

    #[error("Malformed station feed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

/// Top-level errors for a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Feed failure: {0}")]
    Feed(#[from] FeedError),
}
