pub mod error;
pub mod feed;
pub mod http;
pub mod playlist;
pub mod reconcile;
pub mod sync;
pub mod token;

// Re-export main types for convenience
pub use error::{AuthError, FeedError, SyncError, TransportError};
pub use feed::{RadioFeed, Track, TrackSource};
pub use http::{ApiRequest, ApiResponse, HttpClient, ReqwestClient};
pub use playlist::{PlaylistApi, WebPlaylistApi};
pub use reconcile::{ReconcilePolicy, SyncResult, reconcile};
pub use sync::{SyncConfig, SyncOutcome, SyncService, SyncStatus};
pub use token::{AccessToken, Credentials, TokenManager};
