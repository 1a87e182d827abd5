use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::query::{Filter, Patch, Row, SelectQuery, StoreEvent, Table};

/// Errors surfaced by the platform seam.
///
/// `Display` text is what the client shows for store failures, so keep it
/// self-contained.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlatformError {
    /// Credentials or recovery token were rejected.
    #[error("invalid email or password")]
    InvalidCredentials,
    /// The access token no longer maps to a session.
    #[error("auth session is expired or unknown")]
    SessionExpired,
    /// A write collided with existing data.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The platform could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The platform reached but failed internally.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Session material returned by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    /// Opaque token identifying the session on later calls.
    pub access_token: String,
    /// Authenticated user ID; equals the profile ID.
    pub user_id: String,
}

/// Authentication surface of the platform.
///
/// Object-safe so the runtime can hold `Arc<dyn AuthApi>` and tests can
/// swap implementations.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a session.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, PlatformError>;

    /// Invalidate a session.
    async fn sign_out(&self, access_token: &str) -> Result<(), PlatformError>;

    /// User ID behind a token, or `None` when the session is gone.
    async fn current_user(&self, access_token: &str) -> Result<Option<String>, PlatformError>;

    /// Request a password-reset email.
    ///
    /// Always succeeds for unknown addresses so the call does not reveal
    /// which accounts exist.
    async fn reset_password(&self, email: &str) -> Result<(), PlatformError>;

    /// Redeem a single-use recovery token into a session.
    async fn recover_session(&self, recovery_token: &str) -> Result<AuthSession, PlatformError>;

    /// Change the password of the session's account.
    async fn update_password(
        &self,
        access_token: &str,
        new_password: &str,
    ) -> Result<(), PlatformError>;
}

/// Data surface of the platform: named collections with generic reads,
/// writes, and per-table change feeds.
#[async_trait]
pub trait StoreApi: Send + Sync {
    /// Run a filtered, ordered, limited read.
    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, PlatformError>;

    /// Store a new row; blank IDs and zero timestamps are filled in.
    /// Returns the stored row.
    async fn insert(&self, row: Row) -> Result<Row, PlatformError>;

    /// Patch every row matching the filters; returns how many changed.
    async fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Patch,
    ) -> Result<u64, PlatformError>;

    /// Subscribe to the change feed of one collection.
    fn subscribe(&self, table: Table) -> broadcast::Receiver<StoreEvent>;
}
