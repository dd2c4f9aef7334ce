// Authentication module
// Manages the session credential, single-flight refresh and teardown

mod coordinator;
mod credentials;
mod manager;
mod refresh;
mod store;
mod teardown;
mod types;

pub use coordinator::{RefreshCoordinator, RefreshResult};
pub use credentials::{CredentialSource, FileSource, MemorySource};
pub use manager::AuthManager;
pub use refresh::{DisabledRefresh, HttpRefresher, RefreshError, TokenRefresher};
pub use store::CredentialStore;
pub use teardown::SessionTeardown;
pub use types::{Credential, EndReason, SessionEnded};
