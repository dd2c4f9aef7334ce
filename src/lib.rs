// Mojo Session - Library root

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;

pub use error::{ApiError, Result};
pub use http_client::{Outcome, RequestDescriptor, SessionClient};
