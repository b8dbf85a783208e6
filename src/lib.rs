/// Aurora authgate - authenticated-request validation
///
/// Turns a bearer token into an authorized principal: verifies the token,
/// resolves its session through tiered caches in front of the session store,
/// applies account checks, and tracks activity. Also carries the
/// progressive login lockout used by the login flow.

pub mod activity;
pub mod auth;
pub mod authenticator;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod gate;
pub mod jobs;
pub mod lockout;
pub mod metrics;
pub mod resolver;
pub mod server;
pub mod store;
pub mod token;

pub use authenticator::{Authenticator, Principal};
pub use error::{GateError, GateResult, UnauthorizedReason};
