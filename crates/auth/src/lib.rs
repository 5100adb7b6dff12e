//! Session management for Bluesky bots
//!
//! This crate owns the access/refresh token pair of one account and keeps it
//! valid: every installed session schedules a background refresh shortly
//! before the access token expires, refreshes are serialized, and a failed
//! refresh falls back to a full login.
//!
//! The remote login and refresh calls are consumed through [`SessionApi`], so
//! the manager itself does no I/O.

mod api;
mod config;
mod error;
pub mod jwt;
mod manager;
mod session;

pub use api::{Clock, SessionApi, SystemClock};
pub use config::{AuthOptions, Credentials, APPKEY_ENV, HANDLE_ENV};
pub use error::AuthError;
pub use manager::{AuthManager, AuthState, RefreshOutcome};
pub use session::{Session, SessionTokens};
