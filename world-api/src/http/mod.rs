//! HTTP layer: Axum router, session middleware and handlers.
//!
//! `/ping`, `/signup` and `/login` are public; everything else sits behind
//! the session cookie check in [`auth::require_session`].

mod auth;
mod error;
mod extract;
mod handlers;
mod responses;
mod state;


pub use handlers::router;
pub use state::AppState;
