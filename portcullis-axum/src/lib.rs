//! # Portcullis Axum Integration
//!
//! This crate provides the HTTP boundary for the portcullis rate limiter:
//! a single `POST /otp` endpoint that gates OTP send/verify actions behind
//! the dual-key limiter, plus a health route and permissive CORS for
//! browser clients.
//!
//! The endpoint contract:
//!
//! - **Inbound**: JSON `{ email, action: "send" | "verify", token?,
//!   clientIP?, userAgent? }`. The client IP falls back to
//!   `x-forwarded-for`, then `x-real-ip`, then the literal `"unknown"`.
//! - **Denied**: HTTP 429 with `{ error, blocked_until, retry_after }` and
//!   a `Retry-After` header.
//! - **Allowed but failed downstream**: 400 (validation, bad code) or 500
//!   (delivery failure), with the failure recorded against both keys.
//! - **Success**: 200 with an action-specific payload.
//!
//! Code generation and delivery live behind the [`OtpProvider`] trait;
//! this crate ships no concrete provider.
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use portcullis::Portcullis;
//! use portcullis_axum::{OtpState, FailurePolicy, create_router};
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = portcullis_storage_sqlite::connect("sqlite:attempts.db").await.unwrap();
//!     let state = OtpState {
//!         portcullis: Arc::new(Portcullis::new(Arc::new(log))),
//!         provider: Arc::new(MyAuthProvider::new()),
//!         failure_policy: FailurePolicy::FailOpen,
//!     };
//!
//!     let app = create_router(state);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod error;
mod extractors;
mod provider;
mod routes;
mod types;

pub use error::{ApiError, Result};
pub use provider::{DispatchContext, OtpProvider, ProviderError};
pub use routes::{OtpState, create_router};
pub use types::{
    ConnectionInfo, FailurePolicy, HealthResponse, MessageResponse, OtpAction, OtpRequest,
    VerifyResponse,
};
