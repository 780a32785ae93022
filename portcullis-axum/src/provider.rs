//! Collaborator trait for the protected OTP action.
//!
//! The limiter governs whether an attempt may proceed; actually generating,
//! delivering and checking codes belongs to whatever auth provider the
//! deployment uses. Implement [`OtpProvider`] over that provider's client.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to send verification code: {0}")]
    Send(String),

    #[error("Invalid or expired verification code")]
    Verify,
}

/// Request metadata forwarded to the provider for auditing.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

/// The OTP dispatch/verification collaborator guarded by the limiter.
#[async_trait]
pub trait OtpProvider: Send + Sync + 'static {
    /// Send a verification code to the given address.
    async fn send_code(&self, email: &str, meta: &DispatchContext) -> Result<(), ProviderError>;

    /// Verify a submitted code.
    ///
    /// # Returns
    ///
    /// The provider's payload for the verified identity, returned to the
    /// client as-is on success.
    async fn verify_code(
        &self,
        email: &str,
        token: &str,
    ) -> Result<serde_json::Value, ProviderError>;
}
