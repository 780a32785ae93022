use serde::{Deserialize, Serialize};

/// The protected actions behind the OTP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpAction {
    Send,
    Verify,
}

/// Inbound request body for the OTP endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OtpRequest {
    pub email: String,
    pub action: OtpAction,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "clientIP")]
    pub client_ip: Option<String>,
    #[serde(default, rename = "userAgent")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    /// Provider payload for the verified identity (user, session, …).
    pub session: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Connection metadata recovered from transport headers.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// What to do when the attempt log itself is unreachable.
///
/// `FailOpen` lets the protected action proceed and logs the gap, matching
/// the original production behavior. `FailClosed` denies with 503 instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}
