use crate::config::EmailPolicy;
use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Lazy-loaded email validation regex
///
/// This regex validates email addresses according to a practical subset of RFC 5322.
/// It's loaded once at runtime and reused for all email validation operations.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Validates the syntax of an email address
///
/// # Arguments
///
/// * `email` - The email address to validate
///
/// # Returns
///
/// Returns `Ok(())` if the email is valid, or a `ValidationError::InvalidEmail` if invalid.
///
/// # Examples
///
/// ```rust
/// use portcullis_core::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid-email").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(format!(
            "Invalid email format: {email}"
        )))
    }
}

/// Validates an email address against a domain allow/block policy
///
/// Runs the syntactic check first, then applies the policy: a domain
/// ending in one of the allowed suffixes is accepted without consulting
/// the blocklist, a blocklisted domain is rejected, and any other domain
/// is accepted.
///
/// # Examples
///
/// ```rust
/// use portcullis_core::config::EmailPolicy;
/// use portcullis_core::validation::validate_email_domain;
///
/// let policy = EmailPolicy::default();
/// assert!(validate_email_domain("user@praxis.ch", &policy).is_ok());
/// assert!(validate_email_domain("user@test.com", &policy).is_err());
/// assert!(validate_email_domain("user@gmail.com", &policy).is_ok());
/// ```
pub fn validate_email_domain(email: &str, policy: &EmailPolicy) -> Result<(), ValidationError> {
    validate_email(email)?;

    let domain = email
        .rsplit('@')
        .next()
        .map(|d| d.to_ascii_lowercase())
        .ok_or_else(|| ValidationError::InvalidEmail(format!("Invalid email format: {email}")))?;

    if policy
        .allowed_suffixes
        .iter()
        .any(|suffix| domain.ends_with(suffix.as_str()))
    {
        return Ok(());
    }

    if policy.blocked_domains.iter().any(|d| d == &domain) {
        return Err(ValidationError::BlockedDomain(domain));
    }

    Ok(())
}
