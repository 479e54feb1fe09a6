//! Provider CLI error classification
//!
//! Provider CLIs report failures as text on stderr. Azure prefixes the
//! message with an error code, either as `ERROR: (Code) message` or on a
//! separate `Code: Code` line. The code decides whether a failure is safe to
//! skip during cleanup, worth retrying, or fatal.

use thiserror::Error;

/// Provider failure categories for retry and cleanup logic
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Resource was not found (safe to skip in cleanup)
    #[error("Resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists
    #[error("Resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded")]
    Throttled,

    /// Another operation holds the resource (retryable)
    #[error("Another operation is in progress on the resource")]
    OperationInProgress,

    /// Subscription quota or regional capacity exhausted
    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// CLI is not logged in or the principal lacks permission
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// Anything else the CLI reported
    #[error("Provider CLI error: {message}")]
    Cli {
        code: Option<String>,
        message: String,
    },
}

impl ProviderError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Throttled | ProviderError::OperationInProgress
        )
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            ProviderError::AuthenticationFailed { .. } => {
                Some("Run 'az login' and check the active subscription with 'az account show'.".into())
            }
            ProviderError::QuotaExceeded { .. } => Some(
                "Request a quota increase for the subscription or choose another region or size."
                    .into(),
            ),
            ProviderError::Throttled => {
                Some("Provider rate limit hit. Deletes are retried automatically.".into())
            }
            ProviderError::Cli { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known Azure error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "ParentResourceNotFound",
    "NotFound",
];

/// Known Azure error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "ResourceExists",
    "ResourceAlreadyExists",
    "ServerNameAlreadyExists",
];

/// Known Azure error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "TooManyRequests",
    "SubscriptionRequestsThrottled",
    "TenantRequestsThrottled",
];

/// Known Azure error codes for conflicting in-flight operations
const IN_PROGRESS_CODES: &[&str] = &["AnotherOperationInProgress", "OperationInProgress"];

/// Known Azure error codes for quota and capacity exhaustion
const QUOTA_CODES: &[&str] = &[
    "QuotaExceeded",
    "OperationNotAllowed",
    "SkuNotAvailable",
    "AllocationFailed",
];

/// Known Azure error codes for authentication/authorization failures
const AUTH_CODES: &[&str] = &[
    "AuthorizationFailed",
    "AuthenticationFailed",
    "InvalidAuthenticationToken",
    "ExpiredAuthenticationToken",
];

/// Classify a failed provider CLI invocation from its stderr.
pub fn classify_cli_error(stderr: &str) -> ProviderError {
    let message = first_message_line(stderr);
    let code = extract_error_code(stderr);

    match code.as_deref() {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound { message },
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => ProviderError::AlreadyExists { message },
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled,
        Some(c) if IN_PROGRESS_CODES.contains(&c) => ProviderError::OperationInProgress,
        Some(c) if QUOTA_CODES.contains(&c) => ProviderError::QuotaExceeded { message },
        Some(c) if AUTH_CODES.contains(&c) => ProviderError::AuthenticationFailed { message },
        _ => classify_by_message(code, message),
    }
}

/// Fallback for CLI failures that carry no recognizable code
fn classify_by_message(code: Option<String>, message: String) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("could not be found") || lower.contains("was not found") {
        ProviderError::NotFound { message }
    } else if lower.contains("az login") {
        ProviderError::AuthenticationFailed { message }
    } else if lower.contains("too many requests") {
        ProviderError::Throttled
    } else {
        ProviderError::Cli { code, message }
    }
}

/// Extract an Azure error code from CLI stderr
fn extract_error_code(stderr: &str) -> Option<String> {
    for line in stderr.lines() {
        let line = line.trim();

        // `Code: ResourceNotFound`
        if let Some(rest) = line.strip_prefix("Code:") {
            let code = rest.trim();
            if is_code(code) {
                return Some(code.to_string());
            }
        }

        // `ERROR: (ResourceNotFound) The Resource ... was not found.`
        let rest = line.strip_prefix("ERROR:").unwrap_or(line).trim_start();
        if let Some(inner) = rest.strip_prefix('(') {
            if let Some(end) = inner.find(')') {
                let code = &inner[..end];
                if is_code(code) {
                    return Some(code.to_string());
                }
            }
        }
    }
    None
}

fn is_code(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
}

/// First non-empty stderr line without the CLI's `ERROR:` prefix
fn first_message_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.strip_prefix("ERROR:").unwrap_or(l).trim().to_string())
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "InvalidTemplateDeployment",
        "Check that the requested size and version are offered in this region.",
    ),
    (
        "LocationNotAvailableForResourceType",
        "Try a different location (--zone).",
    ),
    (
        "MissingSubscriptionRegistration",
        "Register the resource provider with 'az provider register'.",
    ),
];

/// Get a user-friendly suggestion for a known error code.
fn suggestion_for_code(code: &str) -> Option<String> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| (*s).to_string())
}
