use axum::http::HeaderMap;
use dashmap::DashMap;
use std::collections::HashMap;


/// Resolves an access token into a verified subject id.
///
/// Token issuance lives outside this service; implementations only answer
/// "who owns this token", or `None` when the token is unknown.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<String>;
}

/// Identity provider backed by a fixed token -> subject table
pub struct StaticTokenProvider {
    tokens: DashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
        }
    }

    /// Build from the `[auth.tokens]` config table
    pub fn from_tokens(tokens: &HashMap<String, String>) -> Self {
        let provider = Self::new();
        for (token, subject) in tokens {
            provider.insert(token, subject);
        }
        provider
    }

    pub fn insert(&self, token: &str, subject: &str) {
        self.tokens.insert(token.to_string(), subject.to_string());
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Default for StaticTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn resolve(&self, token: &str) -> Option<String> {
        self.tokens.get(token).map(|s| s.value().clone())
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    // Get Authorization header
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    // Parse "Bearer <token>" format
    parse_bearer_token(auth_header)
}

/// Resolve the subject behind a request's bearer token
pub fn authenticate_request(
    headers: &HeaderMap,
    identity: &dyn IdentityProvider,
) -> Result<String, TokenError> {
    let token = extract_bearer_token(headers)?;
    identity.resolve(&token).ok_or(TokenError::Unknown)
}

/// Parse bearer token from Authorization header value
///
/// Internal helper for extract_bearer_token
fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    // Expect "Bearer <token>"
    let parts: Vec<&str> = header_value.splitn(2, ' ').collect();

    if parts.len() != 2 {
        return Err(TokenError::InvalidFormat);
    }

    // Check scheme is "Bearer"
    if parts[0].to_lowercase() != "bearer" {
        return Err(TokenError::InvalidFormat);
    }

    let token = parts[1].trim();

    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header or token parameter not present
    Missing,
    /// Invalid format (not "Bearer <token>")
    InvalidFormat,
    /// Token is empty string
    Empty,
    /// Token is well-formed but no subject owns it
    Unknown,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
            TokenError::Unknown => write!(f, "Authorization token not recognized"),
        }
    }
}

impl std::error::Error for TokenError {}
