//! Error types for the watcher core
//!
//! Failures that drive control flow (block pages, fetch outcomes, store
//! write results) are tagged values the caller branches on, not panics.

use std::fmt;

/// Persistence error variants
#[derive(Debug)]
pub enum StoreError {
    /// Free disk space below the pre-flight threshold
    InsufficientStorage { available_mb: u64 },

    /// File operation failed
    Io { path: String, reason: String },

    /// Store document could not be encoded or decoded
    Serialization { reason: String },
}

/// Fetch gateway error variants
///
/// These render into the `error` field of a `FetchResult`; the patrol and
/// tests branch on the rendered text.
#[derive(Debug)]
pub enum FetchError {
    /// Circuit breaker is open for this key
    CircuitOpen { key: String },

    /// robots.txt forbids fetching this URL
    RobotsDisallow { url: String },

    /// The hard deadline elapsed before the transport finished
    HardTimeout { url: String, seconds: u64 },

    /// Transport-level failure (connect, TLS, body read)
    Transport { url: String, reason: String },
}

/// Fingerprinting error variants
#[derive(Debug)]
pub enum FingerprintError {
    /// The document is an anti-bot wall, not real content
    BlockPage,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::InsufficientStorage { available_mb } => {
                write!(f, "Insufficient storage: {} MB free", available_mb)
            }
            StoreError::Io { path, reason } => {
                write!(f, "I/O failure on '{}': {}", path, reason)
            }
            StoreError::Serialization { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::CircuitOpen { key } => {
                write!(f, "Circuit Open: cooldown active for {}", key)
            }
            FetchError::RobotsDisallow { url } => {
                write!(f, "Blocked by Robots.txt directive for {}", url)
            }
            FetchError::HardTimeout { url, seconds } => {
                write!(f, "Hard Timeout ({}s) exceeded for {}", seconds, url)
            }
            FetchError::Transport { url, reason } => {
                write!(f, "Fetch failed for {}: {}", url, reason)
            }
        }
    }
}

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintError::BlockPage => write!(f, "Bot protection detected"),
        }
    }
}

impl std::error::Error for StoreError {}
impl std::error::Error for FetchError {}
impl std::error::Error for FingerprintError {}
