//! Provider bearer token pool
//!
//! Tokens are handed out round-robin so every token carries an equal share
//! of the requests. The pool is built once at startup and never changes.

use crate::core::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct CredentialPool {
    tokens: Vec<SecretString>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Builds the pool.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no tokens are given or a token is blank.
    pub fn new<I>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let tokens = tokens
            .into_iter()
            .map(|token| {
                let token = token.trim().to_string();
                if token.is_empty() {
                    Err(Error::Config("credential list contains a blank token".to_string()))
                } else {
                    Ok(SecretString::from(token))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        if tokens.is_empty() {
            return Err(Error::Config("credential list is empty".to_string()));
        }

        Ok(Self {
            tokens,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Next token in rotation
    pub fn next_token(&self) -> &SecretString {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.tokens.len();
        &self.tokens[index]
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Short, stable identifier of a token for logs.
///
/// First 8 hex characters of the SHA-256 of the token.
pub fn fingerprint(token: &SecretString) -> String {
    let digest = Sha256::digest(token.expose_secret().as_bytes());
    format!("{digest:x}")[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool(tokens: &[&str]) -> Result<CredentialPool> {
        CredentialPool::new(tokens.iter().map(|t| (*t).to_string()))
    }

    #[test]
    fn test_rejects_empty_pool() {
        assert!(matches!(pool(&[]), Err(Error::Config(_))));
        assert!(matches!(pool(&["ok", "  "]), Err(Error::Config(_))));
    }

    #[test]
    fn test_single_token_pool() {
        let pool = pool(&["only"]).unwrap();
        for _ in 0..5 {
            assert_eq!(pool.next_token().expose_secret(), "only");
        }
    }

    #[test]
    fn test_round_robin_does_not_starve() {
        let pool = pool(&["a", "b", "c"]).unwrap();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..300 {
            *counts.entry(pool.next_token().expose_secret().to_string()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 100));
    }

    #[test]
    fn test_debug_does_not_leak_tokens() {
        let pool = pool(&["super-secret-token"]).unwrap();
        assert!(!format!("{pool:?}").contains("super-secret-token"));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let token = SecretString::from("abc".to_string());
        assert_eq!(fingerprint(&token), fingerprint(&token));
        assert_eq!(fingerprint(&token).len(), 8);
        assert_ne!(fingerprint(&token), fingerprint(&SecretString::from("abd".to_string())));
    }
}
