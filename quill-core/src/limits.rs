//! Request limits.
//!
//! Following TigerStyle: put limits on everything.
//! Every request shape accepted at the boundary has an explicit maximum so a
//! single malformed client cannot make a node allocate without bound.

use crate::types::LogKey;

/// Limits applied to inbound requests before they are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum number of keys in one poll, commit or list request.
    pub max_keys_per_request: u32,
    /// Maximum length of a log key in bytes.
    pub max_key_bytes: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_keys_per_request: 10_000,
            max_key_bytes: 1024,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_keys_per_request == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_keys_per_request",
                reason: "must be positive",
            });
        }
        if self.max_key_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_key_bytes",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Checks a single key against the limits.
    ///
    /// # Errors
    /// Returns an error if the key is empty or too long.
    pub fn check_key(&self, key: &LogKey) -> crate::Result<()> {
        if key.is_empty() {
            return Err(crate::Error::InvalidArgument {
                name: "key",
                reason: "must not be empty",
            });
        }
        if key.len() > self.max_key_bytes as usize {
            return Err(crate::Error::LimitExceeded {
                limit: "max_key_bytes",
                max: u64::from(self.max_key_bytes),
                actual: key.len() as u64,
            });
        }
        Ok(())
    }

    /// Checks every key of a multi-key request against the limits.
    ///
    /// # Errors
    /// Returns an error if there are too many keys or any key is invalid.
    pub fn check_keys<'a, I>(&self, keys: I) -> crate::Result<()>
    where
        I: IntoIterator<Item = &'a LogKey>,
    {
        let mut count: u64 = 0;
        for key in keys {
            count += 1;
            if count > u64::from(self.max_keys_per_request) {
                return Err(crate::Error::LimitExceeded {
                    limit: "max_keys_per_request",
                    max: u64::from(self.max_keys_per_request),
                    actual: count,
                });
            }
            self.check_key(key)?;
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
