//! Username validation.
//!
//! Usernames are used verbatim as KV keys, so they are held to a small set of
//! rules:
//! - Must be non-empty
//! - Must be at most [`MAX_USERNAME_LEN`] bytes
//! - Must not contain whitespace or control characters
//! - Must not contain `/`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};

/// Maximum username length in bytes.
pub const MAX_USERNAME_LEN: usize = 255;

/// Characters that are forbidden anywhere in a username, beyond whitespace
/// and control characters.
const FORBIDDEN_CHARS: &[char] = &['/'];

/// Validate a username, returning `Ok(())` if it can be used as a key.
///
/// # Examples
///
/// ```
/// use garuda_types::names::validate_username;
///
/// assert!(validate_username("alice").is_ok());
/// assert!(validate_username("bob_99").is_ok());
/// assert!(validate_username("").is_err());
/// assert!(validate_username("two words").is_err());
/// ```
pub fn validate_username(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "username must not be empty"));
    }

    if name.len() > MAX_USERNAME_LEN {
        return Err(invalid(
            name,
            &format!("longer than {MAX_USERNAME_LEN} bytes"),
        ));
    }

    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return Err(invalid(name, &format!("contains forbidden character: {ch:?}")));
    }

    Ok(())
}

fn invalid(name: &str, reason: &str) -> RecordError {
    RecordError::InvalidUsername {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// A validated username.
///
/// The username is both the KV key of a record and an embedded field of it.
/// Deserialization re-validates, so a malformed stored name surfaces as a
/// decode error instead of an unusable value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    /// Validate and wrap a username.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_username(&name)?;
        Ok(Self(name))
    }

    /// The username as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The raw KV key for this user's record.
    pub fn as_key(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Consume the wrapper and return the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Username {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Username {
    type Error = RecordError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Username {
    type Error = RecordError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

impl PartialEq<str> for Username {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Username {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
