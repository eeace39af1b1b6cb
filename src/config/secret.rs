//! Credential handling for connection strings
//!
//! Secrets are wrapped in `secrecy::Secret`, which zeroizes the value on drop
//! and redacts it from `Debug` output. Callers must go through
//! `expose_secret()` to read it.
//!
//! ```rust
//! use corridor::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let url = secret_string("postgresql://user:pw@db/corridor".to_string());
//! assert!(url.expose_secret().as_str().starts_with("postgresql://"));
//! assert!(!format!("{url:?}").contains("pw"));
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// String payload that can live inside a `Secret`
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl SecretValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Connection string with the credential part replaced by `***`
    pub fn redacted_url(&self) -> String {
        match self.0.rsplit_once('@') {
            Some((prefix, host)) => {
                let scheme = prefix.split("://").next().unwrap_or("postgresql");
                format!("{scheme}://***@{host}")
            }
            None => self.0.clone(),
        }
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Secret string that is zeroized on drop and redacted in `Debug`
pub type SecretString = Secret<SecretValue>;

/// Wraps a plain string as a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("postgresql://corridor:hunter2@db:5432/open".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("hunter2"));
    }

    #[test]
    fn test_redacted_url() {
        let secret = secret_string("postgresql://corridor:hunter2@db:5432/open".to_string());
        let safe = secret.expose_secret().redacted_url();
        assert_eq!(safe, "postgresql://***@db:5432/open");
    }

    #[test]
    fn test_redacted_url_without_credentials() {
        let secret = secret_string("postgresql://localhost/open".to_string());
        assert_eq!(
            secret.expose_secret().redacted_url(),
            "postgresql://localhost/open"
        );
    }

    #[test]
    fn test_secret_deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Section {
            connection_string: SecretString,
        }

        let section: Section =
            toml::from_str("connection_string = \"postgres://a:b@c/d\"").unwrap();
        assert_eq!(
            section.connection_string.expose_secret().as_str(),
            "postgres://a:b@c/d"
        );
    }
}
