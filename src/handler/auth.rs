use std::fmt;
use std::sync::Arc;

use subtle::ConstantTimeEq;

/// The proxy's own shared secret, compared against an envelope's `key`.
#[derive(Clone)]
pub struct SharedSecret(Arc<str>);

impl SharedSecret {
    pub fn new(secret: impl AsRef<str>) -> anyhow::Result<Self> {
        let secret = secret.as_ref();
        anyhow::ensure!(!secret.is_empty(), "The shared secret must not be empty.");
        Ok(SharedSecret(Arc::from(secret)))
    }

    /// Exact byte-for-byte equality, evaluated in constant time.
    pub(crate) fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_only_the_exact_secret() -> anyhow::Result<()> {
        let secret = SharedSecret::new("2355633")?;
        assert!(secret.matches("2355633"));
        assert!(!secret.matches("2355634"));
        assert!(!secret.matches("23556"));
        assert!(!secret.matches("2355633 "));
        assert!(!secret.matches(""));
        Ok(())
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(SharedSecret::new("").is_err());
    }

    #[test]
    fn debug_is_redacted() -> anyhow::Result<()> {
        let secret = SharedSecret::new("2355633")?;
        assert!(!format!("{secret:?}").contains("2355633"));
        Ok(())
    }
}
