use std::fmt;

/// Identifies the application instance that owns a set of fingerprints.
///
/// Several instances may share one database; every row is scoped by this id.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a stable id from the instance's identity key material (for
    /// example its public key), as a BLAKE3 hex digest.
    pub fn from_identity(key: &[u8]) -> Self {
        Self(blake3::hash(key).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_derivation_is_stable() {
        let a = InstanceId::from_identity(b"-----BEGIN PUBLIC KEY----- one");
        let b = InstanceId::from_identity(b"-----BEGIN PUBLIC KEY----- one");
        let c = InstanceId::from_identity(b"-----BEGIN PUBLIC KEY----- two");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }
}
