use std::fmt::{self, Debug};

/// A base64 encoded symmetric key.
///
/// The key is kept in its transport encoding; it is only decoded at the
/// moment something needs to be signed. `Debug` output never includes the
/// key material so configs holding a key can be traced freely.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(String);

impl SymmetricKey {
    /// Borrow the encoded key material
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl From<String> for SymmetricKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SymmetricKey {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_does_not_leak_key_material_in_debug_output() {
        let key = SymmetricKey::from("c2VjcmV0");
        let debug = format!("{key:?}");

        assert!(!debug.contains("c2VjcmV0"));
        assert_eq!(key.expose(), "c2VjcmV0");
    }
}
