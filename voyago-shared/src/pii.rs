use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for contact data (emails, phone numbers) that hides the value in
/// Debug/Display output so it cannot leak through log macros. Serialization
/// passes the real value through: API responses and persistence need it.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<masked>")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<masked>")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn inner(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let email = Masked("traveler@example.com".to_string());
        assert_eq!(format!("{:?}", email), "<masked>");
        assert_eq!(format!("{}", email), "<masked>");
        assert_eq!(email.inner(), "traveler@example.com");
    }

    #[test]
    fn serialization_passes_through() {
        let email = Masked("traveler@example.com".to_string());
        let json = serde_json::to_string(&email).unwrap();
        assert_eq!(json, "\"traveler@example.com\"");
    }
}
