use serde::{Deserialize, Serialize};

/// Signup/login body. Missing fields deserialize as empty strings so they
/// fail the emptiness check instead of the body binding.
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialsRequest {
    pub fn is_incomplete(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::CredentialsRequest;

    #[test]
    fn credentials_require_both_fields() {
        let complete = CredentialsRequest {
            username: String::from("alice"),
            password: String::from("pw1"),
        };
        assert!(!complete.is_incomplete());

        let missing_password = CredentialsRequest {
            username: String::from("alice"),
            ..Default::default()
        };
        assert!(missing_password.is_incomplete());
        assert!(CredentialsRequest::default().is_incomplete());
    }
}
