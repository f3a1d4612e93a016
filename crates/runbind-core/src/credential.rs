// Credential entities
//
// Credentials are fetched from a CredentialStore, never owned by a run. Secret
// rows deserialize (fixtures, stores) but do not serialize, and their Debug
// output is redacted.

use serde::{Deserialize, Serialize};

/// Organization that owns credentials and runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub organization_id: String,
    #[serde(default)]
    pub organization_name: Option<String>,
}

impl Organization {
    pub fn new(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            organization_name: None,
        }
    }
}

/// Shape of the secret behind a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    Password,
    CreditCard,
    /// Any kind this engine cannot resolve
    #[serde(other)]
    Unsupported,
}

/// Credential metadata row (no secret material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub credential_id: String,
    pub organization_id: String,
    pub name: String,
    pub credential_type: CredentialType,
}

impl Credential {
    pub fn new(
        credential_id: impl Into<String>,
        organization_id: impl Into<String>,
        name: impl Into<String>,
        credential_type: CredentialType,
    ) -> Self {
        Self {
            credential_id: credential_id.into(),
            organization_id: organization_id.into(),
            name: name.into(),
            credential_type,
        }
    }
}

/// Secret half of a password credential
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PasswordSecret {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub totp: Option<String>,
}

impl PasswordSecret {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            totp: None,
        }
    }

    pub fn with_totp(mut self, totp: impl Into<String>) -> Self {
        self.totp = Some(totp.into());
        self
    }
}

impl std::fmt::Debug for PasswordSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordSecret")
            .field("username", &"***")
            .field("password", &"***")
            .field("has_totp", &self.totp.is_some())
            .finish()
    }
}

/// Secret half of a credit card credential
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CreditCardSecret {
    pub card_number: String,
    pub card_cvv: String,
    pub card_exp_month: String,
    pub card_exp_year: String,
    pub card_brand: String,
    pub card_holder_name: String,
}

impl CreditCardSecret {
    /// Field names in the order they are exposed in a resolved field-map
    pub const FIELDS: [&'static str; 6] = [
        "card_number",
        "card_cvv",
        "card_exp_month",
        "card_exp_year",
        "card_brand",
        "card_holder_name",
    ];

    /// Field values paired with their names, in [`CreditCardSecret::FIELDS`] order
    pub fn fields(&self) -> [(&'static str, &str); 6] {
        [
            (Self::FIELDS[0], self.card_number.as_str()),
            (Self::FIELDS[1], self.card_cvv.as_str()),
            (Self::FIELDS[2], self.card_exp_month.as_str()),
            (Self::FIELDS[3], self.card_exp_year.as_str()),
            (Self::FIELDS[4], self.card_brand.as_str()),
            (Self::FIELDS[5], self.card_holder_name.as_str()),
        ]
    }
}

impl std::fmt::Debug for CreditCardSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditCardSecret")
            .field("card_brand", &self.card_brand)
            .field("card_number", &"***")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_credential_type_is_unsupported() {
        let credential: Credential = serde_json::from_value(json!({
            "credential_id": "cred_1",
            "organization_id": "o_1",
            "name": "ssh",
            "credential_type": "ssh_key"
        }))
        .unwrap();
        assert_eq!(credential.credential_type, CredentialType::Unsupported);
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = PasswordSecret::new("alice", "hunter2").with_totp("JBSWY3DPEHPK3PXP");
        let printed = format!("{:?}", secret);
        assert!(!printed.contains("alice"));
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("JBSWY3DPEHPK3PXP"));
        assert!(printed.contains("has_totp: true"));
    }

    #[test]
    fn test_credit_card_fields_order() {
        let card = CreditCardSecret {
            card_number: "4242424242424242".into(),
            card_cvv: "123".into(),
            card_exp_month: "12".into(),
            card_exp_year: "2030".into(),
            card_brand: "visa".into(),
            card_holder_name: "Alice Doe".into(),
        };
        let names: Vec<_> = card.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, CreditCardSecret::FIELDS);
        assert_eq!(card.fields()[1].1, "123");
        assert!(!format!("{:?}", card).contains("4242"));
    }
}
