// Per-run secret vault
//
// Append-only mapping from opaque handle to secret value. Handles are random
// (UUID v4), never derived from the secret. The vault is not serializable and
// its Debug output never includes values. Entries live exactly as long as the
// owning RunContext; there is no enumeration or removal.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// Default prefix of every minted handle
pub const DEFAULT_HANDLE_PREFIX: &str = "secret_";

/// Vault value stored under a TOTP field handle; marks the field as a TOTP
pub const TOTP_LABEL: &str = "TOTP";

/// Suffix appended to a TOTP field handle to address the seed itself
pub const TOTP_VALUE_SUFFIX: &str = "_value";

/// Handle under which the seed of a TOTP field handle is stored
pub fn totp_value_handle(totp_handle: &str) -> String {
    format!("{totp_handle}{TOTP_VALUE_SUFFIX}")
}

/// A secret value that redacts itself in Debug output
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the cleartext. Call only at the point of use.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretString(***)")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Secret storage for one run
pub struct SecretVault {
    prefix: String,
    secrets: HashMap<String, SecretString>,
}

impl SecretVault {
    /// Create an empty vault using the default handle prefix
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_HANDLE_PREFIX)
    }

    /// Create an empty vault whose handles start with `prefix`
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            secrets: HashMap::new(),
        }
    }

    /// Store a secret under a fresh handle and return the handle
    pub fn mint(&mut self, value: impl Into<SecretString>) -> String {
        self.insert_fresh(None, value.into())
    }

    /// Like `mint`, with the field name appended to the handle
    /// (`secret_<uuid>_password`) so handles stay readable in payloads
    pub fn mint_field(&mut self, field: &str, value: impl Into<SecretString>) -> String {
        self.insert_fresh(Some(field), value.into())
    }

    /// Mint the two-handle TOTP indirection and return the field handle.
    ///
    /// The returned handle reveals to [`TOTP_LABEL`]; the derived handle from
    /// [`totp_value_handle`] reveals to the seed.
    pub fn mint_totp(&mut self, seed: impl Into<SecretString>) -> String {
        let handle = self.insert_fresh(Some("totp"), SecretString::from(TOTP_LABEL));
        self.secrets.insert(totp_value_handle(&handle), seed.into());
        handle
    }

    /// Resolve a handle to its secret. Anything that is not a minted handle,
    /// including non-string values, yields `None`.
    pub fn reveal(&self, handle_or_value: &Value) -> Option<&str> {
        handle_or_value.as_str().and_then(|s| self.reveal_str(s))
    }

    /// String form of [`SecretVault::reveal`]
    pub fn reveal_str(&self, handle: &str) -> Option<&str> {
        self.secrets.get(handle).map(SecretString::expose)
    }

    /// Whether the string is a handle known to this vault
    pub fn contains(&self, handle: &str) -> bool {
        self.secrets.contains_key(handle)
    }

    /// Number of stored entries (TOTP fields count twice)
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    fn insert_fresh(&mut self, field: Option<&str>, value: SecretString) -> String {
        loop {
            let handle = match field {
                Some(field) => format!("{}{}_{}", self.prefix, Uuid::new_v4(), field),
                None => format!("{}{}", self.prefix, Uuid::new_v4()),
            };
            if let Entry::Vacant(slot) = self.secrets.entry(handle.clone()) {
                slot.insert(value);
                return handle;
            }
        }
    }
}

impl Default for SecretVault {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault")
            .field("prefix", &self.prefix)
            .field("entries", &self.secrets.len())
            .finish()
    }
}
