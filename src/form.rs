//! Parsed form model supplied by the external structure parser.
//!
//! The core never parses view hierarchies or DOM itself; it only consumes
//! these values and, in the trigger resolver, synthesizes recovery items.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque platform identifier of one form field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(pub String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        FieldId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FieldId {
    fn from(value: &str) -> Self {
        FieldId(value.to_string())
    }
}

impl From<String> for FieldId {
    fn from(value: String) -> Self {
        FieldId(value)
    }
}

/// Semantic role the parser assigned to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldHint {
    Username,
    Password,
    NewPassword,
    EmailAddress,
    PhoneNumber,
    SearchField,
    CreditCardNumber,
    CreditCardExpirationDate,
    CreditCardSecurityCode,
    CreditCardHolderName,
    PostalAddress,
    PostalCode,
    PersonName,
    OtpCode,
    Unknown,
}

impl FieldHint {
    /// Username-like roles (`USERNAME`, `EMAIL_ADDRESS`).
    pub fn is_username(self) -> bool {
        matches!(self, FieldHint::Username | FieldHint::EmailAddress)
    }

    /// Password-like roles (`PASSWORD`, `NEW_PASSWORD`).
    pub fn is_password(self) -> bool {
        matches!(self, FieldHint::Password | FieldHint::NewPassword)
    }

    /// Roles a stored login can fill.
    pub fn is_credential(self) -> bool {
        self.is_username() || self.is_password()
    }
}

/// Parser confidence tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Accuracy {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

/// One detected form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub id: FieldId,
    pub hint: FieldHint,
    pub accuracy: Accuracy,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub is_focused: bool,
    #[serde(default = "default_visible")]
    pub is_visible: bool,
    #[serde(default)]
    pub traversal_index: i32,
}

fn default_visible() -> bool {
    true
}

impl ParsedItem {
    pub fn new(id: impl Into<FieldId>, hint: FieldHint, accuracy: Accuracy) -> Self {
        Self {
            id: id.into(),
            hint,
            accuracy,
            value: None,
            is_focused: false,
            is_visible: true,
            traversal_index: 0,
        }
    }

    pub fn focused(mut self) -> Self {
        self.is_focused = true;
        self
    }

    pub fn at_index(mut self, traversal_index: i32) -> Self {
        self.traversal_index = traversal_index;
        self
    }
}

/// The full parsed form for one OS callback.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedStructure {
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub web_scheme: Option<String>,
    #[serde(default)]
    pub web_domain: Option<String>,
    #[serde(default)]
    pub web_view: bool,
    pub items: Vec<ParsedItem>,
}

impl ParsedStructure {
    pub fn new(items: Vec<ParsedItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Copy of this structure with a different item list.
    pub fn with_items(&self, items: Vec<ParsedItem>) -> Self {
        Self {
            application_id: self.application_id.clone(),
            web_scheme: self.web_scheme.clone(),
            web_domain: self.web_domain.clone(),
            web_view: self.web_view,
            items,
        }
    }

    /// Items a stored login can fill, in structure order.
    pub fn credential_targets(&self) -> Vec<ParsedItem> {
        self.items
            .iter()
            .filter(|item| item.hint.is_credential())
            .cloned()
            .collect()
    }
}
