//! Configuration surface descriptors.
//!
//! Providers describe their options as data; rendering is left to the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value type of a single setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKind {
    /// Free-form text.
    Text,
    /// Text that must be masked when displayed (tokens, passwords).
    Secret,
    /// Filesystem path.
    Path,
    /// On/off toggle.
    Bool,
    /// Whole number.
    Integer,
}

/// One configurable option of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingField {
    /// Key in the provider's options object.
    pub key: String,
    /// Short human-readable label.
    pub label: String,
    /// Longer help text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: SettingKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
}

impl SettingField {
    /// Create an optional field with no default.
    pub fn new(key: impl Into<String>, label: impl Into<String>, kind: SettingKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            description: None,
            kind,
            default: None,
            required: false,
        }
    }

    /// Set help text.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set default value.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Check that `value` has the JSON shape this field expects.
    pub fn accepts(&self, value: &Value) -> bool {
        match self.kind {
            SettingKind::Text | SettingKind::Secret | SettingKind::Path => value.is_string(),
            SettingKind::Bool => value.is_boolean(),
            SettingKind::Integer => value.is_i64() || value.is_u64(),
        }
    }
}

/// Settings surface returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsDescriptor {
    /// Name of the provider this descriptor belongs to.
    pub provider: String,
    /// Section title shown by the host.
    pub title: String,
    pub fields: Vec<SettingField>,
}

impl SettingsDescriptor {
    /// Create a descriptor with no fields.
    pub fn empty(provider: impl Into<String>) -> Self {
        let provider = provider.into();
        Self {
            title: provider.clone(),
            provider,
            fields: Vec::new(),
        }
    }

    /// Set the section title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Append a field.
    pub fn with_field(mut self, field: SettingField) -> Self {
        self.fields.push(field);
        self
    }

    /// Whether the provider has anything to configure.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&SettingField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Check an options object against this descriptor.
    ///
    /// Returns the keys of required fields that are missing and of present
    /// fields whose value has the wrong type.
    pub fn invalid_keys(&self, options: &Value) -> Vec<String> {
        self.fields
            .iter()
            .filter(|field| match options.get(&field.key) {
                Some(value) => !field.accepts(value),
                None => field.required,
            })
            .map(|field| field.key.clone())
            .collect()
    }
}
