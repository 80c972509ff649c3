//! Kandji API data types.

use serde::{Deserialize, Deserializer};

/// Kandji device - fields we need from the device list response.
///
/// Only the fields the filter needs are declared, and every one of them
/// tolerates `null`, so schema drift on the Kandji side does not break a pass.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KandjiDevice {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    /// `Mac`, `iPhone`, `iPad`, `AppleTV`, ...
    #[serde(default)]
    pub platform: Option<String>,
    /// Assigned user; Kandji sends an empty string when nobody is assigned.
    #[serde(default)]
    pub user: KandjiUserField,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub blueprint_id: Option<String>,
    #[serde(default)]
    pub blueprint_name: Option<String>,
}

/// Assigned user of a device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KandjiUser {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The `user` field is either an object or an empty string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum KandjiUserField {
    User(KandjiUser),
    Other(serde_json::Value),
}

impl Default for KandjiUserField {
    fn default() -> Self {
        Self::Other(serde_json::Value::Null)
    }
}

impl KandjiUserField {
    /// Email of the assigned user, or an empty string.
    pub fn email(&self) -> &str {
        match self {
            Self::User(user) => user.email.as_deref().unwrap_or_default().trim(),
            Self::Other(_) => "",
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
