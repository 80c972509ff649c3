//! Cloudflare Gateway list API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::NewItem;

/// Standard Cloudflare v4 response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

/// An entry of the envelope's `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A Gateway list.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayList {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Item kind (`SERIAL`, `URL`, `DOMAIN`, `EMAIL`, `IP`).
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A Gateway list item.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayListItem {
    pub value: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Body of `PATCH /gateway/lists/{id}`.
#[derive(Debug, Serialize)]
pub struct PatchListRequest<'a> {
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub append: &'a [NewItem],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    pub remove: &'a [String],
}

impl<'a> PatchListRequest<'a> {
    pub fn append(items: &'a [NewItem]) -> Self {
        Self {
            append: items,
            remove: &[],
        }
    }

    pub fn remove(values: &'a [String]) -> Self {
        Self {
            append: &[],
            remove: values,
        }
    }
}
