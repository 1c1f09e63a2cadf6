//! Request payload types and the enum-like constants of the API.
//!
//! # Design
//! Resource clients accept any `Serialize` payload, so a plain
//! `serde_json::Value` works as well as the typed structs below. The
//! structs cover the bulk member endpoints, whose shape is fixed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::query::build_query;

/// How a request body is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    Json,
    #[default]
    Form,
}

impl ContentType {
    /// The `Content-Type` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Form => "application/x-www-form-urlencoded",
        }
    }

    pub fn format_body(&self, data: &Value) -> Result<String, Error> {
        match self {
            ContentType::Json => serde_json::to_string(data).map_err(|e| Error::Encode(e.to_string())),
            ContentType::Form => Ok(build_query(data)),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode of the deprecated bulk member endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkMode {
    Add,
    AddAndEdit,
    Edit,
}

impl BulkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkMode::Add => "add",
            BulkMode::AddAndEdit => "add_and_edit",
            BulkMode::Edit => "edit",
        }
    }
}

/// Actions applied by a member sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Add,
    Update,
    /// Unsubscribe every member of the list not present in the payload.
    UnsubscribeExcluded,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Add => "add",
            SyncAction::Update => "update",
            SyncAction::UnsubscribeExcluded => "unsubscribe_excluded",
        }
    }
}

/// Payload for `ListApi::add_or_update_members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkMembers {
    pub mode: BulkMode,
    pub members: Vec<Value>,
}

/// Payload for `ListApi::sync_members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMembers {
    pub actions: Vec<SyncAction>,
    pub members: Vec<Value>,
}
