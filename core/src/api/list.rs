use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::api::payload;
use crate::error::Error;
use crate::pipeline::{Pipeline, Resource};
use crate::types::{BulkMembers, SyncMembers};

#[derive(Debug, Clone, Copy)]
pub struct ListApi<'a> {
    resource: Resource<'a>,
}

impl<'a> ListApi<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self {
            resource: Resource::new("list", pipeline),
        }
    }

    pub fn get(&self, list_id: &str) -> Result<Value, Error> {
        self.resource.get(&[list_id], &[])
    }

    pub fn create<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value, Error> {
        self.resource.post(&[], Some(&payload(data)?))
    }

    pub fn update<T: Serialize + ?Sized>(&self, list_id: &str, data: &T) -> Result<Value, Error> {
        self.resource.post(&[list_id], Some(&payload(data)?))
    }

    pub fn delete(&self, list_id: &str) -> Result<Value, Error> {
        self.resource.delete(&[list_id], &[])
    }

    pub fn all(&self) -> Result<Value, Error> {
        self.resource.get(&[], &[])
    }

    /// Remove every member from the list; the list itself stays.
    pub fn purge_members(&self, list_id: &str) -> Result<Value, Error> {
        self.resource.delete(&[list_id, "members"], &[])
    }

    #[deprecated(note = "use `ListApi::sync_members` with actions instead")]
    pub fn add_or_update_members(&self, list_id: &str, data: &BulkMembers) -> Result<Value, Error> {
        warn!("ListApi::add_or_update_members is deprecated; use sync_members with actions instead");
        self.resource.post_json(&[list_id, "members"], &payload(data)?)
    }

    /// Bulk add, update and/or unsubscribe members in one call.
    pub fn sync_members(&self, list_id: &str, data: &SyncMembers) -> Result<Value, Error> {
        self.resource.post_json(&[list_id, "members"], &payload(data)?)
    }
}
