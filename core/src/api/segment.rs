use serde::Serialize;
use serde_json::Value;

use crate::api::payload_for_list;
use crate::error::Error;
use crate::pipeline::{Pipeline, Resource};

/// Segments of a list.
#[derive(Debug, Clone, Copy)]
pub struct SegmentApi<'a> {
    resource: Resource<'a>,
}

impl<'a> SegmentApi<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self {
            resource: Resource::new("segment", pipeline),
        }
    }

    pub fn get(&self, list_id: &str, segment_id: &str) -> Result<Value, Error> {
        self.resource.get(&[segment_id], &[("list_id", list_id)])
    }

    pub fn create<T: Serialize + ?Sized>(&self, list_id: &str, data: &T) -> Result<Value, Error> {
        self.resource.post(&[], Some(&payload_for_list(list_id, data)?))
    }

    pub fn update<T: Serialize + ?Sized>(&self, list_id: &str, segment_id: &str, data: &T) -> Result<Value, Error> {
        self.resource.post(&[segment_id], Some(&payload_for_list(list_id, data)?))
    }

    pub fn delete(&self, list_id: &str, segment_id: &str) -> Result<Value, Error> {
        self.resource.delete(&[segment_id], &[("list_id", list_id)])
    }

    pub fn all(&self, list_id: &str) -> Result<Value, Error> {
        self.resource.get(&[], &[("list_id", list_id)])
    }
}
