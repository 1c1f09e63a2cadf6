use serde_json::Value;

use crate::error::Error;
use crate::pipeline::{Pipeline, Resource};

/// Delivery statistics of sent campaigns. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct ReportApi<'a> {
    resource: Resource<'a>,
}

impl<'a> ReportApi<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self {
            resource: Resource::new("report", pipeline),
        }
    }

    pub fn get(&self, campaign_id: &str) -> Result<Value, Error> {
        self.resource.get(&[campaign_id], &[])
    }

    pub fn all(&self) -> Result<Value, Error> {
        self.resource.get(&[], &[])
    }
}
