use serde::Serialize;
use serde_json::{json, Value};

use crate::api::payload;
use crate::error::Error;
use crate::pipeline::{Pipeline, Resource};

#[derive(Debug, Clone, Copy)]
pub struct CampaignApi<'a> {
    resource: Resource<'a>,
}

impl<'a> CampaignApi<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Self {
            resource: Resource::new("campaign", pipeline),
        }
    }

    pub fn get(&self, campaign_id: &str) -> Result<Value, Error> {
        self.resource.get(&[campaign_id], &[])
    }

    pub fn create<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value, Error> {
        self.resource.post(&[], Some(&payload(data)?))
    }

    pub fn update<T: Serialize + ?Sized>(&self, campaign_id: &str, data: &T) -> Result<Value, Error> {
        self.resource.post(&[campaign_id], Some(&payload(data)?))
    }

    pub fn delete(&self, campaign_id: &str) -> Result<Value, Error> {
        self.resource.delete(&[campaign_id], &[])
    }

    pub fn all(&self) -> Result<Value, Error> {
        self.resource.get(&[], &[])
    }

    pub fn get_content(&self, campaign_id: &str) -> Result<Value, Error> {
        self.resource.get(&[campaign_id, "content"], &[])
    }

    /// Set the campaign's HTML, either inline (`html`) or by URL (`import_url`).
    pub fn update_content<T: Serialize + ?Sized>(&self, campaign_id: &str, data: &T) -> Result<Value, Error> {
        self.resource.post(&[campaign_id, "content"], Some(&payload(data)?))
    }

    /// Send the campaign right away.
    pub fn send(&self, campaign_id: &str) -> Result<Value, Error> {
        self.resource.post(&[campaign_id, "action", "send"], None)
    }

    /// `delivery_requested` is `YYYY-MM-DD HH:MM:SS` in the account's timezone.
    pub fn schedule(&self, campaign_id: &str, delivery_requested: &str) -> Result<Value, Error> {
        let body = json!({ "delivery_requested": delivery_requested });
        self.resource.post(&[campaign_id, "action", "schedule"], Some(&body))
    }

    pub fn send_test_mail(&self, campaign_id: &str, email: &str) -> Result<Value, Error> {
        let body = json!({ "email": email });
        self.resource.post(&[campaign_id, "action", "testmail"], Some(&body))
    }
}
