//! Thin resource clients. Each maps endpoints onto paths of one resource and
//! leaves the request cycle to `Pipeline`.

mod campaign;
mod field;
mod list;
mod member;
mod report;
mod segment;
mod webhook;

pub use campaign::CampaignApi;
pub use field::FieldApi;
pub use list::ListApi;
pub use member::MemberApi;
pub use report::ReportApi;
pub use segment::SegmentApi;
pub use webhook::WebhookApi;

use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Convert a caller's payload into a JSON value.
pub(crate) fn payload<T: Serialize + ?Sized>(data: &T) -> Result<Value, Error> {
    serde_json::to_value(data).map_err(|e| Error::Encode(e.to_string()))
}

/// Convert a payload and set its `list_id`, overriding any value it carries.
pub(crate) fn payload_for_list<T: Serialize + ?Sized>(list_id: &str, data: &T) -> Result<Value, Error> {
    let mut value = payload(data)?;
    match value.as_object_mut() {
        Some(map) => {
            map.insert("list_id".to_string(), Value::String(list_id.to_string()));
            Ok(value)
        }
        None => Err(Error::Encode(format!("payload must be a JSON object, got {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_id_is_injected_and_overrides() {
        let value = payload_for_list("abc", &json!({"email": "a@example.nl", "list_id": "old"})).unwrap();
        assert_eq!(value, json!({"email": "a@example.nl", "list_id": "abc"}));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = payload_for_list("abc", &json!(["x"])).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }

    #[test]
    fn typed_payloads_convert() {
        #[derive(Serialize)]
        struct NewField<'a> {
            name: &'a str,
            datatype: &'a str,
            required: bool,
        }
        let value = payload_for_list(
            "abc",
            &NewField {
                name: "Woonplaats",
                datatype: "text",
                required: false,
            },
        )
        .unwrap();
        assert_eq!(value["list_id"], "abc");
        assert_eq!(value["required"], false);
    }
}
