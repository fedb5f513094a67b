//! Field checks shared by the envelope schemas.

use crate::{FieldErrors, Timestamp};
use serde_json::Value;
use uuid::Uuid;

/// Canonical hyphenated form, e.g. `0b3e7b4c-8d4f-4a3e-9d1b-6a9c0f2e4b11`.
pub(crate) fn is_uuid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

/// Collects failures instead of stopping at the first one.
#[derive(Default)]
pub(crate) struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn fail(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(field, message);
    }

    pub fn required(&mut self, field: &'static str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.fail(field, "is missing");
            return false;
        }
        true
    }

    pub fn uuid(&mut self, field: &'static str, value: &str) {
        if self.required(field, value) && !is_uuid(value) {
            self.fail(field, format!("must be a UUID, got {value:?}"));
        }
    }

    pub fn optional_uuid(&mut self, field: &'static str, value: Option<&str>) {
        if let Some(value) = value {
            if !is_uuid(value) {
                self.fail(field, format!("must be a UUID, got {value:?}"));
            }
        }
    }

    pub fn timestamp(&mut self, field: &'static str, value: &Timestamp) {
        match value {
            Timestamp::Valid(_) => {}
            Timestamp::Invalid(raw) if raw.is_empty() => self.fail(field, "is missing"),
            Timestamp::Invalid(raw) => {
                self.fail(field, format!("must be an ISO-8601 timestamp, got {raw:?}"))
            }
        }
    }

    pub fn optional_timestamp(&mut self, field: &'static str, value: Option<&Timestamp>) {
        if let Some(value) = value {
            self.timestamp(field, value);
        }
    }

    pub fn version(&mut self, value: i64, expected: i64) {
        if value != expected {
            self.fail("version", format!("must be {expected}, got {value}"));
        }
    }

    pub fn mapping(&mut self, field: &'static str, value: &Value) {
        if !value.is_object() {
            self.fail(field, "must be a JSON object");
        }
    }

    pub fn optional_non_empty(&mut self, field: &'static str, value: Option<&str>) {
        if matches!(value, Some(v) if v.trim().is_empty()) {
            self.fail(field, "must not be blank");
        }
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uuid_requires_hyphenated_form() {
        assert!(is_uuid("0b3e7b4c-8d4f-4a3e-9d1b-6a9c0f2e4b11"));
        assert!(!is_uuid("0b3e7b4c8d4f4a3e9d1b6a9c0f2e4b11"));
        assert!(!is_uuid("{0b3e7b4c-8d4f-4a3e-9d1b-6a9c0f2e4b11}"));
        assert!(!is_uuid("0b3e7b4c-8d4f-4a3e-9d1b-6a9c0f2e4bzz"));
        assert!(!is_uuid(""));
    }

    #[test]
    fn collects_every_failure() {
        let mut v = Validator::default();
        v.uuid("uuid", "nope");
        v.required("type", " ");
        v.version(3, 1);
        v.mapping("data", &json!([1]));
        v.timestamp("sent_at", &Timestamp::Invalid(String::new()));
        let errors = v.finish().unwrap_err();
        assert_eq!(errors.fields(), vec!["uuid", "type", "version", "data", "sent_at"]);
        assert_eq!(errors.iter().last().unwrap().message, "is missing");
    }

    #[test]
    fn empty_validator_passes() {
        let mut v = Validator::default();
        v.uuid("uuid", "0b3e7b4c-8d4f-4a3e-9d1b-6a9c0f2e4b11");
        v.optional_uuid("request_id", None);
        v.optional_non_empty("group_id", Some("g"));
        assert!(v.finish().is_ok());
    }
}
