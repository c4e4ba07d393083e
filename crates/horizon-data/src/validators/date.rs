//! Date validator.

use chrono::{NaiveDate, NaiveDateTime};
use futures_util::future::BoxFuture;
use horizon_data_core::Result;
use horizon_data_core::logging::targets;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, done, json_of, parse_params, report_error};
use crate::model::Model;

const DEFAULT_FORMAT: &str = "%Y-%m-%d";

/// Requires a string date in `format` (a `chrono` format string,
/// `%Y-%m-%d` by default). With a `timestamp_attribute`, the parsed date is
/// written there as Unix seconds (UTC).
#[derive(Debug, Clone)]
pub struct DateValidator {
    options: ValidatorOptions,
    format: String,
    timestamp_attribute: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DateParams {
    format: String,
    timestamp_attribute: Option<String>,
}

impl Default for DateParams {
    fn default() -> Self {
        Self {
            format: DEFAULT_FORMAT.to_string(),
            timestamp_attribute: None,
        }
    }
}

impl DateValidator {
    /// A validator for `%Y-%m-%d` dates.
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options,
            format: DEFAULT_FORMAT.to_string(),
            timestamp_attribute: None,
        }
    }

    /// Expect `format` instead of `%Y-%m-%d`.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    /// Store the parsed timestamp in `attribute`.
    pub fn timestamp_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.timestamp_attribute = Some(attribute.into());
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: DateParams = parse_params("date", params)?;
        Ok(Self {
            options,
            format: parsed.format,
            timestamp_attribute: parsed.timestamp_attribute,
        })
    }

    /// Seconds since the epoch, or `None` if `value` is not a date in the
    /// expected format. Formats without a time part resolve to midnight.
    fn parse(&self, value: &str) -> Option<i64> {
        NaiveDateTime::parse_from_str(value, &self.format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, &self.format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
            .map(|datetime| datetime.and_utc().timestamp())
    }
}

impl Validator for DateValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let timestamp = match json_of(model, attribute) {
            JsonValue::String(value) => self.parse(&value),
            _ => None,
        };
        match (timestamp, &self.timestamp_attribute) {
            (None, _) => report_error(
                model,
                attribute,
                &self.options.message_or("The format of {attribute} is invalid."),
                &[],
            ),
            (Some(timestamp), Some(target)) => {
                if let Err(e) = model.set(target, JsonValue::from(timestamp)) {
                    tracing::warn!(
                        target: targets::VALIDATION,
                        error = %e,
                        attribute,
                        timestamp_attribute = %target,
                        "failed to store parsed timestamp"
                    );
                }
            }
            (Some(_), None) => {}
        }
        done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use futures_util::FutureExt;
    use serde_json::json;

    fn run(validator: &DateValidator, value: JsonValue) -> (Model, Vec<String>) {
        let schema = ModelSchema::builder("Event").attributes(["field", "at"]).build().unwrap();
        let model = Model::with_values(schema, &json!({ "field": value })).unwrap();
        let _ = validator.validate_attribute(&model, "field").now_or_never();
        let errors = model.errors_for("field");
        (model, errors)
    }

    #[test]
    fn test_default_format() {
        let validator = DateValidator::new(ValidatorOptions::new(["field"]));
        assert!(run(&validator, json!("2024-02-29")).1.is_empty());
        assert_eq!(run(&validator, json!("2023-02-29")).1, vec!["The format of Field is invalid."]);
        assert!(!run(&validator, json!("29.02.2024")).1.is_empty());
        assert!(!run(&validator, json!(["2024-02-29"])).1.is_empty());
        assert!(!run(&validator, json!(20240229)).1.is_empty());
    }

    #[test]
    fn test_timestamp_attribute() {
        let validator = DateValidator::from_params(
            ValidatorOptions::new(["field"]),
            &json!({"format": "%d.%m.%Y %H:%M", "timestampAttribute": "at"}),
        )
        .unwrap();
        let (model, errors) = run(&validator, json!("01.01.1970 01:00"));
        assert!(errors.is_empty());
        assert_eq!(model.get_json("at"), Some(json!(3600)));

        let (model, errors) = run(&validator, json!("1970-01-01"));
        assert_eq!(errors.len(), 1);
        assert_eq!(model.get_json("at"), Some(JsonValue::Null));
    }

    #[test]
    fn test_date_only_format_resolves_to_midnight() {
        let validator = DateValidator::new(ValidatorOptions::new(["field"])).timestamp_attribute("at");
        let (model, errors) = run(&validator, json!("1970-01-02"));
        assert!(errors.is_empty());
        assert_eq!(model.get_json("at"), Some(json!(86_400)));
    }
}
