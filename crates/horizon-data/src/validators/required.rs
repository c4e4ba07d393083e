use futures_util::future::BoxFuture;
use horizon_data_core::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, done, loose_eq, parse_params, report_error};
use crate::identity::stringify;
use crate::model::Model;
use crate::value::{Value, json_is_empty};

/// Requires a non-empty value, or a specific value.
///
/// Without `required_value`, whitespace-only strings count as empty; with
/// `strict`, only null does. With `required_value`, the attribute must equal
/// it (loosely, or exactly with `strict`).
#[derive(Debug, Clone)]
pub struct RequiredValidator {
    options: ValidatorOptions,
    required_value: Option<JsonValue>,
    strict: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Params {
    required_value: Option<JsonValue>,
    strict: bool,
}

impl RequiredValidator {
    /// A validator requiring a non-empty value. Empty values are not
    /// skipped.
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options: options.with_skip_on_empty(false),
            required_value: None,
            strict: false,
        }
    }

    /// Require `value` instead of any non-empty value.
    pub fn with_required_value(mut self, value: JsonValue) -> Self {
        self.required_value = Some(value);
        self
    }

    /// Compare exactly instead of loosely.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: Params = parse_params("required", params)?;
        Ok(Self {
            options: options.keep_empty_unless_set(params),
            required_value: parsed.required_value.filter(|v| !v.is_null()),
            strict: parsed.strict,
        })
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        match &self.required_value {
            None if self.strict => !value.is_null(),
            None => !json_is_empty(value, true),
            Some(required) if self.strict => value == required,
            Some(required) => loose_eq(value, required),
        }
    }
}

impl Validator for RequiredValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn is_required(&self) -> bool {
        true
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let present = match model.attribute_value(attribute) {
            Some(Value::Json(value)) => self.accepts(&value),
            Some(other) => !other.is_empty(true),
            None => false,
        };
        if !present {
            match &self.required_value {
                None => report_error(
                    model,
                    attribute,
                    &self.options.message_or("{attribute} cannot be blank."),
                    &[],
                ),
                Some(required) => report_error(
                    model,
                    attribute,
                    &self.options.message_or("{attribute} must be `{requiredValue}`."),
                    &[("requiredValue", stringify(required))],
                ),
            }
        }
        done()
    }
}
