use futures_util::future::BoxFuture;
use horizon_data_core::Result;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, done, json_of, parse_params, report_error};
use crate::model::Model;

/// Requires a string, optionally bounded in length (counted in characters).
#[derive(Debug, Clone, Default)]
pub struct StringValidator {
    options: ValidatorOptions,
    min: Option<usize>,
    max: Option<usize>,
    length: Option<usize>,
    too_short: Option<String>,
    too_long: Option<String>,
    not_equal: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LengthParam {
    Exact(usize),
    Range(Vec<Option<usize>>),
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Params {
    min: Option<usize>,
    max: Option<usize>,
    length: Option<LengthParam>,
    too_short: Option<String>,
    too_long: Option<String>,
    not_equal: Option<String>,
}

impl StringValidator {
    /// A validator accepting any string.
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Minimum length.
    pub fn min(mut self, min: usize) -> Self {
        self.min = Some(min);
        self
    }

    /// Maximum length.
    pub fn max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    /// Exact length.
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// `length` may be a number (exact) or `[min, max]`.
    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: Params = parse_params("string", params)?;
        let mut validator = Self {
            options,
            min: parsed.min,
            max: parsed.max,
            length: None,
            too_short: parsed.too_short,
            too_long: parsed.too_long,
            not_equal: parsed.not_equal,
        };
        match parsed.length {
            Some(LengthParam::Exact(length)) => validator.length = Some(length),
            Some(LengthParam::Range(bounds)) => {
                if let Some(Some(min)) = bounds.first() {
                    validator.min = Some(*min);
                }
                if let Some(Some(max)) = bounds.get(1) {
                    validator.max = Some(*max);
                }
            }
            None => {}
        }
        Ok(validator)
    }
}

impl Validator for StringValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let JsonValue::String(value) = json_of(model, attribute) else {
            report_error(model, attribute, &self.options.message_or("{attribute} must be a string."), &[]);
            return done();
        };

        let length = value.chars().count();
        if let Some(min) = self.min.filter(|min| length < *min) {
            let template = self
                .too_short
                .as_deref()
                .unwrap_or("{attribute} should contain at least {min} characters.");
            report_error(model, attribute, template, &[("min", min.to_string())]);
        }
        if let Some(max) = self.max.filter(|max| length > *max) {
            let template = self
                .too_long
                .as_deref()
                .unwrap_or("{attribute} should contain at most {max} characters.");
            report_error(model, attribute, template, &[("max", max.to_string())]);
        }
        if let Some(expected) = self.length.filter(|expected| length != *expected) {
            let template = self
                .not_equal
                .as_deref()
                .unwrap_or("{attribute} should contain {length} characters.");
            report_error(model, attribute, template, &[("length", expected.to_string())]);
        }
        done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use serde_json::json;

    fn check(validator: &StringValidator, value: JsonValue) -> Vec<String> {
        let schema = ModelSchema::builder("Form").attribute("title").build().unwrap();
        let form = Model::with_values(schema, &json!({ "title": value })).unwrap();
        let _ = futures_util::FutureExt::now_or_never(validator.validate_attribute(&form, "title"));
        form.errors_for("title")
    }

    #[test]
    fn test_length_bounds() {
        let validator =
            StringValidator::from_params(ValidatorOptions::new(["title"]), &json!({"length": [2, 4]})).unwrap();
        assert_eq!(check(&validator, json!("a")), vec!["Title should contain at least 2 characters."]);
        assert_eq!(check(&validator, json!("abcde")), vec!["Title should contain at most 4 characters."]);
        assert!(check(&validator, json!("абв")).is_empty());
    }

    #[test]
    fn test_exact_length_and_type() {
        let validator = StringValidator::new(ValidatorOptions::new(["title"])).length(3);
        assert_eq!(check(&validator, json!("ab")), vec!["Title should contain 3 characters."]);
        assert_eq!(check(&validator, json!(12)), vec!["Title must be a string."]);
    }
}
