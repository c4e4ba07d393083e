//! Validators that assign instead of checking.

use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use horizon_data_core::Result;
use horizon_data_core::logging::targets;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, done, json_of, parse_params};
use crate::model::Model;
use crate::value::json_is_empty;

fn assign(model: &Model, attribute: &str, value: JsonValue) {
    if let Err(e) = model.set(attribute, value) {
        tracing::warn!(target: targets::VALIDATION, model = %model, attribute, error = %e, "assignment failed");
    }
}

/// Fills empty attributes with a default value.
#[derive(Debug, Clone)]
pub struct DefaultValueValidator {
    options: ValidatorOptions,
    value: JsonValue,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Params {
    value: JsonValue,
}

impl DefaultValueValidator {
    /// Fill empty attributes with `value`. Empty values are not skipped.
    pub fn new(options: ValidatorOptions, value: JsonValue) -> Self {
        Self {
            options: options.with_skip_on_empty(false),
            value,
        }
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: Params = parse_params("default", params)?;
        Ok(Self {
            options: options.keep_empty_unless_set(params),
            value: parsed.value,
        })
    }
}

impl Validator for DefaultValueValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        if json_is_empty(&json_of(model, attribute), false) {
            assign(model, attribute, self.value.clone());
        }
        done()
    }
}

/// Transformation applied by [`FilterValidator`].
pub type FilterFn = Arc<dyn Fn(&Model, JsonValue) -> JsonValue + Send + Sync>;

/// Replaces each attribute with the result of a filter function, such as
/// trimming or normalizing case. Empty values are filtered too.
#[derive(Clone)]
pub struct FilterValidator {
    options: ValidatorOptions,
    filter: FilterFn,
}

impl FilterValidator {
    /// Apply `filter` to the attributes of `options`.
    pub fn new<F>(options: ValidatorOptions, filter: F) -> Self
    where
        F: Fn(&Model, JsonValue) -> JsonValue + Send + Sync + 'static,
    {
        Self {
            options: options.with_skip_on_empty(false),
            filter: Arc::new(filter),
        }
    }
}

impl fmt::Debug for FilterValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterValidator").field("options", &self.options).finish_non_exhaustive()
    }
}

impl Validator for FilterValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let filtered = (self.filter)(model, json_of(model, attribute));
        assign(model, attribute, filtered);
        done()
    }
}

/// Marks attributes safe for mass assignment without checking anything.
#[derive(Debug, Clone)]
pub struct SafeValidator {
    options: ValidatorOptions,
}

impl SafeValidator {
    /// Mark the attributes of `options` safe.
    pub fn new(options: ValidatorOptions) -> Self {
        Self { options }
    }
}

impl Validator for SafeValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, _model: &'a Model, _attribute: &'a str) -> BoxFuture<'a, ()> {
        done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use serde_json::json;

    fn model() -> Model {
        let schema = ModelSchema::builder("Profile").attributes(["name", "city"]).build().unwrap();
        Model::with_values(schema, &json!({"name": "  Ivan  ", "city": ""})).unwrap()
    }

    #[tokio::test]
    async fn test_default_fills_empty_only() {
        let profile = model();
        let validator = DefaultValueValidator::from_params(
            ValidatorOptions::new(["name", "city"]),
            &json!({"value": "Moscow"}),
        )
        .unwrap();
        validator.validate(&profile, &["name".to_string(), "city".to_string()]).await;
        assert_eq!(profile.get_json("city"), Some(json!("Moscow")));
        assert_eq!(profile.get_json("name"), Some(json!("  Ivan  ")));
    }

    #[tokio::test]
    async fn test_filter_rewrites_value() {
        let profile = model();
        let validator = FilterValidator::new(ValidatorOptions::new(["name"]), |_, value| match value {
            JsonValue::String(s) => JsonValue::String(s.trim().to_string()),
            other => other,
        });
        validator.validate(&profile, &["name".to_string()]).await;
        assert_eq!(profile.get_json("name"), Some(json!("Ivan")));
    }
}
