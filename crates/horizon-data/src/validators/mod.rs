//! Attribute validators.
//!
//! A [`Validator`] checks a set of attributes of a [`Model`] and records
//! failures with [`Model::add_error`]. Validators are usually declared on a
//! [`ModelSchema`](crate::schema::ModelSchema) by name and JSON params and
//! built through [`create`]:
//!
//! | name       | validator              |
//! |------------|------------------------|
//! | `required` | [`RequiredValidator`]  |
//! | `string`   | [`StringValidator`]    |
//! | `in`       | [`RangeValidator`]     |
//! | `compare`  | [`CompareValidator`]   |
//! | `boolean`  | [`BooleanValidator`]   |
//! | `email`    | [`EmailValidator`]     |
//! | `match`    | [`MatchValidator`]     |
//! | `url`      | [`UrlValidator`]       |
//! | `date`     | [`DateValidator`]      |
//! | `default`  | [`DefaultValueValidator`] |
//! | `safe`     | [`SafeValidator`]      |
//!
//! [`FilterValidator`] and [`InlineValidator`] wrap closures and are added
//! with [`ModelSchemaBuilder::validator`](crate::schema::ModelSchemaBuilder::validator)
//! or [`ModelSchemaBuilder::method`](crate::schema::ModelSchemaBuilder::method).
//!
//! Error messages are templates: `{attribute}` is replaced by the attribute
//! label, `{value}` by the current value, and validator-specific
//! placeholders such as `{min}` by their parameters.

mod assign;
mod compare;
mod date;
mod inline;
mod pattern;
mod required;
mod string;

use std::sync::Arc;

use futures_util::future::{self, BoxFuture, join_all};
use horizon_data_core::logging::targets;
use horizon_data_core::{Error, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::identity::stringify;
use crate::model::Model;

pub use assign::{DefaultValueValidator, FilterValidator, SafeValidator};
pub use compare::{BooleanValidator, CompareOperator, CompareValidator, RangeValidator};
pub use date::DateValidator;
pub use inline::{InlineMethod, InlineValidator};
pub use pattern::{EmailValidator, MatchValidator, UrlValidator};
pub use required::RequiredValidator;
pub use string::StringValidator;

/// A check over one or more attributes of a model.
pub trait Validator: Send + Sync {
    /// Common options: attributes, scenarios, skip flags and message.
    fn options(&self) -> &ValidatorOptions;

    /// Check one attribute, recording failures on the model.
    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()>;

    /// Whether this validator makes its attributes mandatory.
    fn is_required(&self) -> bool {
        false
    }

    /// Whether the validator runs in `scenario`.
    fn is_active(&self, scenario: &str) -> bool {
        self.options().is_active(scenario)
    }

    /// Check every attribute of this validator that is also in
    /// `attributes`. Attributes that already have errors (with
    /// `skip_on_error`) or are empty (with `skip_on_empty`) are skipped;
    /// the remaining checks run concurrently.
    fn validate<'a>(&'a self, model: &'a Model, attributes: &'a [String]) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let options = self.options();
            let checks = options
                .attribute_names()
                .filter(|name| attributes.iter().any(|a| a == name))
                .filter(|name| !(options.skip_on_error && model.has_errors(Some(*name))))
                .filter(|name| {
                    !(options.skip_on_empty && model.attribute_value(name).is_none_or(|v| v.is_empty(false)))
                })
                .map(|name| self.validate_attribute(model, name))
                .collect::<Vec<_>>();
            join_all(checks).await;
        })
    }
}

/// Options shared by every validator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorOptions {
    /// Attributes checked. A leading `!` marks an attribute as validated but
    /// not safe for mass assignment.
    #[serde(skip)]
    pub attributes: Vec<String>,
    /// Scenarios the validator runs in (empty: every scenario).
    #[serde(deserialize_with = "one_or_many")]
    pub on: Vec<String>,
    /// Scenarios the validator never runs in.
    #[serde(deserialize_with = "one_or_many")]
    pub except: Vec<String>,
    /// Skip attributes that already have errors.
    pub skip_on_error: bool,
    /// Skip empty attributes.
    pub skip_on_empty: bool,
    /// Custom error message template.
    pub message: Option<String>,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            attributes: Vec::new(),
            on: Vec::new(),
            except: Vec::new(),
            skip_on_error: true,
            skip_on_empty: true,
            message: None,
        }
    }
}

impl ValidatorOptions {
    /// Options for `attributes` with default settings.
    pub fn new<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: attributes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parse the common keys of a rule's JSON params.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] when a known key has the wrong shape.
    pub fn from_params(attributes: Vec<String>, params: &JsonValue) -> Result<Self> {
        let mut options = parse_params::<ValidatorOptions>("validator", params)?;
        options.attributes = attributes;
        Ok(options)
    }

    /// Restrict to `scenarios`.
    pub fn on<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on = scenarios.into_iter().map(Into::into).collect();
        self
    }

    /// Exclude `scenarios`.
    pub fn except<I, S>(mut self, scenarios: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except = scenarios.into_iter().map(Into::into).collect();
        self
    }

    /// Set the error message template.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set whether empty attributes are skipped.
    pub fn with_skip_on_empty(mut self, skip: bool) -> Self {
        self.skip_on_empty = skip;
        self
    }

    /// Whether a validator with these options runs in `scenario`.
    pub fn is_active(&self, scenario: &str) -> bool {
        !self.except.iter().any(|s| s == scenario) && (self.on.is_empty() || self.on.iter().any(|s| s == scenario))
    }

    /// Attribute names without the `!` marker.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.trim_start_matches('!'))
    }

    /// Built-ins that must see empty values default `skip_on_empty` to
    /// `false` unless the params say otherwise.
    fn keep_empty_unless_set(mut self, params: &JsonValue) -> Self {
        if params.get("skipOnEmpty").is_none() {
            self.skip_on_empty = false;
        }
        self
    }

    fn message_or(&self, fallback: &str) -> String {
        self.message.clone().unwrap_or_else(|| fallback.to_string())
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

fn parse_params<T: for<'de> Deserialize<'de>>(kind: &str, params: &JsonValue) -> Result<T> {
    let params = if params.is_null() {
        JsonValue::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(params).map_err(|e| Error::invalid_config(format!("Invalid `{kind}` params: {e}")))
}

/// Build a built-in validator by name.
///
/// # Errors
///
/// [`Error::InvalidConfig`] for unknown names, malformed params, and
/// validators that need a closure (`filter`).
pub fn create(kind: &str, attributes: Vec<String>, params: &JsonValue) -> Result<Arc<dyn Validator>> {
    let options = ValidatorOptions::from_params(attributes, params)?;
    let validator: Arc<dyn Validator> = match kind {
        "required" => Arc::new(RequiredValidator::from_params(options, params)?),
        "string" => Arc::new(StringValidator::from_params(options, params)?),
        "in" => Arc::new(RangeValidator::from_params(options, params)?),
        "compare" => Arc::new(CompareValidator::from_params(options, params)?),
        "boolean" => Arc::new(BooleanValidator::from_params(options, params)?),
        "email" => Arc::new(EmailValidator::from_params(options, params)?),
        "match" => Arc::new(MatchValidator::from_params(options, params)?),
        "url" => Arc::new(UrlValidator::from_params(options, params)?),
        "date" => Arc::new(DateValidator::from_params(options, params)?),
        "default" => Arc::new(DefaultValueValidator::from_params(options, params)?),
        "safe" => Arc::new(SafeValidator::new(options)),
        "filter" => {
            return Err(Error::invalid_config(
                "The `filter` validator needs a closure; add a FilterValidator instead",
            ));
        }
        other => return Err(Error::invalid_config(format!("Unknown validator `{other}`"))),
    };
    Ok(validator)
}

/// Render `template` for `attribute` and record it on the model.
pub(crate) fn report_error(model: &Model, attribute: &str, template: &str, params: &[(&str, String)]) {
    let value = model
        .attribute_value(attribute)
        .map(|v| stringify(&v.to_json()))
        .unwrap_or_default();
    let mut message = template
        .replace("{attribute}", &model.attribute_label(attribute))
        .replace("{value}", &value);
    for (key, replacement) in params {
        message = message.replace(&format!("{{{key}}}"), replacement);
    }

    tracing::warn!(
        target: targets::VALIDATION,
        model = %model,
        attribute,
        message = %message,
        "validation error"
    );
    model.add_error(attribute, message);
}

/// The current JSON value of `attribute` (null when not plain data).
pub(crate) fn json_of(model: &Model, attribute: &str) -> JsonValue {
    model.attribute_value(attribute).map(|v| v.to_json()).unwrap_or(JsonValue::Null)
}

/// A validator that finished synchronously.
pub(crate) fn done<'a>() -> BoxFuture<'a, ()> {
    Box::pin(future::ready(()))
}

/// Loose scalar equality: numbers, numeric strings and booleans compare by
/// numeric value, other scalars by their string form.
pub(crate) fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (JsonValue::Null, _) | (_, JsonValue::Null) => false,
        (JsonValue::Array(_) | JsonValue::Object(_), _) | (_, JsonValue::Array(_) | JsonValue::Object(_)) => false,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => stringify(a) == stringify(b),
        },
    }
}

pub(crate) fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_from_params() {
        let options = ValidatorOptions::from_params(
            vec!["name".into()],
            &json!({"on": "insert", "except": ["update"], "skipOnError": false, "max": 3}),
        )
        .unwrap();
        assert_eq!(options.on, vec!["insert"]);
        assert_eq!(options.except, vec!["update"]);
        assert!(!options.skip_on_error);
        assert!(options.skip_on_empty);
        assert!(options.is_active("insert"));
        assert!(!options.is_active("update"));
        assert!(!options.is_active("default"));

        assert!(ValidatorOptions::from_params(vec![], &json!({"on": 5})).is_err());
    }

    #[test]
    fn test_attribute_names_strip_marker() {
        let options = ValidatorOptions::new(["!uid", "name"]);
        assert_eq!(options.attribute_names().collect::<Vec<_>>(), vec!["uid", "name"]);
    }

    #[test]
    fn test_create_by_name() {
        assert!(create("required", vec!["a".into()], &json!({})).unwrap().is_required());
        assert!(!create("safe", vec!["a".into()], &JsonValue::Null).unwrap().is_required());
        assert!(matches!(create("filter", vec![], &json!({})), Err(Error::InvalidConfig(_))));
        assert!(matches!(create("telepathy", vec![], &json!({})), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_loose_eq() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!(true), &json!("1")));
        assert!(loose_eq(&json!("a"), &json!("a")));
        assert!(!loose_eq(&json!(null), &json!(0)));
        assert!(!loose_eq(&json!("a"), &json!("b")));
    }
}
