//! Validators comparing a value against fixed values or another attribute.

use std::cmp::Ordering;

use futures_util::future::BoxFuture;
use horizon_data_core::{Error, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, as_number, done, json_of, loose_eq, parse_params, report_error};
use crate::identity::stringify;
use crate::model::Model;

/// Requires the value to be one of `range` (or, with `not`, none of them).
#[derive(Debug, Clone)]
pub struct RangeValidator {
    options: ValidatorOptions,
    range: Vec<JsonValue>,
    strict: bool,
    not: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeParams {
    range: Vec<JsonValue>,
    #[serde(default)]
    strict: bool,
    #[serde(default)]
    not: bool,
}

impl RangeValidator {
    /// A validator accepting the values in `range`.
    pub fn new(options: ValidatorOptions, range: Vec<JsonValue>) -> Self {
        Self {
            options,
            range,
            strict: false,
            not: false,
        }
    }

    /// Invert the check.
    pub fn not(mut self, not: bool) -> Self {
        self.not = not;
        self
    }

    /// Compare exactly instead of loosely.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        if params.get("range").is_none_or(|r| !r.is_array()) {
            return Err(Error::invalid_config("The `range` property must be set."));
        }
        let parsed: RangeParams = parse_params("in", params)?;
        Ok(Self {
            options,
            range: parsed.range,
            strict: parsed.strict,
            not: parsed.not,
        })
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        let found = self
            .range
            .iter()
            .any(|item| if self.strict { item == value } else { loose_eq(item, value) });
        found != self.not
    }
}

impl Validator for RangeValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        if !self.accepts(&json_of(model, attribute)) {
            report_error(model, attribute, &self.options.message_or("{attribute} is invalid."), &[]);
        }
        done()
    }
}

/// Requires one of two values, `"1"` and `"0"` by default.
#[derive(Debug, Clone)]
pub struct BooleanValidator {
    options: ValidatorOptions,
    true_value: JsonValue,
    false_value: JsonValue,
    strict: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BooleanParams {
    true_value: JsonValue,
    false_value: JsonValue,
    strict: bool,
}

impl Default for BooleanParams {
    fn default() -> Self {
        Self {
            true_value: JsonValue::from("1"),
            false_value: JsonValue::from("0"),
            strict: false,
        }
    }
}

impl BooleanValidator {
    /// A validator accepting `"1"`/`"0"` (and loosely equal values).
    pub fn new(options: ValidatorOptions) -> Self {
        let defaults = BooleanParams::default();
        Self {
            options,
            true_value: defaults.true_value,
            false_value: defaults.false_value,
            strict: defaults.strict,
        }
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: BooleanParams = parse_params("boolean", params)?;
        Ok(Self {
            options,
            true_value: parsed.true_value,
            false_value: parsed.false_value,
            strict: parsed.strict,
        })
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        if self.strict {
            *value == self.true_value || *value == self.false_value
        } else {
            loose_eq(value, &self.true_value) || loose_eq(value, &self.false_value)
        }
    }
}

impl Validator for BooleanValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        if !self.accepts(&json_of(model, attribute)) {
            report_error(
                model,
                attribute,
                &self
                    .options
                    .message_or("{attribute} must be either \"{true}\" or \"{false}\"."),
                &[
                    ("true", stringify(&self.true_value)),
                    ("false", stringify(&self.false_value)),
                ],
            );
        }
        done()
    }
}

/// Comparison applied by [`CompareValidator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CompareOperator {
    /// Loosely equal.
    #[default]
    #[serde(rename = "==")]
    Eq,
    /// Exactly equal.
    #[serde(rename = "===")]
    StrictEq,
    /// Loosely different.
    #[serde(rename = "!=")]
    Ne,
    /// Exactly different.
    #[serde(rename = "!==")]
    StrictNe,
    /// Greater than.
    #[serde(rename = ">")]
    Gt,
    /// Greater than or equal.
    #[serde(rename = ">=")]
    Ge,
    /// Less than.
    #[serde(rename = "<")]
    Lt,
    /// Less than or equal.
    #[serde(rename = "<=")]
    Le,
}

impl CompareOperator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::Ne => "!=",
            Self::StrictNe => "!==",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// Whether `value <op> expected` holds.
    fn holds(self, value: &JsonValue, expected: &JsonValue) -> bool {
        match self {
            Self::Eq => loose_eq(value, expected),
            Self::StrictEq => value == expected,
            Self::Ne => !loose_eq(value, expected),
            Self::StrictNe => value != expected,
            Self::Gt => compare(value, expected) == Some(Ordering::Greater),
            Self::Ge => matches!(compare(value, expected), Some(Ordering::Greater | Ordering::Equal)),
            Self::Lt => compare(value, expected) == Some(Ordering::Less),
            Self::Le => matches!(compare(value, expected), Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

fn compare(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}

/// Compares the value with a fixed value or with another attribute
/// (`<attribute>_repeat` unless configured).
#[derive(Debug, Clone)]
pub struct CompareValidator {
    options: ValidatorOptions,
    compare_attribute: Option<String>,
    compare_value: Option<JsonValue>,
    operator: CompareOperator,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CompareParams {
    compare_attribute: Option<String>,
    compare_value: Option<JsonValue>,
    operator: CompareOperator,
}

impl CompareValidator {
    /// Compare with `<attribute>_repeat` for equality.
    pub fn new(options: ValidatorOptions) -> Self {
        Self {
            options,
            compare_attribute: None,
            compare_value: None,
            operator: CompareOperator::Eq,
        }
    }

    /// Compare with a fixed value.
    pub fn with_value(mut self, value: JsonValue) -> Self {
        self.compare_value = Some(value);
        self
    }

    /// Compare with another attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.compare_attribute = Some(attribute.into());
        self
    }

    /// Set the comparison.
    pub fn with_operator(mut self, operator: CompareOperator) -> Self {
        self.operator = operator;
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: CompareParams = parse_params("compare", params)?;
        Ok(Self {
            options,
            compare_attribute: parsed.compare_attribute,
            compare_value: parsed.compare_value.filter(|v| !v.is_null()),
            operator: parsed.operator,
        })
    }
}

impl Validator for CompareValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let value = json_of(model, attribute);
        if value.is_array() {
            report_error(model, attribute, "{attribute} is invalid.", &[]);
            return done();
        }

        let (expected, label) = match &self.compare_value {
            Some(expected) => (expected.clone(), stringify(expected)),
            None => {
                let other = self
                    .compare_attribute
                    .clone()
                    .unwrap_or_else(|| format!("{attribute}_repeat"));
                (json_of(model, &other), model.attribute_label(&other))
            }
        };

        if !self.operator.holds(&value, &expected) {
            let template = self
                .options
                .message_or("{attribute} must satisfy `{operator}` against \"{compareAttribute}\".");
            report_error(
                model,
                attribute,
                &template,
                &[
                    ("compareAttribute", label),
                    ("compareValue", stringify(&expected)),
                    ("operator", self.operator.symbol().to_string()),
                ],
            );
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

    fn form(values: JsonValue) -> Model {
        let schema = ModelSchema::builder("Form")
            .attributes(["status", "password", "password_repeat", "age"])
            .build()
            .unwrap();
        Model::with_values(schema, &values).unwrap()
    }

    fn run(validator: &dyn Validator, model: &Model, attribute: &str) -> Vec<String> {
        let _ = validator.validate_attribute(model, attribute).now_or_never();
        model.errors_for(attribute)
    }

    #[test]
    fn test_range() {
        let validator =
            RangeValidator::from_params(ValidatorOptions::new(["status"]), &json!({"range": [1, 2]})).unwrap();
        assert!(run(&validator, &form(json!({"status": "2"})), "status").is_empty());
        assert_eq!(run(&validator, &form(json!({"status": 3})), "status"), vec!["Status is invalid."]);

        let strict = validator.clone().strict(true);
        assert!(!run(&strict, &form(json!({"status": "2"})), "status").is_empty());

        let not = RangeValidator::new(ValidatorOptions::new(["status"]), vec![json!(1)]).not(true);
        assert!(!run(&not, &form(json!({"status": 1})), "status").is_empty());

        assert!(RangeValidator::from_params(ValidatorOptions::default(), &json!({})).is_err());
    }

    #[test]
    fn test_boolean() {
        let validator = BooleanValidator::new(ValidatorOptions::new(["status"]));
        assert!(run(&validator, &form(json!({"status": true})), "status").is_empty());
        assert!(run(&validator, &form(json!({"status": 0})), "status").is_empty());
        assert_eq!(
            run(&validator, &form(json!({"status": "yes"})), "status"),
            vec!["Status must be either \"1\" or \"0\"."]
        );
    }

    #[test]
    fn test_compare_with_repeat_attribute() {
        let validator = CompareValidator::new(ValidatorOptions::new(["password"]));
        let ok = form(json!({"password": "secret", "password_repeat": "secret"}));
        assert!(run(&validator, &ok, "password").is_empty());

        let bad = form(json!({"password": "secret", "password_repeat": "other"}));
        assert_eq!(run(&validator, &bad, "password").len(), 1);
    }

    #[test]
    fn test_compare_operators() {
        let validator = CompareValidator::from_params(
            ValidatorOptions::new(["age"]),
            &json!({"compareValue": 18, "operator": ">="}),
        )
        .unwrap();
        assert!(run(&validator, &form(json!({"age": 21})), "age").is_empty());
        assert_eq!(run(&validator, &form(json!({"age": "17"})), "age").len(), 1);
    }
}
