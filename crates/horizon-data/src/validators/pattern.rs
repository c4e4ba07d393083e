//! Regular-expression validators.

use futures_util::future::BoxFuture;
use horizon_data_core::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions, done, json_of, parse_params, report_error};
use crate::model::Model;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?$";
const EMAIL_WITH_NAME_PATTERN: &str = r"^[^@]*<[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-zA-Z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?>$";
const MAX_EMAIL_LENGTH: usize = 320;
const MAX_URL_LENGTH: usize = 2000;

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::invalid_config(format!("Invalid pattern `{pattern}`: {e}")))
}

/// Accept `/body/flags` literals as well as bare patterns. Only the `i`,
/// `m` and `s` flags are meaningful; others are ignored.
fn compile_literal(pattern: &str) -> Result<Regex> {
    if let Some(rest) = pattern.strip_prefix('/') {
        if let Some(end) = rest.rfind('/') {
            let (body, flags) = (&rest[..end], &rest[end + 1..]);
            let inline: String = flags.chars().filter(|f| matches!(f, 'i' | 'm' | 's')).collect();
            return if inline.is_empty() {
                compile(body)
            } else {
                compile(&format!("(?{inline}){body}"))
            };
        }
    }
    compile(pattern)
}

/// Requires the value to match `pattern` (or, with `not`, not to match).
#[derive(Debug, Clone)]
pub struct MatchValidator {
    options: ValidatorOptions,
    pattern: Regex,
    not: bool,
}

#[derive(Deserialize)]
struct MatchParams {
    pattern: String,
    #[serde(default)]
    not: bool,
}

impl MatchValidator {
    /// A validator requiring `pattern` to match.
    pub fn new(options: ValidatorOptions, pattern: Regex) -> Self {
        Self {
            options,
            pattern,
            not: false,
        }
    }

    /// Invert the check.
    pub fn not(mut self, not: bool) -> Self {
        self.not = not;
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        if params.get("pattern").is_none_or(|p| !p.is_string()) {
            return Err(Error::invalid_config("The `pattern` property must be set."));
        }
        let parsed: MatchParams = parse_params("match", params)?;
        Ok(Self::new(options, compile_literal(&parsed.pattern)?).not(parsed.not))
    }
}

impl Validator for MatchValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let is_match = match json_of(model, attribute) {
            JsonValue::String(s) => self.pattern.is_match(&s),
            JsonValue::Null => false,
            other => self.pattern.is_match(&other.to_string()),
        };
        if is_match == self.not {
            report_error(model, attribute, &self.options.message_or("{attribute} is invalid."), &[]);
        }
        done()
    }
}

/// Requires a valid email address, optionally in `Name <address>` form.
#[derive(Debug, Clone)]
pub struct EmailValidator {
    options: ValidatorOptions,
    pattern: Regex,
    full_pattern: Regex,
    allow_name: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct EmailParams {
    allow_name: bool,
}

impl EmailValidator {
    /// A validator for bare addresses.
    pub fn new(options: ValidatorOptions) -> Result<Self> {
        Ok(Self {
            options,
            pattern: compile(EMAIL_PATTERN)?,
            full_pattern: compile(EMAIL_WITH_NAME_PATTERN)?,
            allow_name: false,
        })
    }

    /// Also accept `Name <address>`.
    pub fn allow_name(mut self, allow: bool) -> Self {
        self.allow_name = allow;
        self
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: EmailParams = parse_params("email", params)?;
        Ok(Self::new(options)?.allow_name(parsed.allow_name))
    }

    fn accepts(&self, value: &JsonValue) -> bool {
        let JsonValue::String(value) = value else {
            return false;
        };
        if value.len() > MAX_EMAIL_LENGTH {
            return false;
        }
        self.pattern.is_match(value) || (self.allow_name && self.full_pattern.is_match(value))
    }
}

impl Validator for EmailValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        if !self.accepts(&json_of(model, attribute)) {
            report_error(
                model,
                attribute,
                &self.options.message_or("{attribute} is not a valid email address."),
                &[],
            );
        }
        done()
    }
}

/// Requires an absolute URL with one of the allowed schemes. With a
/// `default_scheme`, scheme-less values are accepted and rewritten.
#[derive(Debug, Clone)]
pub struct UrlValidator {
    options: ValidatorOptions,
    pattern: Regex,
    default_scheme: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UrlParams {
    valid_schemes: Vec<String>,
    default_scheme: Option<String>,
}

impl Default for UrlParams {
    fn default() -> Self {
        Self {
            valid_schemes: vec!["http".to_string(), "https".to_string()],
            default_scheme: None,
        }
    }
}

impl UrlValidator {
    /// A validator for `http`/`https` URLs.
    pub fn new(options: ValidatorOptions) -> Result<Self> {
        let defaults = UrlParams::default();
        Self::with_schemes(options, &defaults.valid_schemes, None)
    }

    fn with_schemes(options: ValidatorOptions, schemes: &[String], default_scheme: Option<String>) -> Result<Self> {
        let schemes = schemes.iter().map(|s| regex::escape(s)).collect::<Vec<_>>().join("|");
        Ok(Self {
            options,
            pattern: compile(&format!(
                r"(?i)^({schemes})://(([A-Z0-9][A-Z0-9_-]*)(\.[A-Z0-9][A-Z0-9_-]*)+)"
            ))?,
            default_scheme,
        })
    }

    pub(super) fn from_params(options: ValidatorOptions, params: &JsonValue) -> Result<Self> {
        let parsed: UrlParams = parse_params("url", params)?;
        Self::with_schemes(options, &parsed.valid_schemes, parsed.default_scheme)
    }

    fn normalize(&self, value: &str) -> String {
        match &self.default_scheme {
            Some(scheme) if !value.contains("://") => format!("{scheme}://{value}"),
            _ => value.to_string(),
        }
    }
}

impl Validator for UrlValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        let normalized = match json_of(model, attribute) {
            JsonValue::String(value) if value.len() <= MAX_URL_LENGTH => {
                let normalized = self.normalize(&value);
                self.pattern.is_match(&normalized).then_some((value, normalized))
            }
            _ => None,
        };
        match normalized {
            None => report_error(model, attribute, &self.options.message_or("{attribute} is not a valid URL."), &[]),
            Some((value, normalized)) if value != normalized => {
                if let Err(e) = model.set(attribute, normalized) {
                    tracing::warn!(
                        target: horizon_data_core::logging::targets::VALIDATION,
                        error = %e,
                        attribute,
                        "failed to apply default scheme"
                    );
                }
            }
            Some(_) => {}
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

    fn run(validator: &dyn Validator, value: JsonValue) -> (Model, Vec<String>) {
        let schema = ModelSchema::builder("Contact").attribute("field").build().unwrap();
        let model = Model::with_values(schema, &json!({ "field": value })).unwrap();
        let _ = validator.validate_attribute(&model, "field").now_or_never();
        let errors = model.errors_for("field");
        (model, errors)
    }

    #[test]
    fn test_email() {
        let validator = EmailValidator::new(ValidatorOptions::new(["field"])).unwrap();
        assert!(run(&validator, json!("ivan@example.com")).1.is_empty());
        assert_eq!(run(&validator, json!("not-an-email")).1, vec!["Field is not a valid email address."]);
        assert!(!run(&validator, json!("Ivan <ivan@example.com>")).1.is_empty());

        let named = validator.clone().allow_name(true);
        assert!(run(&named, json!("Ivan <ivan@example.com>")).1.is_empty());
    }

    #[test]
    fn test_match_literal_and_not() {
        let validator =
            MatchValidator::from_params(ValidatorOptions::new(["field"]), &json!({"pattern": "/^[a-z]+$/i"})).unwrap();
        assert!(run(&validator, json!("Hello")).1.is_empty());
        assert_eq!(run(&validator, json!("hello world")).1, vec!["Field is invalid."]);

        let inverted = validator.clone().not(true);
        assert!(!run(&inverted, json!("Hello")).1.is_empty());
        assert!(MatchValidator::from_params(ValidatorOptions::default(), &json!({})).is_err());
    }

    #[test]
    fn test_url_default_scheme() {
        let validator =
            UrlValidator::from_params(ValidatorOptions::new(["field"]), &json!({"defaultScheme": "https"})).unwrap();
        let (model, errors) = run(&validator, json!("example.com/path"));
        assert!(errors.is_empty());
        assert_eq!(model.get_json("field"), Some(json!("https://example.com/path")));

        let strict = UrlValidator::new(ValidatorOptions::new(["field"])).unwrap();
        assert_eq!(run(&strict, json!("ftp://example.com")).1, vec!["Field is not a valid URL."]);
    }
}
