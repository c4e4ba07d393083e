//! Model schemas: attribute sets, primary keys, relations and rules.
//!
//! A [`ModelSchema`] describes one kind of model. It is built once through
//! [`ModelSchema::builder`] (or [`ModelSchema::from_json`]) and shared by
//! every model instance of that kind. Schemas also act as the
//! [`ModelFactory`] that collections use to coerce raw data into records.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use horizon_data_core::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::model::Model;
use crate::validators::{self, InlineMethod, InlineValidator, Validator, ValidatorOptions};

/// Name of the scenario every model starts in.
pub const DEFAULT_SCENARIO: &str = "default";

/// Creates records from raw data.
///
/// Collections hold an `Arc<dyn ModelFactory>` to turn plain JSON entries
/// into [`Model`] records.
pub trait ModelFactory: Send + Sync {
    /// Construct a model populated from `data`.
    fn instantiate(&self, data: &JsonValue) -> Result<Model>;

    /// Primary key attribute names of the produced records.
    fn primary_key(&self) -> &[String];

    /// Human-readable name for diagnostics.
    fn name(&self) -> &str;
}

/// Value type an attribute is coerced to on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Stored as given.
    #[default]
    Any,
    /// Coerced to a string.
    String,
    /// Coerced to a number.
    Number,
    /// Coerced to a boolean.
    Boolean,
}

impl AttributeType {
    /// Map a column type name (`"string"`, `"integer"`, `"boolean"`, ...).
    pub fn from_column_type(name: &str) -> Self {
        match name {
            "string" | "text" | "char" | "binary" => Self::String,
            "integer" | "bigint" | "smallint" | "float" | "double" | "decimal" | "number" => Self::Number,
            "boolean" => Self::Boolean,
            _ => Self::Any,
        }
    }

    /// Coerce `value` to this type.
    ///
    /// Empty strings become null for every non-string type.
    pub fn typecast(self, value: JsonValue) -> JsonValue {
        if self != Self::String && self != Self::Any && value == JsonValue::String(String::new()) {
            return JsonValue::Null;
        }
        if value.is_null() {
            return value;
        }
        match (self, value) {
            (Self::Any, value) => value,
            (Self::String, JsonValue::String(s)) => JsonValue::String(s),
            (Self::String, other) => JsonValue::String(crate::identity::stringify(&other)),
            (Self::Number, JsonValue::Number(n)) => JsonValue::Number(n),
            (Self::Number, JsonValue::Bool(b)) => JsonValue::from(i64::from(b)),
            (Self::Number, JsonValue::String(s)) => parse_number(&s),
            (Self::Number, _) => JsonValue::Null,
            (Self::Boolean, JsonValue::Bool(b)) => JsonValue::Bool(b),
            (Self::Boolean, other) => JsonValue::Bool(is_truthy(&other)),
        }
    }
}

fn parse_number(text: &str) -> JsonValue {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return JsonValue::from(int);
    }
    match text.parse::<f64>() {
        Ok(float) if float.is_finite() => {
            if float.fract() == 0.0 && float.abs() < i64::MAX as f64 {
                JsonValue::from(float as i64)
            } else {
                JsonValue::from(float)
            }
        }
        _ => JsonValue::Null,
    }
}

pub(crate) fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// What an attribute holds.
#[derive(Clone)]
pub enum AttributeKind {
    /// Plain data.
    Value,
    /// A single sub-model of the given schema.
    HasOne(Arc<ModelSchema>),
    /// A sub-collection of records of the given schema.
    HasMany(Arc<ModelSchema>),
}

impl fmt::Debug for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value => write!(f, "Value"),
            Self::HasOne(schema) => write!(f, "HasOne({})", schema.name()),
            Self::HasMany(schema) => write!(f, "HasMany({})", schema.name()),
        }
    }
}

/// Declaration of one attribute.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    /// Attribute name.
    pub name: String,
    /// Display label used in validation messages.
    pub label: Option<String>,
    /// Initial value for new models.
    pub default: JsonValue,
    /// Coercion applied on write.
    pub ty: AttributeType,
    /// Plain value or relation.
    pub kind: AttributeKind,
}

impl AttributeSchema {
    /// A plain attribute with a null default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            default: JsonValue::Null,
            ty: AttributeType::Any,
            kind: AttributeKind::Value,
        }
    }

    /// Set the label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = default;
        self
    }

    /// Set the coercion type.
    pub fn with_type(mut self, ty: AttributeType) -> Self {
        self.ty = ty;
        self
    }

    /// Whether this attribute links a sub-model or sub-collection.
    pub fn is_relation(&self) -> bool {
        !matches!(self.kind, AttributeKind::Value)
    }
}

/// Hook run before validators; returning `false` skips validation.
pub type BeforeValidate = Arc<dyn Fn(&Model) -> bool + Send + Sync>;
/// Hook run after validators.
pub type AfterValidate = Arc<dyn Fn(&Model) + Send + Sync>;
/// Hook run for every unsafe attribute skipped by mass assignment.
pub type UnsafeAttributeHook = Arc<dyn Fn(&Model, &str, &JsonValue) + Send + Sync>;

/// Shared description of a model kind.
pub struct ModelSchema {
    name: String,
    attributes: IndexMap<String, AttributeSchema>,
    primary_key: Vec<String>,
    validators: Vec<Arc<dyn Validator>>,
    scenarios: IndexMap<String, Vec<String>>,
    before_validate: Option<BeforeValidate>,
    after_validate: Option<AfterValidate>,
    on_unsafe_attribute: Option<UnsafeAttributeHook>,
    this: Weak<ModelSchema>,
}

impl ModelSchema {
    /// Start building a schema.
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(name)
    }

    /// Build a schema from a declarative JSON description:
    ///
    /// ```json
    /// {"schemaName": "Article", "primaryKey": ["id"],
    ///  "columns": {"id": "integer", "title": {"type": "string", "defaultValue": ""}}}
    /// ```
    pub fn from_json(description: &JsonValue) -> Result<Arc<ModelSchema>> {
        let description: SchemaDescription = serde_json::from_value(description.clone())
            .map_err(|e| Error::invalid_config(format!("Invalid schema description: {e}")))?;

        let mut builder = ModelSchema::builder(description.schema_name);
        for (name, column) in description.columns {
            let attribute = match column {
                ColumnDescription::Type(ty) => {
                    AttributeSchema::new(name).with_type(AttributeType::from_column_type(&ty))
                }
                ColumnDescription::Full {
                    ty,
                    js_type,
                    default_value,
                    label,
                } => {
                    let mut attribute = AttributeSchema::new(name).with_default(default_value);
                    attribute.ty = js_type.unwrap_or_else(|| {
                        ty.as_deref().map(AttributeType::from_column_type).unwrap_or_default()
                    });
                    attribute.label = label;
                    attribute
                }
            };
            builder = builder.attribute_schema(attribute);
        }
        builder.primary_key(description.primary_key).build()
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute declarations in order.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.values()
    }

    /// Attribute names in order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    /// One attribute declaration.
    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Whether the schema declares `name`.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Primary key attribute names (possibly empty).
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Validators built from the rules.
    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        &self.validators
    }

    /// Scenario name to the attributes validated in it. Always contains
    /// [`DEFAULT_SCENARIO`]. Names may carry a `!` prefix (validated but
    /// not safe for mass assignment).
    pub fn scenarios(&self) -> &IndexMap<String, Vec<String>> {
        &self.scenarios
    }

    /// Label of an attribute: the declared one or a humanized name.
    pub fn attribute_label(&self, name: &str) -> String {
        self.attributes
            .get(name)
            .and_then(|a| a.label.clone())
            .unwrap_or_else(|| humanize(name))
    }

    pub(crate) fn before_validate(&self) -> Option<&BeforeValidate> {
        self.before_validate.as_ref()
    }

    pub(crate) fn after_validate(&self) -> Option<&AfterValidate> {
        self.after_validate.as_ref()
    }

    pub(crate) fn on_unsafe_attribute(&self) -> Option<&UnsafeAttributeHook> {
        self.on_unsafe_attribute.as_ref()
    }

    /// The shared handle for this schema.
    pub fn handle(&self) -> Result<Arc<ModelSchema>> {
        self.this
            .upgrade()
            .ok_or_else(|| Error::invalid_config(format!("Schema `{}` is being dropped", self.name)))
    }
}

impl ModelFactory for ModelSchema {
    fn instantiate(&self, data: &JsonValue) -> Result<Model> {
        Model::with_values(self.handle()?, data)
    }

    fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ModelSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSchema")
            .field("name", &self.name)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("primary_key", &self.primary_key)
            .field("validators", &self.validators.len())
            .finish()
    }
}

/// `first_name` and `firstName` both become `First Name`.
fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' || c == '-' || c == ' ' || c == '.' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .iter()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compute scenario membership from validator `on`/`except` lists.
fn compute_scenarios(validators: &[Arc<dyn Validator>]) -> IndexMap<String, Vec<String>> {
    let mut scenarios: IndexMap<String, Vec<String>> = IndexMap::new();
    scenarios.insert(DEFAULT_SCENARIO.to_string(), Vec::new());

    for validator in validators {
        let options = validator.options();
        for name in options.on.iter().chain(options.except.iter()) {
            scenarios.entry(name.clone()).or_default();
        }
    }
    let names: Vec<String> = scenarios.keys().cloned().collect();

    for validator in validators {
        let options = validator.options();
        let targets = if options.on.is_empty() { &names } else { &options.on };
        for name in targets {
            if options.except.contains(name) {
                continue;
            }
            let members = scenarios.entry(name.clone()).or_default();
            for attribute in &options.attributes {
                if !members.contains(attribute) {
                    members.push(attribute.clone());
                }
            }
        }
    }

    scenarios
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaDescription {
    #[serde(default)]
    schema_name: String,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    columns: IndexMap<String, ColumnDescription>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnDescription {
    Type(String),
    #[serde(rename_all = "camelCase")]
    Full {
        #[serde(rename = "type", default)]
        ty: Option<String>,
        #[serde(default)]
        js_type: Option<AttributeType>,
        #[serde(default)]
        default_value: JsonValue,
        #[serde(default)]
        label: Option<String>,
    },
}

enum RuleSpec {
    Named {
        attributes: Vec<String>,
        kind: String,
        params: JsonValue,
    },
    Validator(Arc<dyn Validator>),
}

/// Builder for [`ModelSchema`].
///
/// # Example
///
/// ```
/// use horizon_data::schema::ModelSchema;
/// use serde_json::json;
///
/// let schema = ModelSchema::builder("SampleModel")
///     .attributes(["uid", "name", "description"])
///     .primary_key(["uid"])
///     .rule(["name"], "required", json!({"on": "insert"}))
///     .rule(["description"], "string", json!({"on": ["insert", "update"], "max": 10}))
///     .build()
///     .unwrap();
/// assert_eq!(schema.primary_key(), ["uid"]);
/// ```
pub struct ModelSchemaBuilder {
    name: String,
    attributes: IndexMap<String, AttributeSchema>,
    primary_key: Vec<String>,
    rules: Vec<RuleSpec>,
    methods: HashMap<String, InlineMethod>,
    before_validate: Option<BeforeValidate>,
    after_validate: Option<AfterValidate>,
    on_unsafe_attribute: Option<UnsafeAttributeHook>,
}

impl ModelSchemaBuilder {
    /// Create a builder for a schema called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            primary_key: Vec::new(),
            rules: Vec::new(),
            methods: HashMap::new(),
            before_validate: None,
            after_validate: None,
            on_unsafe_attribute: None,
        }
    }

    /// Declare a plain attribute.
    pub fn attribute(self, name: impl Into<String>) -> Self {
        self.attribute_schema(AttributeSchema::new(name))
    }

    /// Declare several plain attributes.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self = self.attribute(name);
        }
        self
    }

    /// Declare an attribute from a full description.
    pub fn attribute_schema(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.insert(attribute.name.clone(), attribute);
        self
    }

    /// Declare a plain attribute with a default value.
    pub fn attribute_with_default(self, name: impl Into<String>, default: JsonValue) -> Self {
        self.attribute_schema(AttributeSchema::new(name).with_default(default))
    }

    /// Declare a sub-model attribute.
    pub fn has_one(self, name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        let mut attribute = AttributeSchema::new(name);
        attribute.kind = AttributeKind::HasOne(schema);
        self.attribute_schema(attribute)
    }

    /// Declare a sub-collection attribute.
    pub fn has_many(self, name: impl Into<String>, schema: Arc<ModelSchema>) -> Self {
        let mut attribute = AttributeSchema::new(name);
        attribute.kind = AttributeKind::HasMany(schema);
        self.attribute_schema(attribute)
    }

    /// Set the label of an already declared attribute.
    pub fn label(mut self, name: &str, label: impl Into<String>) -> Self {
        if let Some(attribute) = self.attributes.get_mut(name) {
            attribute.label = Some(label.into());
        }
        self
    }

    /// Set the primary key attribute names.
    pub fn primary_key<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a declarative rule: attribute names, validator kind (a built-in
    /// name or a method registered with [`method`](Self::method)), and JSON
    /// params such as `{"on": "insert", "max": 10}`.
    pub fn rule<I, S>(mut self, attributes: I, kind: impl Into<String>, params: JsonValue) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(RuleSpec::Named {
            attributes: attributes.into_iter().map(Into::into).collect(),
            kind: kind.into(),
            params,
        });
        self
    }

    /// Add a ready-made validator.
    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.rules.push(RuleSpec::Validator(validator));
        self
    }

    /// Register an async validation method usable as a rule kind.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(Model, String, JsonValue) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Hook run before validation.
    pub fn before_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) -> bool + Send + Sync + 'static,
    {
        self.before_validate = Some(Arc::new(hook));
        self
    }

    /// Hook run after validation.
    pub fn after_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model) + Send + Sync + 'static,
    {
        self.after_validate = Some(Arc::new(hook));
        self
    }

    /// Replace the default handling (a warning) of unsafe attributes
    /// skipped during mass assignment.
    pub fn on_unsafe_attribute<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Model, &str, &JsonValue) + Send + Sync + 'static,
    {
        self.on_unsafe_attribute = Some(Arc::new(hook));
        self
    }

    /// Finish the schema.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if a primary key names an undeclared
    /// attribute or a rule names an unknown validator kind.
    pub fn build(self) -> Result<Arc<ModelSchema>> {
        for key in &self.primary_key {
            if !self.attributes.contains_key(key) {
                return Err(Error::invalid_config(format!(
                    "Primary key `{key}` is not an attribute of `{}`",
                    self.name
                )));
            }
        }

        let mut validators = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            match rule {
                RuleSpec::Validator(validator) => validators.push(validator),
                RuleSpec::Named {
                    attributes,
                    kind,
                    params,
                } => {
                    let validator = match self.methods.get(&kind) {
                        Some(method) => {
                            let options = ValidatorOptions::from_params(attributes, &params)?;
                            Arc::new(InlineValidator::from_method(options, method.clone(), params))
                                as Arc<dyn Validator>
                        }
                        None => validators::create(&kind, attributes, &params)?,
                    };
                    validators.push(validator);
                }
            }
        }

        let scenarios = compute_scenarios(&validators);
        let name = self.name;
        let attributes = self.attributes;
        let primary_key = self.primary_key;
        let before_validate = self.before_validate;
        let after_validate = self.after_validate;
        let on_unsafe_attribute = self.on_unsafe_attribute;

        Ok(Arc::new_cyclic(|this| ModelSchema {
            name,
            attributes,
            primary_key,
            validators,
            scenarios,
            before_validate,
            after_validate,
            on_unsafe_attribute,
            this: this.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typecast() {
        assert_eq!(AttributeType::Number.typecast(json!("")), JsonValue::Null);
        assert_eq!(AttributeType::String.typecast(json!("")), json!(""));
        assert_eq!(AttributeType::Number.typecast(json!("42")), json!(42));
        assert_eq!(AttributeType::Number.typecast(json!("2.5")), json!(2.5));
        assert_eq!(AttributeType::Number.typecast(json!("abc")), JsonValue::Null);
        assert_eq!(AttributeType::Number.typecast(json!(true)), json!(1));
        assert_eq!(AttributeType::String.typecast(json!(15)), json!("15"));
        assert_eq!(AttributeType::Boolean.typecast(json!(0)), json!(false));
        assert_eq!(AttributeType::Boolean.typecast(json!("yes")), json!(true));
        assert_eq!(AttributeType::Any.typecast(json!([1])), json!([1]));
    }

    #[test]
    fn test_humanize_labels() {
        assert_eq!(humanize("name"), "Name");
        assert_eq!(humanize("first_name"), "First Name");
        assert_eq!(humanize("userId"), "User Id");
    }

    #[test]
    fn test_scenarios_from_rules() {
        let schema = ModelSchema::builder("SampleModel")
            .attributes(["uid", "name", "description"])
            .rule(["name"], "required", json!({"on": "insert"}))
            .rule(["description"], "string", json!({"on": ["insert", "update"], "max": 10}))
            .rule(["uid"], "safe", json!({"except": "update"}))
            .build()
            .unwrap();

        let scenarios = schema.scenarios();
        assert_eq!(scenarios.keys().collect::<Vec<_>>(), vec!["default", "insert", "update"]);
        assert_eq!(scenarios["insert"], vec!["name", "description", "uid"]);
        assert_eq!(scenarios["update"], vec!["description"]);
        assert_eq!(scenarios["default"], vec!["uid"]);
    }

    #[test]
    fn test_build_rejects_unknown_primary_key() {
        let result = ModelSchema::builder("Broken").attribute("name").primary_key(["id"]).build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_build_rejects_unknown_rule_kind() {
        let result = ModelSchema::builder("Broken")
            .attribute("name")
            .rule(["name"], "telepathy", json!({}))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_json_columns() {
        let schema = ModelSchema::from_json(&json!({
            "schemaName": "Article",
            "primaryKey": ["id"],
            "columns": {
                "id": "integer",
                "title": {"type": "string", "defaultValue": "Untitled", "label": "Headline"},
                "published": {"jsType": "boolean"}
            }
        }))
        .unwrap();

        assert_eq!(schema.name(), "Article");
        assert_eq!(schema.attribute_names(), vec!["id", "title", "published"]);
        assert_eq!(schema.attribute("id").unwrap().ty, AttributeType::Number);
        assert_eq!(schema.attribute("title").unwrap().default, json!("Untitled"));
        assert_eq!(schema.attribute_label("title"), "Headline");
        assert_eq!(schema.attribute("published").unwrap().ty, AttributeType::Boolean);
    }

    #[test]
    fn test_schema_instantiates_models() {
        let schema = ModelSchema::builder("User")
            .attributes(["id", "name"])
            .primary_key(["id"])
            .build()
            .unwrap();
        let model = schema.instantiate(&json!({"id": 3, "name": "Ivan"})).unwrap();
        assert_eq!(model.get_json("name"), Some(json!("Ivan")));
        assert_eq!(ModelFactory::primary_key(schema.as_ref()), ["id"]);
    }
}
