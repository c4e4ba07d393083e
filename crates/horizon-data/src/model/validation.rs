//! Scenarios, validation and the per-attribute error list.

use std::sync::Arc;

use futures_util::future::join_all;
use horizon_data_core::logging::{span_names, targets};
use horizon_data_core::{Error, Result};
use indexmap::IndexMap;
use tracing::Instrument;

use super::Model;
use crate::validators::Validator;

impl Model {
    /// The active scenario.
    pub fn scenario(&self) -> String {
        self.inner.state.lock().scenario.clone()
    }

    /// Switch scenario.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParam`] if no rule declares `scenario`.
    pub fn set_scenario(&self, scenario: &str) -> Result<()> {
        if !self.inner.schema.scenarios().contains_key(scenario) {
            return Err(Error::invalid_param(format!("Unknown scenario `{scenario}`.")));
        }
        self.inner.state.lock().scenario = scenario.to_string();
        Ok(())
    }

    /// Scenario name to attribute names, as derived from the rules.
    pub fn scenarios(&self) -> &IndexMap<String, Vec<String>> {
        self.inner.schema.scenarios()
    }

    /// Attributes that may be mass-assigned in the current scenario.
    pub fn safe_attributes(&self) -> Vec<String> {
        self.scenario_attributes()
            .into_iter()
            .filter(|name| !name.starts_with('!'))
            .collect()
    }

    /// Attributes validated in the current scenario.
    pub fn active_attributes(&self) -> Vec<String> {
        self.scenario_attributes()
            .into_iter()
            .map(|name| name.trim_start_matches('!').to_string())
            .collect()
    }

    fn scenario_attributes(&self) -> Vec<String> {
        let scenario = self.scenario();
        self.inner.schema.scenarios().get(&scenario).cloned().unwrap_or_default()
    }

    /// Every validator of the schema.
    pub fn validators(&self) -> &[Arc<dyn Validator>] {
        self.inner.schema.validators()
    }

    /// Validators active in the current scenario, optionally only those
    /// covering `attribute`.
    pub fn active_validators(&self, attribute: Option<&str>) -> Vec<Arc<dyn Validator>> {
        let scenario = self.scenario();
        self.validators()
            .iter()
            .filter(|v| v.is_active(&scenario))
            .filter(|v| attribute.is_none_or(|a| v.options().attribute_names().any(|name| name == a)))
            .cloned()
            .collect()
    }

    /// Run the active validators.
    ///
    /// `attributes` limits validation to those names (default: every active
    /// attribute). Validators run concurrently and are all awaited. Returns
    /// `true` if the model has no errors afterwards; a `before_validate`
    /// hook returning `false` aborts validation and yields `false`.
    pub async fn validate(&self, attributes: Option<&[&str]>, clear_errors: bool) -> bool {
        let attributes: Vec<String> = match attributes {
            Some(names) => names.iter().map(|n| n.to_string()).collect(),
            None => self.active_attributes(),
        };
        if clear_errors {
            self.clear_errors(None);
        }

        if let Some(hook) = self.inner.schema.before_validate() {
            if !hook(self) {
                tracing::debug!(target: targets::VALIDATION, model = %self, "validation skipped by hook");
                return false;
            }
        }

        let validators = self.active_validators(None);
        tracing::trace!(
            target: targets::VALIDATION,
            model = %self,
            validators = validators.len(),
            attributes = ?attributes,
            "validating"
        );
        let span = tracing::debug_span!(target: targets::VALIDATION, "validate", operation = span_names::VALIDATE, model = %self);
        join_all(validators.iter().map(|v| v.validate(self, &attributes)))
            .instrument(span)
            .await;

        if let Some(hook) = self.inner.schema.after_validate() {
            hook(self);
        }
        !self.has_errors(None)
    }

    /// Append an error message for `attribute`.
    pub fn add_error(&self, attribute: &str, message: impl Into<String>) {
        self.inner
            .state
            .lock()
            .errors
            .entry(attribute.to_string())
            .or_default()
            .push(message.into());
    }

    /// Every attribute's error messages.
    pub fn errors(&self) -> IndexMap<String, Vec<String>> {
        self.inner.state.lock().errors.clone()
    }

    /// Error messages of one attribute.
    pub fn errors_for(&self, attribute: &str) -> Vec<String> {
        self.inner.state.lock().errors.get(attribute).cloned().unwrap_or_default()
    }

    /// The first error message of one attribute.
    pub fn first_error(&self, attribute: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .errors
            .get(attribute)
            .and_then(|messages| messages.first().cloned())
    }

    /// The first error message of every attribute that has one.
    pub fn first_errors(&self) -> IndexMap<String, String> {
        self.inner
            .state
            .lock()
            .errors
            .iter()
            .filter_map(|(name, messages)| messages.first().map(|m| (name.clone(), m.clone())))
            .collect()
    }

    /// Whether there are errors (for one attribute, or at all).
    pub fn has_errors(&self, attribute: Option<&str>) -> bool {
        let state = self.inner.state.lock();
        match attribute {
            Some(name) => state.errors.get(name).is_some_and(|m| !m.is_empty()),
            None => state.errors.values().any(|m| !m.is_empty()),
        }
    }

    /// Drop errors (for one attribute, or all of them).
    pub fn clear_errors(&self, attribute: Option<&str>) {
        let mut state = self.inner.state.lock();
        match attribute {
            Some(name) => {
                state.errors.shift_remove(name);
            }
            None => state.errors.clear(),
        }
    }

    /// Whether an active validator requires `attribute`.
    pub fn is_attribute_required(&self, attribute: &str) -> bool {
        self.active_validators(Some(attribute)).iter().any(|v| v.is_required())
    }

    /// Whether `attribute` may be mass-assigned in the current scenario.
    pub fn is_attribute_safe(&self, attribute: &str) -> bool {
        self.safe_attributes().iter().any(|a| a == attribute)
    }

    /// Whether `attribute` is validated in the current scenario.
    pub fn is_attribute_active(&self, attribute: &str) -> bool {
        self.active_attributes().iter().any(|a| a == attribute)
    }

    /// Display label of `attribute`.
    pub fn attribute_label(&self, attribute: &str) -> String {
        self.inner.schema.attribute_label(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use serde_json::json;

    fn sample() -> Model {
        let schema = ModelSchema::builder("SampleModel")
            .attributes(["uid", "name", "description"])
            .primary_key(["uid"])
            .rule(["name"], "required", json!({"on": "insert"}))
            .rule(["description"], "string", json!({"on": ["insert", "update"], "max": 10}))
            .rule(["!uid"], "safe", json!({"except": "update"}))
            .build()
            .unwrap();
        Model::new(schema)
    }

    #[test]
    fn test_scenario_attributes() {
        let model = sample();
        assert_eq!(model.scenario(), "default");
        assert_eq!(model.active_attributes(), vec!["uid"]);
        assert!(model.safe_attributes().is_empty());

        model.set_scenario("insert").unwrap();
        assert_eq!(model.active_attributes(), vec!["name", "description", "uid"]);
        assert_eq!(model.safe_attributes(), vec!["name", "description"]);
        assert!(model.is_attribute_required("name"));
        assert!(!model.is_attribute_required("description"));
        assert!(model.is_attribute_active("uid"));
        assert!(!model.is_attribute_safe("uid"));

        assert!(matches!(model.set_scenario("archive"), Err(Error::InvalidParam(_))));
    }

    #[test]
    fn test_errors_api() {
        let model = sample();
        model.add_error("name", "first");
        model.add_error("name", "second");
        model.add_error("uid", "bad");

        assert!(model.has_errors(None));
        assert!(model.has_errors(Some("uid")));
        assert_eq!(model.errors_for("name"), vec!["first", "second"]);
        assert_eq!(model.first_error("name").as_deref(), Some("first"));
        assert_eq!(model.first_errors().len(), 2);

        model.clear_errors(Some("name"));
        assert!(!model.has_errors(Some("name")));
        model.clear_errors(None);
        assert!(model.errors().is_empty());
    }

    #[tokio::test]
    async fn test_required_only_in_insert_scenario() {
        let model = sample();
        model.set_scenario("insert").unwrap();
        assert!(!model.validate(None, true).await);
        assert_eq!(model.first_error("name").as_deref(), Some("Name cannot be blank."));

        model.set_scenario("update").unwrap();
        assert!(model.validate(None, true).await);
        assert!(!model.has_errors(Some("name")));
    }

    #[tokio::test]
    async fn test_validate_subset_of_attributes() {
        let model = sample();
        model.set_scenario("insert").unwrap();
        model.set("description", "far too long for ten").unwrap();

        assert!(!model.validate(Some(&["description"]), true).await);
        assert!(!model.has_errors(Some("name")));
        assert_eq!(
            model.first_error("description").as_deref(),
            Some("Description should contain at most 10 characters.")
        );
    }

    #[tokio::test]
    async fn test_before_validate_can_abort() {
        let schema = ModelSchema::builder("Guarded")
            .attribute("name")
            .rule(["name"], "required", json!({}))
            .before_validate(|_| false)
            .build()
            .unwrap();
        let model = Model::new(schema);
        assert!(!model.validate(None, true).await);
        assert!(!model.has_errors(None));
    }

    #[tokio::test]
    async fn test_validation_runs_in_a_span() {
        use std::sync::Arc;
        use tracing_subscriber::layer::{Context, SubscriberExt};

        struct SpanNames(Arc<parking_lot::Mutex<Vec<(String, String)>>>);

        impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanNames {
            fn on_new_span(&self, attrs: &tracing::span::Attributes<'_>, _: &tracing::span::Id, _: Context<'_, S>) {
                let meta = attrs.metadata();
                self.0.lock().push((meta.target().to_string(), meta.name().to_string()));
            }
        }

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _default = tracing::subscriber::set_default(tracing_subscriber::registry().with(SpanNames(seen.clone())));

        let model = sample();
        model.set_scenario("insert").unwrap();
        assert!(!model.validate(None, true).await);
        assert!(
            seen.lock()
                .contains(&(targets::VALIDATION.to_string(), "validate".to_string()))
        );
    }
}
