use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value as JsonValue;

use super::{Validator, ValidatorOptions};
use crate::model::Model;

/// An async validation method: receives the model, the attribute name and
/// the rule's params, and reports failures with [`Model::add_error`].
pub type InlineMethod = Arc<dyn Fn(Model, String, JsonValue) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs a validation method registered on the schema.
#[derive(Clone)]
pub struct InlineValidator {
    options: ValidatorOptions,
    method: InlineMethod,
    params: JsonValue,
}

impl InlineValidator {
    /// Wrap an async closure.
    pub fn new<F>(options: ValidatorOptions, method: F) -> Self
    where
        F: Fn(Model, String, JsonValue) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self::from_method(options, Arc::new(method), JsonValue::Null)
    }

    /// Wrap a shared method together with the params passed to it.
    pub fn from_method(options: ValidatorOptions, method: InlineMethod, params: JsonValue) -> Self {
        Self {
            options,
            method,
            params,
        }
    }
}

impl fmt::Debug for InlineValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineValidator")
            .field("options", &self.options)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Validator for InlineValidator {
    fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    fn validate_attribute<'a>(&'a self, model: &'a Model, attribute: &'a str) -> BoxFuture<'a, ()> {
        (self.method)(model.clone(), attribute.to_string(), self.params.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ModelSchema;
    use futures_util::FutureExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_schema_method_runs_async() {
        let schema = ModelSchema::builder("Account")
            .attribute("login")
            .method("checkLogin", |model: Model, attribute: String, params: JsonValue| {
                async move {
                    tokio::task::yield_now().await;
                    let reserved = params["reserved"].as_str().unwrap_or_default().to_string();
                    if model.get_json(&attribute) == Some(JsonValue::String(reserved)) {
                        model.add_error(&attribute, "Login is taken.");
                    }
                }
                .boxed()
            })
            .rule(["login"], "checkLogin", json!({"reserved": "admin"}))
            .build()
            .unwrap();

        let account = Model::with_values(schema.clone(), &json!({"login": "admin"})).unwrap();
        assert!(!account.validate(None, true).await);
        assert_eq!(account.first_error("login").as_deref(), Some("Login is taken."));

        let account = Model::with_values(schema, &json!({"login": "ivan"})).unwrap();
        assert!(account.validate(None, true).await);
    }
}
