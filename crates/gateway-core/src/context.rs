//! Typed request context attached by authentication.

use crate::model::AccessibleModel;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Identity and access list resolved for one inbound request.
///
/// Inserted into the request extensions by the auth middleware and read by
/// the dispatcher and the models endpoint.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Organization that owns the key
    pub org_id: String,
    /// Storage id of the API key
    pub key_id: String,
    /// Models the organization may call
    pub accessible_models: Arc<[AccessibleModel]>,
    api_key: SecretString,
}

impl RequestContext {
    /// Create a new context.
    pub fn new(
        org_id: impl Into<String>,
        key_id: impl Into<String>,
        accessible_models: impl Into<Arc<[AccessibleModel]>>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            key_id: key_id.into(),
            accessible_models: accessible_models.into(),
            api_key: SecretString::new(api_key.into()),
        }
    }

    /// The raw key presented by the caller.
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Find the accessible model whose upstream identifier matches `model_id`.
    #[must_use]
    pub fn find_model(&self, model_id: &str) -> Option<&AccessibleModel> {
        self.accessible_models
            .iter()
            .find(|m| m.model_id == model_id)
    }

    /// Find an accessible model by its storage id.
    #[must_use]
    pub fn model_by_id(&self, id: &str) -> Option<&AccessibleModel> {
        self.accessible_models.iter().find(|m| m.id == id)
    }
}
