//! Seams to the schema validator and to whatever fetches external
//! resources. Both are opaque to the engine.

use std::sync::Arc;
use xforms_dom::{ConnectionResult, Instance, NodeId};

/// A loaded schema.
pub trait SchemaValidator: Send + Sync {
    /// Validate an instance and return the nodes found invalid. The
    /// instance's validation mode says how strictly to apply the schema.
    fn validate(&self, instance: &Instance) -> Vec<NodeId>;
}

/// Fetches external instances and schemas.
pub trait ResourceResolver {
    /// Retrieve a resource. Transport failures are errors; HTTP-level
    /// failures come back as a non-200 [`ConnectionResult`].
    fn fetch(&self, uri: &str) -> anyhow::Result<ConnectionResult>;

    /// Load the schemas named by a model's `schema` attribute.
    fn schema(&self, uris: &str) -> anyhow::Result<Arc<dyn SchemaValidator>>;
}

/// Resolver for documents without external resources: every lookup fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResources;

impl ResourceResolver for NoResources {
    fn fetch(&self, uri: &str) -> anyhow::Result<ConnectionResult> {
        anyhow::bail!("no resolver available for `{uri}`")
    }

    fn schema(&self, uris: &str) -> anyhow::Result<Arc<dyn SchemaValidator>> {
        anyhow::bail!("no resolver available for schema `{uris}`")
    }
}
