//! Provider API client boundary

use crate::error::ApiError;
use crate::paginate::Page;
use async_trait::async_trait;

/// API calls for one resource type (or one keyed sub-resource type).
///
/// Implementations wrap the provider SDK; transport, signing and request
/// serialization stay on their side of this trait. A missing target must be
/// reported as an [`ApiError`] for which `is_not_found()` holds.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Request/response model of the resource
    type Model: Send + Sync;

    /// Filter arguments for listing (e.g. the parent pool of members)
    type ListArgs: Send + Sync;

    async fn create(&self, request: &Self::Model) -> Result<Self::Model, ApiError>;

    async fn update(&self, id: &str, request: &Self::Model) -> Result<Self::Model, ApiError>;

    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    async fn get(&self, id: &str) -> Result<Self::Model, ApiError>;

    async fn list(
        &self,
        args: &Self::ListArgs,
        marker: &str,
    ) -> Result<Page<Self::Model>, ApiError>;

    /// What a listing with `args` covers (e.g. a region or a parent pool id).
    /// Failed listings report it in place of a resource id.
    fn list_scope(&self, args: &Self::ListArgs) -> String;
}
