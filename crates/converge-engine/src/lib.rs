//! Converge reconciliation engine
//!
//! Provider-agnostic machinery for declarative resource management: a
//! resource's desired configuration is compared against what the provider
//! reports and the difference is applied through the provider's API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            resource descriptors (elb, ...)      │
//! │  field bindings · id/status · policies · keys   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                converge-engine                   │
//! │  ┌────────────┐ ┌────────────┐ ┌─────────────┐  │
//! │  │SparseMapper│ │ reconcile  │ │  Convergence│  │
//! │  │ build/read │ │ plan/apply │ │    Waiter   │  │
//! │  └────────────┘ └────────────┘ └─────────────┘  │
//! │  ┌────────────┐ ┌────────────┐ ┌─────────────┐  │
//! │  │ paginate   │ │ ClientPool │ │  Limiter    │  │
//! │  └────────────┘ └────────────┘ └─────────────┘  │
//! └─────────────────┬───────────────────────────────┘
//!                   │ trait ResourceApi
//! ┌─────────────────▼───────────────────────────────┐
//! │               provider API client               │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod cancel;
pub mod error;
pub mod limiter;
pub mod mapper;
pub mod paginate;
pub mod pool;
pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod waiter;

// Re-exports
pub use cancel::CancelToken;
pub use error::{ApiError, EngineError, ErrorKind, Result, ignore_not_found};
pub use limiter::{ConcurrencyLimiter, LimiterPermit, LimiterSettings};
pub use mapper::{Cardinality, Presence, SparseMapper, Transform};
pub use paginate::Page;
pub use pool::ClientPool;
pub use provider::ResourceApi;
pub use reconcile::{
    ActionType, Deletion, PlanExecutor, PlanSummary, ReconcilePlan, Update, reconcile,
    validate_unique,
};
pub use resource::{CollectionDescriptor, DELETED_STATUS, ResourceDescriptor, ResourceEngine};
pub use waiter::{ConvergencePolicy, ConvergenceWaiter, WaitResult};
