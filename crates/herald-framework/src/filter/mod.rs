//! The filter chain.
//!
//! Filters are cross-cutting checks injected at three points of the dispatch
//! pipeline:
//!
//! | Position           | Runs                         | Sees                          |
//! |--------------------|------------------------------|-------------------------------|
//! | `BeforeRouting`    | before the label is resolved | interaction, options          |
//! | `BeforeAdapting`   | after raw tokens are ordered | + definition, raw input       |
//! | `BeforeExecution`  | after arguments validated    | + adapted arguments           |
//!
//! Within a position filters run in registration order. A filter stops the
//! pipeline by cancelling the context; the chain ends at the first filter
//! that does, and nothing downstream runs.
//!
//! ```rust,ignore
//! let filters = FilterRegistry::new()
//!     .with(FilterPosition::BeforeRouting, MuteFilter::default())
//!     .with(FilterPosition::BeforeExecution, filter_fn("audit", |ctx| {
//!         tracing::info!(label = ctx.interaction().label(), "audited");
//!     }));
//! ```

mod flags;
mod mute;
mod permission;
mod rate_limit;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;

pub use flags::{ActiveFilter, GuildOnlyFilter};
pub use mute::{MuteFilter, MuteSettings};
pub use permission::{PermissionFilter, PermissionResolver, StaticPermissions};
pub use rate_limit::RateLimitFilter;

/// Where in the pipeline a filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterPosition {
    BeforeRouting,
    BeforeAdapting,
    BeforeExecution,
}

impl FilterPosition {
    pub const ALL: [FilterPosition; 3] = [
        FilterPosition::BeforeRouting,
        FilterPosition::BeforeAdapting,
        FilterPosition::BeforeExecution,
    ];
}

impl fmt::Display for FilterPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeRouting => "BEFORE_ROUTING",
            Self::BeforeAdapting => "BEFORE_ADAPTING",
            Self::BeforeExecution => "BEFORE_EXECUTION",
        })
    }
}

/// A cross-cutting pipeline check.
#[async_trait]
pub trait Filter: Send + Sync + 'static {
    /// Name used in logs and rejection errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Inspects, mutates or cancels the context.
    async fn apply(&self, ctx: &mut ExecutionContext);
}

/// A shared, type-erased filter.
pub type BoxedFilter = Arc<dyn Filter>;

// ============================================================================
// Closure filters
// ============================================================================

/// A filter backed by a synchronous closure. See [`filter_fn`].
pub struct FnFilter<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F> Filter for FnFilter<F>
where
    F: Fn(&mut ExecutionContext) + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        (self.f)(ctx)
    }
}

/// Creates a named filter from a synchronous closure.
pub fn filter_fn<F>(name: impl Into<String>, f: F) -> FnFilter<F>
where
    F: Fn(&mut ExecutionContext) + Send + Sync + 'static,
{
    FnFilter {
        name: name.into(),
        f,
    }
}

// ============================================================================
// FilterRegistry
// ============================================================================

/// Filters grouped by position, each group in registration order.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    before_routing: Vec<BoxedFilter>,
    before_adapting: Vec<BoxedFilter>,
    before_execution: Vec<BoxedFilter>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `filter` to the chain at `position`.
    pub fn register(&mut self, position: FilterPosition, filter: impl Filter) -> &mut Self {
        self.register_boxed(position, Arc::new(filter))
    }

    /// Appends an already shared filter, e.g. one the caller keeps a handle to.
    pub fn register_boxed(&mut self, position: FilterPosition, filter: BoxedFilter) -> &mut Self {
        self.chain_mut(position).push(filter);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, position: FilterPosition, filter: impl Filter) -> Self {
        self.register(position, filter);
        self
    }

    /// The chain at `position`, in execution order.
    pub fn get(&self, position: FilterPosition) -> &[BoxedFilter] {
        match position {
            FilterPosition::BeforeRouting => &self.before_routing,
            FilterPosition::BeforeAdapting => &self.before_adapting,
            FilterPosition::BeforeExecution => &self.before_execution,
        }
    }

    pub fn len(&self) -> usize {
        self.before_routing.len() + self.before_adapting.len() + self.before_execution.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn chain_mut(&mut self, position: FilterPosition) -> &mut Vec<BoxedFilter> {
        match position {
            FilterPosition::BeforeRouting => &mut self.before_routing,
            FilterPosition::BeforeAdapting => &mut self.before_adapting,
            FilterPosition::BeforeExecution => &mut self.before_execution,
        }
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |chain: &[BoxedFilter]| chain.iter().map(|f| f.name().to_string()).collect::<Vec<_>>();
        f.debug_struct("FilterRegistry")
            .field("before_routing", &names(&self.before_routing))
            .field("before_adapting", &names(&self.before_adapting))
            .field("before_execution", &names(&self.before_execution))
            .finish()
    }
}
