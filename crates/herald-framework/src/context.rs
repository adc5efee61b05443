//! Per-dispatch execution context.
//!
//! One [`ExecutionContext`] is created for every dispatched interaction and
//! dropped when the dispatch ends. Filters receive it mutably and may rewrite
//! the raw input, stash typed data for later stages, or cancel the pipeline.
//!
//! Cancellation is one-way: once [`cancel`](ExecutionContext::cancel) has been
//! called, the context refuses further argument and input mutation, and the
//! dispatcher reports the stored error instead of invoking the handler.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use herald_core::{Interaction, SessionKey};
use tracing::{debug, trace};

use crate::definition::InteractionDefinition;
use crate::error::DispatchError;
use crate::handler::ArgValue;
use crate::supervisor::InteractionRuntime;

/// Where a dispatch currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStage {
    Routing,
    Acknowledged,
    Extracting,
    Adapting,
    Validating,
    ExecutingFilters,
    Invoking,
    Done,
    Failed,
}

/// Marker returned by pipeline stages once the context has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

/// Mutable state for a single dispatch.
pub struct ExecutionContext {
    interaction: Arc<Interaction>,
    session: SessionKey,
    options: HashMap<String, String>,
    input: Vec<String>,
    definition: Option<Arc<InteractionDefinition>>,
    arguments: Vec<Option<ArgValue>>,
    cancelled: bool,
    error: Option<DispatchError>,
    ephemeral: bool,
    runtime: Option<Arc<InteractionRuntime>>,
    stage: DispatchStage,
    state: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ExecutionContext {
    /// Creates a context for `interaction`. Raw options are keyed by name;
    /// when a name repeats, the first occurrence wins.
    pub fn new(interaction: Arc<Interaction>) -> Self {
        let mut options = HashMap::with_capacity(interaction.options().len());
        for option in interaction.options() {
            options
                .entry(option.name.clone())
                .or_insert_with(|| option.value.clone());
        }

        Self {
            session: interaction.session_key(),
            interaction,
            options,
            input: Vec::new(),
            definition: None,
            arguments: Vec::new(),
            cancelled: false,
            error: None,
            ephemeral: false,
            runtime: None,
            stage: DispatchStage::Routing,
            state: HashMap::new(),
        }
    }

    // ─── Interaction ─────────────────────────────────────────────────────────

    pub fn interaction(&self) -> &Interaction {
        &self.interaction
    }

    pub fn interaction_arc(&self) -> Arc<Interaction> {
        Arc::clone(&self.interaction)
    }

    pub fn session(&self) -> &SessionKey {
        &self.session
    }

    /// Raw options keyed by name.
    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    pub fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    // ─── Pipeline data ───────────────────────────────────────────────────────

    /// Raw input tokens, ordered by the matched definition's parameters.
    ///
    /// Empty until the extraction stage has run.
    pub fn input(&self) -> &[String] {
        &self.input
    }

    /// Replaces the raw input tokens. Ignored once cancelled.
    pub fn set_input(&mut self, input: Vec<String>) -> bool {
        if self.cancelled {
            debug!("Ignoring input rewrite on a cancelled context");
            return false;
        }
        self.input = input;
        true
    }

    /// The matched definition; `None` before routing.
    pub fn definition(&self) -> Option<&Arc<InteractionDefinition>> {
        self.definition.as_ref()
    }

    pub(crate) fn set_definition(&mut self, definition: Arc<InteractionDefinition>) {
        self.definition = Some(definition);
    }

    /// Adapted arguments in parameter order. `None` entries are unset.
    pub fn arguments(&self) -> &[Option<ArgValue>] {
        &self.arguments
    }

    /// Returns the adapted argument at `index` if it is set and of type `T`.
    pub fn argument<T: 'static>(&self, index: usize) -> Option<&T> {
        self.arguments
            .get(index)?
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub(crate) fn set_arguments(&mut self, arguments: Vec<Option<ArgValue>>) -> bool {
        if self.cancelled {
            return false;
        }
        self.arguments = arguments;
        true
    }

    pub(crate) fn take_arguments(&mut self) -> Vec<Option<ArgValue>> {
        std::mem::take(&mut self.arguments)
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn set_ephemeral(&mut self, ephemeral: bool) {
        self.ephemeral = ephemeral;
    }

    /// The session runtime; `None` until the invocation stage acquired it.
    pub fn runtime(&self) -> Option<&Arc<InteractionRuntime>> {
        self.runtime.as_ref()
    }

    pub(crate) fn set_runtime(&mut self, runtime: Arc<InteractionRuntime>) {
        self.runtime = Some(runtime);
    }

    pub fn stage(&self) -> DispatchStage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: DispatchStage) {
        trace!(from = ?self.stage, to = ?stage, "Dispatch stage transition");
        self.stage = stage;
    }

    // ─── Cancellation ────────────────────────────────────────────────────────

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Cancels the pipeline with `error`. The first cancellation wins.
    pub fn cancel(&mut self, error: DispatchError) {
        if self.cancelled {
            debug!(%error, "Context already cancelled, keeping the first error");
            return;
        }
        self.cancelled = true;
        self.error = Some(error);
    }

    /// Cancels the pipeline with a filter rejection.
    pub fn reject(&mut self, filter: impl Into<String>, reason: impl Into<String>) {
        self.cancel(DispatchError::rejection(filter, reason));
    }

    /// The pending error, if cancelled.
    pub fn error(&self) -> Option<&DispatchError> {
        self.error.as_ref()
    }

    pub(crate) fn take_error(&mut self) -> Option<DispatchError> {
        self.error.take()
    }

    /// `Err(Cancelled)` once the context has been cancelled.
    pub(crate) fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.cancelled { Err(Cancelled) } else { Ok(()) }
    }

    /// Cancels with `error` and returns the marker, for early returns.
    pub(crate) fn fail(&mut self, error: DispatchError) -> Cancelled {
        self.cancel(error);
        Cancelled
    }

    // ─── Scratch state ───────────────────────────────────────────────────────

    /// Stores a typed value for later stages, replacing any previous value of
    /// the same type.
    pub fn set_state<T: Send + Sync + 'static>(&mut self, value: T) {
        self.state.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn has_state<T: Send + Sync + 'static>(&self) -> bool {
        self.state.contains_key(&TypeId::of::<T>())
    }

    pub fn take_state<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.state
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("label", &self.interaction.label())
            .field("session", &self.session)
            .field("stage", &self.stage)
            .field("input", &self.input)
            .field("cancelled", &self.cancelled)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(
            Interaction::command("greet", "alice", "general")
                .option("name", "Alice")
                .option("name", "Bob"),
        ))
    }

    #[test]
    fn test_first_option_wins() {
        let ctx = context();
        assert_eq!(ctx.option("name"), Some("Alice"));
    }

    #[test]
    fn test_first_cancellation_wins() {
        let mut ctx = context();
        ctx.reject("mute", "muted");
        ctx.reject("rate_limit", "slow down");
        assert!(ctx.is_cancelled());
        assert!(matches!(
            ctx.error(),
            Some(DispatchError::FilterRejection { filter, .. }) if filter == "mute"
        ));
        assert_eq!(ctx.checkpoint(), Err(Cancelled));
    }

    #[test]
    fn test_cancelled_context_rejects_mutation() {
        let mut ctx = context();
        assert!(ctx.set_input(vec!["a".into()]));
        ctx.reject("f", "no");
        assert!(!ctx.set_input(vec!["b".into()]));
        assert_eq!(ctx.input(), ["a".to_string()]);
        assert!(!ctx.set_arguments(vec![Some(Box::new(1_i32))]));
        assert!(ctx.arguments().is_empty());
    }

    #[test]
    fn test_state_roundtrip() {
        #[derive(Debug, PartialEq)]
        struct Quota(u32);

        let mut ctx = context();
        ctx.set_state(Quota(3));
        assert!(ctx.has_state::<Quota>());
        assert_eq!(ctx.get_state::<Quota>(), Some(&Quota(3)));
        assert_eq!(ctx.take_state::<Quota>(), Some(Quota(3)));
        assert!(!ctx.has_state::<Quota>());
    }

    #[test]
    fn test_typed_argument_access() {
        let mut ctx = context();
        ctx.set_arguments(vec![Some(Box::new(5_i64)), None]);
        assert_eq!(ctx.argument::<i64>(0), Some(&5));
        assert_eq!(ctx.argument::<String>(0), None);
        assert_eq!(ctx.argument::<i64>(1), None);
        assert_eq!(ctx.argument::<i64>(9), None);
    }
}
