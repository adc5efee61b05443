//! The dispatch pipeline.
//!
//! [`Dispatcher::dispatch`] takes one inbound [`Interaction`] through every
//! stage, in order:
//!
//! 1. `BeforeRouting` filters, then either the help path or label resolution
//! 2. acknowledgment, with the definition's ephemeral flag
//! 3. raw token extraction, in parameter order
//! 4. `BeforeAdapting` filters, then conversion and constraint checks
//! 5. `BeforeExecution` filters
//! 6. runtime acquisition and handler invocation
//!
//! Each stage checks the context's cancellation flag before the next one
//! runs. Whatever goes wrong ends up as a single [`DispatchError`] and exactly
//! one error reply; nothing a handler or controller constructor does (error or
//! panic) escapes `dispatch`.
//!
//! ```rust,ignore
//! let dispatcher = Dispatcher::builder(registry, adapters)
//!     .provider(factories)
//!     .filter(FilterPosition::BeforeRouting, MuteFilter::default())
//!     .build();
//!
//! dispatcher.dispatch(interaction, transport).await;
//! ```

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use herald_core::{BoxedTransport, Interaction};
use tower::ServiceExt;
use tracing::{Instrument, Level, debug, error, info, span, trace, warn};

use crate::adapter::TypeAdapterRegistry;
use crate::context::{Cancelled, DispatchStage, ExecutionContext};
use crate::definition::{InteractionDefinition, InteractionRegistry, normalize_label};
use crate::error::{DispatchError, DispatchErrorKind};
use crate::event::CommandEvent;
use crate::filter::{Filter, FilterPosition, FilterRegistry};
use crate::handler::{ArgValue, Invocation};
use crate::help::{DefaultHelpRenderer, HelpRenderer};
use crate::reply::ReplyContext;
use crate::supervisor::{
    ControllerFactories, DEFAULT_IDLE_TIMEOUT, InstanceProvider, RuntimeSupervisor,
};

/// How a dispatch ended.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The handler ran and returned normally.
    Completed,
    /// A help interaction was answered.
    Help,
    /// The pipeline was cancelled or the handler failed; one error reply was
    /// sent.
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<DispatchErrorKind> {
        self.error().map(DispatchError::kind)
    }
}

struct Inner {
    registry: Arc<InteractionRegistry>,
    adapters: Arc<TypeAdapterRegistry>,
    filters: FilterRegistry,
    supervisor: Arc<RuntimeSupervisor>,
    help: Arc<dyn HelpRenderer>,
}

/// Routes interactions to their handlers.
///
/// Cheap to clone; clones share registries and the runtime supervisor. The
/// dispatcher keeps no per-event state, so any number of dispatches may run
/// concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn builder(
        registry: impl Into<Arc<InteractionRegistry>>,
        adapters: impl Into<Arc<TypeAdapterRegistry>>,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            registry: registry.into(),
            adapters: adapters.into(),
            filters: FilterRegistry::new(),
            provider: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            help: Arc::new(DefaultHelpRenderer),
        }
    }

    pub fn registry(&self) -> &Arc<InteractionRegistry> {
        &self.inner.registry
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.inner.filters
    }

    pub fn supervisor(&self) -> &Arc<RuntimeSupervisor> {
        &self.inner.supervisor
    }

    /// Dispatches one interaction, replying through `transport`.
    pub async fn dispatch(
        &self,
        interaction: Interaction,
        transport: BoxedTransport,
    ) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            label = interaction.label(),
            user = interaction.user_id(),
            channel = interaction.channel_id(),
        );
        self.run(Arc::new(interaction), transport)
            .instrument(span)
            .await
    }

    async fn run(&self, interaction: Arc<Interaction>, transport: BoxedTransport) -> DispatchOutcome {
        let replies = Arc::new(ReplyContext::new(transport, Arc::clone(&interaction)));
        let mut ctx = ExecutionContext::new(interaction);

        match self.pipeline(&mut ctx, &replies).await {
            Ok(outcome) => {
                ctx.set_stage(DispatchStage::Done);
                outcome
            }
            Err(Cancelled) => self.report_failure(&mut ctx, &replies).await,
        }
    }

    async fn pipeline(
        &self,
        ctx: &mut ExecutionContext,
        replies: &Arc<ReplyContext>,
    ) -> Result<DispatchOutcome, Cancelled> {
        self.apply_filters(FilterPosition::BeforeRouting, ctx).await?;

        if ctx.interaction().is_help() {
            self.render_help(ctx, replies).await;
            return Ok(DispatchOutcome::Help);
        }

        let definition = self.route(ctx)?;
        self.acknowledge(ctx, &definition, replies).await;

        ctx.set_stage(DispatchStage::Extracting);
        let input = extract_input(ctx, &definition);
        ctx.set_input(input);
        ctx.checkpoint()?;

        self.apply_filters(FilterPosition::BeforeAdapting, ctx).await?;

        let arguments = self.adapt(ctx, &definition)?;
        if !ctx.set_arguments(arguments) {
            return Err(Cancelled);
        }

        self.apply_filters(FilterPosition::BeforeExecution, ctx)
            .await?;

        self.invoke(ctx, &definition, replies).await?;
        Ok(DispatchOutcome::Completed)
    }

    // ─── Stages ──────────────────────────────────────────────────────────────

    async fn apply_filters(
        &self,
        position: FilterPosition,
        ctx: &mut ExecutionContext,
    ) -> Result<(), Cancelled> {
        ctx.checkpoint()?;
        let chain = self.inner.filters.get(position);
        if chain.is_empty() {
            return Ok(());
        }
        if position == FilterPosition::BeforeExecution {
            ctx.set_stage(DispatchStage::ExecutingFilters);
        }

        debug!(phase = %position, filters = chain.len(), "Applying filters");
        for filter in chain {
            trace!(filter = filter.name(), "Applying filter");
            filter.apply(ctx).await;
            if ctx.is_cancelled() {
                debug!(filter = filter.name(), phase = %position, "Filter cancelled the dispatch");
                return Err(Cancelled);
            }
        }
        Ok(())
    }

    fn route(&self, ctx: &mut ExecutionContext) -> Result<Arc<InteractionDefinition>, Cancelled> {
        let label = normalize_label(ctx.interaction().label());
        match self.inner.registry.resolve(&label) {
            Some(definition) => {
                debug!(label = definition.label(), "Interaction matches definition");
                ctx.set_definition(Arc::clone(&definition));
                Ok(definition)
            }
            None => Err(ctx.fail(DispatchError::Routing { label })),
        }
    }

    async fn acknowledge(
        &self,
        ctx: &mut ExecutionContext,
        definition: &InteractionDefinition,
        replies: &ReplyContext,
    ) {
        if definition.is_ephemeral() {
            ctx.set_ephemeral(true);
        }
        replies.set_ephemeral(ctx.is_ephemeral());

        if let Err(error) = replies.acknowledge().await {
            warn!(%error, "Failed to acknowledge interaction");
        }
        ctx.set_stage(DispatchStage::Acknowledged);
    }

    /// Converts and validates the raw input, one parameter at a time, stopping
    /// at the first failure.
    fn adapt(
        &self,
        ctx: &mut ExecutionContext,
        definition: &InteractionDefinition,
    ) -> Result<Vec<Option<ArgValue>>, Cancelled> {
        ctx.set_stage(DispatchStage::Adapting);
        let tokens = match assign_tokens(ctx.input(), definition) {
            Ok(tokens) => tokens,
            Err(error) => return Err(ctx.fail(error)),
        };

        let mut arguments = Vec::with_capacity(tokens.len());
        for (parameter, token) in definition.parameters().iter().zip(tokens) {
            ctx.set_stage(DispatchStage::Adapting);
            let raw = token.or_else(|| parameter.default_value().map(str::to_string));

            let Some(raw) = raw else {
                trace!(parameter = parameter.name(), "No token or default, using absent value");
                arguments.push(parameter.absent_value());
                continue;
            };

            let Some(value) = self.inner.adapters.adapt(parameter.ty(), &raw, ctx) else {
                return Err(ctx.fail(DispatchError::AdaptationFailure {
                    parameter: parameter.name().to_string(),
                    raw,
                    expected: parameter.ty().to_string(),
                }));
            };

            ctx.set_stage(DispatchStage::Validating);
            let failed = parameter.constraints().iter().find(|constraint| {
                !constraint
                    .validator()
                    .validate(value.as_ref(), constraint.config(), ctx)
            });
            if let Some(constraint) = failed {
                return Err(ctx.fail(DispatchError::ConstraintViolation {
                    parameter: parameter.name().to_string(),
                    constraint: constraint.kind().to_string(),
                    message: constraint.message().to_string(),
                }));
            }

            arguments.push(Some(value));
        }
        Ok(arguments)
    }

    async fn invoke(
        &self,
        ctx: &mut ExecutionContext,
        definition: &Arc<InteractionDefinition>,
        replies: &Arc<ReplyContext>,
    ) -> Result<(), Cancelled> {
        ctx.checkpoint()?;
        ctx.set_stage(DispatchStage::Invoking);

        let label = definition.label();
        let acquired = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.supervisor.acquire(ctx.session(), definition)
        }));
        let lease = match acquired {
            Ok(Ok(lease)) => lease,
            Ok(Err(error)) => return Err(ctx.fail(DispatchError::handler_failure(label, error))),
            Err(panic) => {
                return Err(ctx.fail(DispatchError::handler_failure(
                    label,
                    panic_message(panic.as_ref()),
                )));
            }
        };
        ctx.set_runtime(Arc::clone(lease.runtime()));

        let event = CommandEvent::new(
            Arc::clone(definition),
            Arc::clone(replies),
            Arc::clone(lease.runtime()),
        );
        let invocation = Invocation::new(lease.instance(), event, ctx.take_arguments());

        info!(label, session = %ctx.session(), runtime = lease.runtime().id(), "Invoking handler");
        let result = AssertUnwindSafe(definition.handler().oneshot(invocation))
            .catch_unwind()
            .await;
        drop(lease);

        match result {
            Ok(Ok(Some(reply))) => {
                if let Err(error) = replies.send(reply).await {
                    warn!(%error, "Failed to deliver handler reply");
                }
                Ok(())
            }
            Ok(Ok(None)) => Ok(()),
            Ok(Err(error)) => Err(ctx.fail(DispatchError::handler_failure(label, error))),
            Err(panic) => Err(ctx.fail(DispatchError::handler_failure(
                label,
                panic_message(panic.as_ref()),
            ))),
        }
    }

    async fn render_help(&self, ctx: &mut ExecutionContext, replies: &ReplyContext) {
        let target = normalize_label(&ctx.interaction().help_target());
        let definition = (!target.is_empty())
            .then(|| self.inner.registry.resolve(&target))
            .flatten();

        let reply = match &definition {
            Some(definition) => {
                debug!(target = definition.label(), "Rendering command help");
                self.inner.help.specific_help(definition, ctx)
            }
            None => {
                debug!(target, "Rendering generic help");
                self.inner.help.generic_help(&self.inner.registry, ctx)
            }
        };

        if let Err(error) = replies.send(reply).await {
            warn!(%error, "Failed to deliver help reply");
        }
        ctx.set_stage(DispatchStage::Done);
    }

    async fn report_failure(
        &self,
        ctx: &mut ExecutionContext,
        replies: &ReplyContext,
    ) -> DispatchOutcome {
        ctx.set_stage(DispatchStage::Failed);
        let error = ctx.take_error().unwrap_or_else(|| {
            DispatchError::handler_failure(
                ctx.interaction().label(),
                "dispatch cancelled without an error",
            )
        });

        if error.is_internal() {
            error!(%error, session = %ctx.session(), "Dispatch failed");
        } else {
            debug!(%error, "Dispatch rejected");
        }

        if let Err(send_error) = replies.send(error.to_reply()).await {
            warn!(error = %send_error, "Failed to deliver error reply");
        }
        DispatchOutcome::Failed(error)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("definitions", &self.inner.registry.len())
            .field("filters", &self.inner.filters)
            .field("supervisor", &self.inner.supervisor)
            .finish_non_exhaustive()
    }
}

/// Pulls the raw option of each parameter in declaration order.
///
/// Absent optional options are skipped, so later tokens move up. Extraction
/// stops at the first absent required option so that the parameter is
/// reported as missing instead of receiving a neighbour's token.
fn extract_input(ctx: &ExecutionContext, definition: &InteractionDefinition) -> Vec<String> {
    let mut input = Vec::with_capacity(definition.parameters().len());
    for parameter in definition.parameters() {
        match ctx.option(parameter.name()) {
            Some(value) => input.push(value.to_string()),
            None if parameter.is_optional() => {}
            None => break,
        }
    }
    input
}

/// Hands out tokens to parameters positionally; a concat parameter takes all
/// remaining tokens joined by single spaces. Fails on the first required
/// parameter left without a token, before anything is converted.
fn assign_tokens(
    input: &[String],
    definition: &InteractionDefinition,
) -> Result<Vec<Option<String>>, DispatchError> {
    let mut remaining = input.iter();
    let mut tokens = Vec::with_capacity(definition.parameters().len());

    for parameter in definition.parameters() {
        let token = if parameter.is_concat() {
            let rest: Vec<&str> = remaining.by_ref().map(String::as_str).collect();
            (!rest.is_empty()).then(|| rest.join(" "))
        } else {
            remaining.next().cloned()
        };

        if token.is_none() && !parameter.is_optional() {
            return Err(DispatchError::MissingArgument {
                parameter: parameter.name().to_string(),
            });
        }
        tokens.push(token);
    }
    Ok(tokens)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Configures a [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: Arc<InteractionRegistry>,
    adapters: Arc<TypeAdapterRegistry>,
    filters: FilterRegistry,
    provider: Option<Arc<dyn InstanceProvider>>,
    idle_timeout: Duration,
    help: Arc<dyn HelpRenderer>,
}

impl DispatcherBuilder {
    /// Appends a filter at `position`.
    pub fn filter(mut self, position: FilterPosition, filter: impl Filter) -> Self {
        self.filters.register(position, filter);
        self
    }

    /// Replaces the filter chain.
    pub fn filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    /// Sets how controller instances are constructed. Without one, every
    /// invocation fails as its controller is unregistered.
    pub fn provider(mut self, provider: impl InstanceProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn shared_provider(mut self, provider: Arc<dyn InstanceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// How long a session runtime may sit unused before the sweep evicts it.
    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn help_renderer(mut self, renderer: impl HelpRenderer) -> Self {
        self.help = Arc::new(renderer);
        self
    }

    pub fn shared_help_renderer(mut self, renderer: Arc<dyn HelpRenderer>) -> Self {
        self.help = renderer;
        self
    }

    pub fn build(self) -> Dispatcher {
        let provider = self.provider.unwrap_or_else(|| {
            warn!("No instance provider configured, handlers cannot be invoked");
            Arc::new(ControllerFactories::new())
        });
        Dispatcher {
            inner: Arc::new(Inner {
                registry: self.registry,
                adapters: self.adapters,
                filters: self.filters,
                supervisor: Arc::new(RuntimeSupervisor::new(provider, self.idle_timeout)),
                help: self.help,
            }),
        }
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("definitions", &self.registry.len())
            .field("filters", &self.filters)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use herald_core::{Reply, ReplyStage};
    use parking_lot::Mutex;
    use tower::timeout::TimeoutLayer;

    use super::*;
    use crate::definition::{Constraint, Param, command};
    use crate::error::{BoxError, INTERNAL_ERROR_MESSAGE};
    use crate::filter::{GuildOnlyFilter, filter_fn};
    use crate::reply::testing::RecordingTransport;
    use crate::validation::ValidatorRegistry;

    #[derive(Clone, Default)]
    struct Journal {
        calls: Arc<AtomicUsize>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Journal {
        fn record(&self, entry: String) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.log.lock().push(entry);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct Counter {
        count: AtomicUsize,
    }

    async fn greet(journal: Arc<Journal>, _: CommandEvent, name: String) -> String {
        journal.record(format!("greet {name}"));
        format!("Hello, {name}!")
    }

    async fn setlevel(journal: Arc<Journal>, _: CommandEvent, value: i32) -> String {
        journal.record(format!("setlevel {value}"));
        format!("Level set to {value}")
    }

    async fn add(journal: Arc<Journal>, _: CommandEvent, a: i64, b: i64) -> String {
        journal.record(format!("add {a} {b}"));
        (a + b).to_string()
    }

    async fn bounded(journal: Arc<Journal>, _: CommandEvent, a: i64, b: i64) {
        journal.record(format!("bounded {a} {b}"));
    }

    async fn say(journal: Arc<Journal>, _: CommandEvent, count: i64, text: String) -> String {
        journal.record(format!("say {count} {text}"));
        text
    }

    async fn maybe(journal: Arc<Journal>, _: CommandEvent, n: Option<i64>, flag: bool) -> String {
        journal.record(format!("maybe {n:?} {flag}"));
        String::from("ok")
    }

    async fn boom(journal: Arc<Journal>, _: CommandEvent) -> Result<(), BoxError> {
        journal.record("boom".into());
        Err("database exploded".into())
    }

    async fn explode(journal: Arc<Journal>, _: CommandEvent) {
        journal.record("explode".into());
        panic!("kaboom");
    }

    async fn slow(journal: Arc<Journal>, _: CommandEvent) -> &'static str {
        tokio::time::sleep(Duration::from_secs(60)).await;
        journal.record("slow".into());
        "done"
    }

    async fn chatty(_: Arc<Journal>, event: CommandEvent) -> &'static str {
        let _ = event.reply("first").await;
        "second"
    }

    async fn count(counter: Arc<Counter>, _: CommandEvent) -> String {
        (counter.count.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn registry() -> InteractionRegistry {
        InteractionRegistry::builder()
            .command(
                command("greet")
                    .description("Greets someone")
                    .param(Param::new::<String>("name"))
                    .handler(greet),
            )
            .command(
                command("setlevel")
                    .param(Param::new::<i32>("value"))
                    .handler(setlevel),
            )
            .command(
                command("add")
                    .param(Param::new::<i64>("a"))
                    .param(Param::new::<i64>("b").default("10"))
                    .handler(add),
            )
            .command(
                command("bounded")
                    .param(
                        Param::new::<i64>("a").constraint(Constraint::min(1).message("a too small")),
                    )
                    .param(
                        Param::new::<i64>("b").constraint(Constraint::min(1).message("b too small")),
                    )
                    .handler(bounded),
            )
            .command(
                command("say")
                    .param(Param::new::<i64>("count"))
                    .param(Param::new::<String>("text").concat())
                    .handler(say),
            )
            .command(
                command("maybe")
                    .param(Param::new::<Option<i64>>("n").optional())
                    .param(Param::new::<bool>("flag").optional())
                    .handler(maybe),
            )
            .command(command("boom").handler(boom))
            .command(command("explode").handler(explode))
            .command(
                command("slow")
                    .handler(slow)
                    .layer(TimeoutLayer::new(Duration::from_secs(1))),
            )
            .command(command("secret").ephemeral(true).handler(greet_secret))
            .command(command("guild").guild_only(true).handler(boom))
            .command(command("chatty").handler(chatty))
            .command(command("count").handler(count))
            .build(&TypeAdapterRegistry::new(), &ValidatorRegistry::new())
            .unwrap()
    }

    async fn greet_secret(_: Arc<Journal>, _: CommandEvent) -> &'static str {
        "psst"
    }

    struct Harness {
        dispatcher: Dispatcher,
        journal: Journal,
        transport: Arc<RecordingTransport>,
    }

    impl Harness {
        fn new(filters: FilterRegistry) -> Self {
            let journal = Journal::default();
            let mut factories = ControllerFactories::new();
            let shared = journal.clone();
            factories.register(move || shared.clone());
            factories.register_default::<Counter>();

            let dispatcher = Dispatcher::builder(registry(), TypeAdapterRegistry::new())
                .provider(factories)
                .filters(filters)
                .build();
            Self {
                dispatcher,
                journal,
                transport: Arc::new(RecordingTransport::default()),
            }
        }

        async fn dispatch(&self, interaction: Interaction) -> DispatchOutcome {
            let transport: BoxedTransport = self.transport.clone();
            self.dispatcher.dispatch(interaction, transport).await
        }

        fn single_reply(&self) -> Reply {
            let replies = self.transport.replies();
            assert_eq!(replies.len(), 1, "expected exactly one reply: {replies:?}");
            replies[0].0.clone()
        }
    }

    fn cmd(label: &str) -> Interaction {
        Interaction::command(label, "alice", "general")
    }

    fn error_message(reply: &Reply) -> &str {
        match reply {
            Reply::Error(content) => &content.message,
            other => panic!("expected an error reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greet_end_to_end() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("greet").option("name", "Alice")).await;

        assert!(outcome.is_completed());
        assert_eq!(*harness.journal.log.lock(), ["greet Alice"]);
        assert_eq!(harness.transport.ack_count(), 1);
        assert_eq!(harness.single_reply(), Reply::text("Hello, Alice!"));
    }

    #[tokio::test]
    async fn test_unknown_label_is_routing_error() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("nope")).await;

        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::Routing));
        assert_eq!(harness.journal.calls(), 0);
        assert_eq!(error_message(&harness.single_reply()), INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_adaptation_failure() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness
            .dispatch(cmd("setlevel").option("value", "notanumber"))
            .await;

        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::AdaptationFailure));
        assert_eq!(harness.journal.calls(), 0);
        assert!(error_message(&harness.single_reply()).contains("`value`"));
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let harness = Harness::new(FilterRegistry::new());

        // b is present but unparsable; the missing a is still what is reported
        let outcome = harness.dispatch(cmd("add").option("b", "notanumber")).await;
        assert!(matches!(
            outcome.error(),
            Some(DispatchError::MissingArgument { parameter }) if parameter == "a"
        ));
        assert_eq!(harness.journal.calls(), 0);
    }

    #[tokio::test]
    async fn test_default_goes_through_adapter() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("add").option("a", "1")).await;

        assert!(outcome.is_completed());
        assert_eq!(*harness.journal.log.lock(), ["add 1 10"]);
        assert_eq!(harness.single_reply(), Reply::text("11"));
    }

    #[tokio::test]
    async fn test_absent_optional_values() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("maybe")).await;

        assert!(outcome.is_completed());
        assert_eq!(*harness.journal.log.lock(), ["maybe None false"]);
    }

    #[tokio::test]
    async fn test_optional_gap_shifts_later_option_forward() {
        let harness = Harness::new(FilterRegistry::new());

        // n is absent, so flag's token is extracted positionally into n
        let outcome = harness.dispatch(cmd("maybe").option("flag", "true")).await;
        assert!(matches!(
            outcome.error(),
            Some(DispatchError::AdaptationFailure { parameter, raw, .. })
                if parameter == "n" && raw == "true"
        ));
        assert_eq!(harness.journal.calls(), 0);

        let outcome = harness
            .dispatch(cmd("maybe").option("n", "3").option("flag", "true"))
            .await;
        assert!(outcome.is_completed());
        assert_eq!(*harness.journal.log.lock(), ["maybe Some(3) true"]);
    }

    #[tokio::test]
    async fn test_constraints_fail_fast() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness
            .dispatch(cmd("bounded").option("a", "0").option("b", "0"))
            .await;

        assert_eq!(
            outcome.error_kind(),
            Some(DispatchErrorKind::ConstraintViolation)
        );
        assert_eq!(error_message(&harness.single_reply()), "a too small");
        assert_eq!(harness.journal.calls(), 0);
    }

    #[tokio::test]
    async fn test_filter_cancellation_stops_chain() {
        let later = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&later);
        let filters = FilterRegistry::new()
            .with(
                FilterPosition::BeforeAdapting,
                filter_fn("deny", |ctx| ctx.reject("deny", "Denied.")),
            )
            .with(
                FilterPosition::BeforeAdapting,
                filter_fn("later", move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            );
        let harness = Harness::new(filters);

        let outcome = harness.dispatch(cmd("greet").option("name", "Alice")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert_eq!(harness.journal.calls(), 0);
        assert_eq!(error_message(&harness.single_reply()), "Denied.");
    }

    #[tokio::test]
    async fn test_before_routing_rejection_replies_once() {
        let filters = FilterRegistry::new().with(
            FilterPosition::BeforeRouting,
            filter_fn("closed", |ctx| ctx.reject("closed", "Closed.")),
        );
        let harness = Harness::new(filters);

        let outcome = harness.dispatch(cmd("nope")).await;
        // rejected before routing, so the unknown label is never looked up
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));
        assert_eq!(harness.transport.ack_count(), 1);
        let replies = harness.transport.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.stage, ReplyStage::Initial);
    }

    fn failing_acks() -> Arc<RecordingTransport> {
        Arc::new(RecordingTransport {
            fail_acks: true,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_failed_acknowledgment_still_replies() {
        let filters = FilterRegistry::new().with(
            FilterPosition::BeforeRouting,
            filter_fn("mute", |ctx| ctx.reject("mute", "You are muted.")),
        );
        let mut harness = Harness::new(filters);
        harness.transport = failing_acks();

        let outcome = harness.dispatch(cmd("greet").option("name", "x")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));
        assert_eq!(harness.transport.ack_count(), 1);
        let replies = harness.transport.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].1.stage, ReplyStage::Initial);
        assert_eq!(error_message(&replies[0].0), "You are muted.");
    }

    #[tokio::test]
    async fn test_failed_acknowledgment_on_every_path() {
        let mut harness = Harness::new(FilterRegistry::new());
        harness.transport = failing_acks();

        let outcome = harness.dispatch(cmd("nope")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::Routing));
        assert_eq!(harness.transport.replies().len(), 1);

        let outcome = harness.dispatch(Interaction::help("alice", "general")).await;
        assert!(matches!(outcome, DispatchOutcome::Help));
        assert_eq!(harness.transport.replies().len(), 2);

        let outcome = harness.dispatch(cmd("greet").option("name", "Ann")).await;
        assert!(outcome.is_completed());
        let replies = harness.transport.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[2].0, Reply::text("Hello, Ann!"));
        assert_eq!(replies[2].1.stage, ReplyStage::Initial);
    }

    #[tokio::test]
    async fn test_before_execution_sees_typed_arguments() {
        let filters = FilterRegistry::new().with(
            FilterPosition::BeforeExecution,
            filter_fn("cap", |ctx| {
                if ctx.argument::<i32>(0).is_some_and(|v| *v > 100) {
                    ctx.reject("cap", "Level too high.");
                }
            }),
        );
        let harness = Harness::new(filters);

        let outcome = harness.dispatch(cmd("setlevel").option("value", "500")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));
        assert_eq!(harness.journal.calls(), 0);

        let outcome = harness.dispatch(cmd("setlevel").option("value", "5")).await;
        assert!(outcome.is_completed());
        assert_eq!(harness.journal.calls(), 1);
    }

    #[tokio::test]
    async fn test_filter_rewrites_input_for_concat() {
        let filters = FilterRegistry::new().with(
            FilterPosition::BeforeAdapting,
            filter_fn("split", |ctx| {
                let words = ctx
                    .input()
                    .iter()
                    .flat_map(|token| token.split_whitespace())
                    .map(str::to_string)
                    .collect();
                ctx.set_input(words);
            }),
        );
        let harness = Harness::new(filters);

        let outcome = harness
            .dispatch(cmd("say").option("count", "2").option("text", "hello   brave world"))
            .await;
        assert!(outcome.is_completed());
        assert_eq!(*harness.journal.log.lock(), ["say 2 hello brave world"]);
    }

    #[tokio::test]
    async fn test_help_bypasses_adaptation() {
        let harness = Harness::new(FilterRegistry::new());

        let outcome = harness
            .dispatch(Interaction::help("alice", "general").option("command", "greet"))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Help));
        assert_eq!(harness.journal.calls(), 0);
        match harness.single_reply() {
            Reply::Rich(content) => assert_eq!(content.title.as_deref(), Some("Command: greet")),
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generic_help_for_unknown_target() {
        let harness = Harness::new(FilterRegistry::new());

        let outcome = harness
            .dispatch(Interaction::help("alice", "general").option("command", "nope"))
            .await;
        assert!(matches!(outcome, DispatchOutcome::Help));
        match harness.single_reply() {
            Reply::Rich(content) => {
                assert_eq!(content.title.as_deref(), Some("Available commands"))
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_is_sanitized() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("boom")).await;

        assert!(matches!(
            outcome.error(),
            Some(DispatchError::HandlerFailure { reason, .. }) if reason == "database exploded"
        ));
        let reply = harness.single_reply();
        assert_eq!(error_message(&reply), INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let harness = Harness::new(FilterRegistry::new());

        let outcome = harness.dispatch(cmd("explode")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::HandlerFailure));
        assert!(outcome.error().unwrap().to_string().contains("kaboom"));

        let outcome = harness.dispatch(cmd("greet").option("name", "Bob")).await;
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_controller_constructor_panic_is_contained() {
        let mut factories = ControllerFactories::new();
        factories.register(|| -> Journal { panic!("constructor failed") });
        let dispatcher = Dispatcher::builder(registry(), TypeAdapterRegistry::new())
            .provider(factories)
            .build();
        let recorder = Arc::new(RecordingTransport::default());
        let transport: BoxedTransport = recorder.clone();

        let outcome = dispatcher
            .dispatch(cmd("greet").option("name", "x"), transport)
            .await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::HandlerFailure));
        assert!(outcome.error().unwrap().to_string().contains("constructor failed"));

        let replies = recorder.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(error_message(&replies[0].0), INTERNAL_ERROR_MESSAGE);
        // the runtime whose first controller failed is never registered
        assert!(dispatcher.supervisor().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_layer_failure() {
        let harness = Harness::new(FilterRegistry::new());
        let outcome = harness.dispatch(cmd("slow")).await;

        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::HandlerFailure));
        assert!(harness.journal.log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_ephemeral_definition() {
        let harness = Harness::new(FilterRegistry::new());
        harness.dispatch(cmd("secret")).await;

        assert_eq!(harness.transport.acks.lock()[0], ("secret".to_string(), true));
        assert!(harness.transport.replies()[0].1.ephemeral);
    }

    #[tokio::test]
    async fn test_guild_only_filter() {
        let filters = FilterRegistry::new().with(FilterPosition::BeforeAdapting, GuildOnlyFilter);
        let harness = Harness::new(filters);

        let outcome = harness.dispatch(cmd("guild")).await;
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));
        assert_eq!(harness.journal.calls(), 0);
    }

    #[tokio::test]
    async fn test_handler_reply_then_return_value() {
        let harness = Harness::new(FilterRegistry::new());
        harness.dispatch(cmd("chatty")).await;

        let replies = harness.transport.replies();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].0, Reply::text("first"));
        assert_eq!(replies[0].1.stage, ReplyStage::Initial);
        assert_eq!(replies[1].0, Reply::text("second"));
        assert_eq!(replies[1].1.stage, ReplyStage::FollowUp);
        assert_eq!(harness.transport.ack_count(), 1);
    }

    #[tokio::test]
    async fn test_session_runtime_is_reused() {
        let harness = Harness::new(FilterRegistry::new());

        harness.dispatch(cmd("count")).await;
        harness.dispatch(cmd("count")).await;
        harness
            .dispatch(Interaction::command("count", "alice", "elsewhere"))
            .await;

        let texts: Vec<_> = harness
            .transport
            .replies()
            .into_iter()
            .map(|(reply, _)| reply.as_text().unwrap_or_default().to_string())
            .collect();
        assert_eq!(texts, ["1", "2", "1"]);
        assert_eq!(harness.dispatcher.supervisor().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatches() {
        let harness = Arc::new(Harness::new(FilterRegistry::new()));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let harness = Arc::clone(&harness);
                tokio::spawn(async move {
                    let name = format!("user{i}");
                    harness.dispatch(cmd("greet").option("name", name)).await
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_completed());
        }
        assert_eq!(harness.journal.calls(), 32);
        assert_eq!(harness.transport.replies().len(), 32);
    }
}
