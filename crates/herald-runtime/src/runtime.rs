//! Process-level orchestration.
//!
//! [`HeraldRuntime`] owns a configured [`Dispatcher`] and everything around
//! it: one tracked task per inbound interaction, the idle-runtime sweep, and
//! graceful shutdown on Ctrl+C or SIGTERM.
//!
//! ```rust,ignore
//! use herald_runtime::HeraldRuntime;
//!
//! let runtime = HeraldRuntime::builder()
//!     .config_file("config/herald.toml")
//!     .command(command("greet").param(Param::new::<String>("name")).handler(greet))
//!     .provider(factories)
//!     .build()?;
//!
//! runtime.start().await?;
//! runtime.submit(interaction, transport)?;
//! runtime.shutdown().await;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use herald_core::{BoxedTransport, Interaction};
use herald_framework::{
    ActiveFilter, CommandBuilder, CommandLineParser, DispatchOutcome, Dispatcher, Filter,
    FilterPosition, FilterRegistry, GuildOnlyFilter, HelpRenderer, InstanceProvider,
    InteractionRegistry, MuteFilter, PermissionFilter, PermissionResolver, RateLimitFilter,
    StaticPermissions, TypeAdapterRegistry, ValidatorRegistry,
};
use tokio::signal;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, HeraldConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The Herald runtime.
///
/// Built once through [`HeraldRuntime::builder`]; shared by reference (or in
/// an `Arc`) with every transport feeding it interactions.
pub struct HeraldRuntime {
    config: HeraldConfig,
    dispatcher: Dispatcher,
    parser: CommandLineParser,
    mute: Arc<MuteFilter>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    running: RwLock<bool>,
}

impl HeraldRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<InteractionRegistry> {
        self.dispatcher.registry()
    }

    /// The built-in mute filter; changes apply to the next dispatch.
    pub fn mute_filter(&self) -> &Arc<MuteFilter> {
        &self.mute
    }

    /// A parser using the configured help label.
    pub fn parser(&self) -> &CommandLineParser {
        &self.parser
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of dispatches currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Dispatches `interaction` on its own task.
    ///
    /// The handle resolves to the outcome; dropping it does not cancel the
    /// dispatch.
    pub fn submit(
        &self,
        interaction: Interaction,
        transport: BoxedTransport,
    ) -> RuntimeResult<JoinHandle<DispatchOutcome>> {
        if self.shutdown.is_cancelled() {
            debug!(label = interaction.label(), "Dropping interaction, runtime is shutting down");
            return Err(RuntimeError::ShuttingDown);
        }
        let dispatcher = self.dispatcher.clone();
        Ok(self
            .tracker
            .spawn(async move { dispatcher.dispatch(interaction, transport).await }))
    }

    /// Parses a text command line and dispatches it.
    pub fn submit_line(
        &self,
        line: &str,
        user_id: &str,
        channel_id: &str,
        transport: BoxedTransport,
    ) -> RuntimeResult<JoinHandle<DispatchOutcome>> {
        let interaction = self.parser.parse(line, user_id, channel_id)?;
        self.submit(interaction, transport)
    }

    /// Starts the idle sweep.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(RuntimeError::ShuttingDown);
        }
        {
            let mut running = self.running.write().await;
            if *running {
                warn!("Runtime is already running");
                return Ok(());
            }
            *running = true;
        }

        let handle = self.dispatcher.supervisor().spawn_sweeper(
            self.config.dispatch.sweep_interval(),
            self.shutdown.child_token(),
        );
        *self.sweeper.lock().await = Some(handle);

        info!(
            interactions = self.registry().len(),
            filters = self.dispatcher.filters().len(),
            "Runtime started"
        );
        Ok(())
    }

    /// Stops accepting interactions, waits for in-flight dispatches and stops
    /// the sweep. The runtime cannot be started again.
    pub async fn shutdown(&self) {
        {
            let mut running = self.running.write().await;
            if !*running && self.shutdown.is_cancelled() {
                warn!("Runtime is not running");
                return;
            }
            *running = false;
        }

        info!(in_flight = self.tracker.len(), "Stopping Herald runtime");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if let Some(handle) = self.sweeper.lock().await.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "Runtime sweeper failed");
        }

        info!(
            runtimes = self.dispatcher.supervisor().len(),
            "Runtime stopped"
        );
    }

    /// Runs until Ctrl+C or SIGTERM, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_signal()).await
    }

    /// Runs until `signal` completes, then shuts down.
    pub async fn run_until<F>(&self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        info!("Herald runtime is now running");
        signal.await;
        self.shutdown().await;
        Ok(())
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`HeraldRuntime`].
///
/// Configuration is loaded from the current directory unless
/// [`config`](Self::config) supplies it directly.
///
/// Built-in filters are installed ahead of any added with
/// [`filter`](Self::filter):
///
/// | Position          | Filters                                   |
/// |-------------------|-------------------------------------------|
/// | `BeforeRouting`   | mute, rate limit (when enabled)           |
/// | `BeforeAdapting`  | active, guild-only                        |
/// | `BeforeExecution` | permission                                |
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<HeraldConfig>,
    init_logging: bool,
    commands: Vec<CommandBuilder>,
    adapters: TypeAdapterRegistry,
    validators: ValidatorRegistry,
    provider: Option<Arc<dyn InstanceProvider>>,
    filters: FilterRegistry,
    permissions: Option<Arc<dyn PermissionResolver>>,
    help: Option<Arc<dyn HelpRenderer>>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            init_logging: true,
            commands: Vec::new(),
            adapters: TypeAdapterRegistry::new(),
            validators: ValidatorRegistry::new(),
            provider: None,
            filters: FilterRegistry::new(),
            permissions: None,
            help: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is; nothing is loaded.
    pub fn config(mut self, config: HeraldConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn command(mut self, command: CommandBuilder) -> Self {
        self.commands.push(command);
        self
    }

    pub fn commands(mut self, commands: impl IntoIterator<Item = CommandBuilder>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Replaces the adapter registry (built-in adapters by default).
    pub fn adapters(mut self, adapters: TypeAdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Replaces the validator registry (built-in `min`/`max` by default).
    pub fn validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    pub fn provider(mut self, provider: impl InstanceProvider) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn filter(mut self, position: FilterPosition, filter: impl Filter) -> Self {
        self.filters.register(position, filter);
        self
    }

    /// Answers permission checks. Without one, definitions requiring any
    /// permission are rejected for everyone.
    pub fn permissions(mut self, resolver: impl PermissionResolver) -> Self {
        self.permissions = Some(Arc::new(resolver));
        self
    }

    pub fn help_renderer(mut self, renderer: impl HelpRenderer) -> Self {
        self.help = Some(Arc::new(renderer));
        self
    }

    pub fn build(self) -> RuntimeResult<HeraldRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        if self.commands.is_empty() {
            return Err(RuntimeError::NoInteractions);
        }
        let registry = InteractionRegistry::builder()
            .commands(self.commands)
            .build(&self.adapters, &self.validators)?;

        let permissions = match self.permissions {
            Some(resolver) => resolver,
            None => {
                if registry.iter().any(|d| !d.permissions().is_empty()) {
                    warn!(
                        "No permission resolver configured, commands requiring permissions are denied"
                    );
                }
                Arc::new(StaticPermissions::new())
            }
        };

        let mute = Arc::new(MuteFilter::new(config.filters.mute.clone()));
        let mut filters = FilterRegistry::new();
        filters.register_boxed(FilterPosition::BeforeRouting, mute.clone());
        let rate_limit = &config.filters.rate_limit;
        if rate_limit.enabled {
            filters.register(
                FilterPosition::BeforeRouting,
                RateLimitFilter::new(rate_limit.max_events, rate_limit.window()),
            );
        }
        filters
            .register(FilterPosition::BeforeAdapting, ActiveFilter)
            .register(FilterPosition::BeforeAdapting, GuildOnlyFilter)
            .register(
                FilterPosition::BeforeExecution,
                PermissionFilter::from_arc(permissions),
            );
        for position in FilterPosition::ALL {
            for filter in self.filters.get(position) {
                filters.register_boxed(position, Arc::clone(filter));
            }
        }

        let mut dispatcher = Dispatcher::builder(registry, self.adapters)
            .filters(filters)
            .idle_timeout(config.dispatch.idle_timeout());
        if let Some(provider) = self.provider {
            dispatcher = dispatcher.shared_provider(provider);
        }
        if let Some(help) = self.help {
            dispatcher = dispatcher.shared_help_renderer(help);
        }
        let dispatcher = dispatcher.build();

        info!(
            log_level = %config.logging.level,
            idle_timeout_secs = config.dispatch.idle_timeout_secs,
            rate_limit = rate_limit.enabled,
            "Runtime initialized from configuration"
        );

        Ok(HeraldRuntime {
            parser: CommandLineParser::new(config.dispatch.help_label.clone()),
            config,
            dispatcher,
            mute,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
            running: RwLock::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use herald_core::{Reply, ReplyOptions, Transport, TransportResult};
    use herald_framework::{
        CommandEvent, ControllerFactories, DispatchErrorKind, Param, command, filter_fn,
    };
    use parking_lot::Mutex as SyncMutex;

    use super::*;

    #[derive(Default)]
    struct Greeter;

    async fn greet(_: Arc<Greeter>, _: CommandEvent, name: String) -> String {
        format!("Hello, {name}!")
    }

    async fn purge(_: Arc<Greeter>, _: CommandEvent) -> &'static str {
        "purged"
    }

    #[derive(Default)]
    struct Recorder {
        replies: SyncMutex<Vec<Reply>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn acknowledge(&self, _: &Interaction, _: bool) -> TransportResult<()> {
            Ok(())
        }

        async fn reply(&self, _: &Interaction, reply: &Reply, _: ReplyOptions) -> TransportResult<()> {
            self.replies.lock().push(reply.clone());
            Ok(())
        }
    }

    fn builder(config: HeraldConfig) -> RuntimeBuilder {
        let mut factories = ControllerFactories::new();
        factories.register_default::<Greeter>();
        HeraldRuntime::builder()
            .config(config)
            .without_logging()
            .command(command("greet").param(Param::new::<String>("name")).handler(greet))
            .command(command("purge").permission("admin").handler(purge))
            .provider(factories)
    }

    #[tokio::test]
    async fn test_submit_dispatches_on_task() {
        let runtime = builder(HeraldConfig::default()).build().unwrap();
        runtime.start().await.unwrap();
        assert!(runtime.is_running().await);

        let transport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit(
                Interaction::command("greet", "alice", "general").option("name", "Bob"),
                transport.clone(),
            )
            .unwrap()
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(transport.replies.lock()[0], Reply::text("Hello, Bob!"));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_mute_filter_is_live() {
        let runtime = builder(HeraldConfig::default()).build().unwrap();
        runtime.mute_filter().mute_user("mallory");

        let transport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit_line("greet name:Bob", "mallory", "general", transport.clone())
            .unwrap()
            .await
            .unwrap();
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));

        runtime.mute_filter().unmute_user("mallory");
        let outcome = runtime
            .submit_line("greet name:Bob", "mallory", "general", transport)
            .unwrap()
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_rate_limit_from_config() {
        let mut config = HeraldConfig::default();
        config.filters.rate_limit.enabled = true;
        config.filters.rate_limit.max_events = 1;
        let runtime = builder(config).build().unwrap();

        let transport: BoxedTransport = Arc::new(Recorder::default());
        let first = runtime
            .submit_line("greet name:a", "alice", "general", transport.clone())
            .unwrap()
            .await
            .unwrap();
        let second = runtime
            .submit_line("greet name:b", "alice", "general", transport)
            .unwrap()
            .await
            .unwrap();
        assert!(first.is_completed());
        assert_eq!(second.error_kind(), Some(DispatchErrorKind::FilterRejection));
    }

    #[tokio::test]
    async fn test_permissions_denied_without_resolver() {
        let runtime = builder(HeraldConfig::default()).build().unwrap();
        let transport: BoxedTransport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit_line("purge", "alice", "general", transport)
            .unwrap()
            .await
            .unwrap();
        assert_eq!(outcome.error_kind(), Some(DispatchErrorKind::FilterRejection));

        let runtime = builder(HeraldConfig::default())
            .permissions(StaticPermissions::new().grant("alice", "admin"))
            .build()
            .unwrap();
        let transport: BoxedTransport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit_line("purge", "alice", "general", transport)
            .unwrap()
            .await
            .unwrap();
        assert!(outcome.is_completed());
    }

    #[tokio::test]
    async fn test_custom_filters_run_after_builtins() {
        let runtime = builder(HeraldConfig::default())
            .filter(
                FilterPosition::BeforeRouting,
                filter_fn("closed", |ctx| ctx.reject("closed", "Closed for today.")),
            )
            .build()
            .unwrap();
        assert_eq!(
            runtime
                .dispatcher()
                .filters()
                .get(FilterPosition::BeforeRouting)
                .len(),
            2
        );

        let transport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit_line("greet name:Bob", "alice", "general", transport.clone())
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(
            outcome.error(),
            Some(herald_framework::DispatchError::FilterRejection { filter, .. }) if filter == "closed"
        ));
    }

    #[tokio::test]
    async fn test_configured_help_label() {
        let mut config = HeraldConfig::default();
        config.dispatch.help_label = "?".into();
        let runtime = builder(config).build().unwrap();

        let transport = Arc::new(Recorder::default());
        let outcome = runtime
            .submit_line("? greet", "alice", "general", transport.clone())
            .unwrap()
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Help));
        assert!(matches!(transport.replies.lock()[0], Reply::Rich(_)));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let runtime = builder(HeraldConfig::default()).build().unwrap();
        runtime.start().await.unwrap();
        runtime.shutdown().await;

        assert!(!runtime.is_running().await);
        assert!(runtime.is_shutting_down());
        let transport: BoxedTransport = Arc::new(Recorder::default());
        assert!(matches!(
            runtime.submit_line("greet name:Bob", "alice", "general", transport),
            Err(RuntimeError::ShuttingDown)
        ));
        assert!(matches!(runtime.start().await, Err(RuntimeError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_run_until_waits_for_in_flight() {
        let runtime = Arc::new(builder(HeraldConfig::default()).build().unwrap());
        let transport = Arc::new(Recorder::default());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let run = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move {
                runtime
                    .run_until(async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        tokio::task::yield_now().await;
        for _ in 0..8 {
            runtime
                .submit_line("greet name:Bob", "alice", "general", transport.clone())
                .unwrap();
        }
        let _ = tx.send(());
        run.await.unwrap().unwrap();

        assert_eq!(runtime.in_flight(), 0);
        assert_eq!(transport.replies.lock().len(), 8);
    }

    #[test]
    fn test_build_errors() {
        let err = HeraldRuntime::builder()
            .config(HeraldConfig::default())
            .without_logging()
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::NoInteractions));

        let mut config = HeraldConfig::default();
        config.dispatch.sweep_interval_secs = 0;
        let err = builder(config).build().err().unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));

        let err = builder(HeraldConfig::default())
            .command(command("greet").handler(purge))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, RuntimeError::Definition(_)));
    }
}
