//! Session-scoped runtimes.
//!
//! Every session (user + channel) gets one [`InteractionRuntime`] holding the
//! controller instances its commands run against. A runtime is created on
//! first use, reused by later dispatches from the same session, and evicted
//! once it has been idle longer than the supervisor's timeout.
//!
//! The key → runtime map is the only mutable state shared between dispatches.
//! Acquisition, eviction and the idle sweep all run under the same lock, and
//! a runtime that is currently leased to a dispatch is never swept.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use herald_core::SessionKey;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::definition::InteractionDefinition;
use crate::error::ProvideError;

/// A type-erased controller instance.
pub type BoxedInstance = Arc<dyn Any + Send + Sync>;

/// Runtimes idle for this long are evicted unless configured otherwise.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

// ============================================================================
// Instance provision
// ============================================================================

/// Constructs the controller instance a definition's handler is bound to.
///
/// `provide` runs while the supervisor's session map is locked, so every
/// other session waits on it, the idle sweep included. Keep constructors
/// cheap and move slow setup into the handler or a lazily initialized field.
/// A panic here is reported as a handler failure of the dispatch that
/// triggered it.
pub trait InstanceProvider: Send + Sync + 'static {
    fn provide(&self, definition: &InteractionDefinition) -> Result<BoxedInstance, ProvideError>;
}

type Factory = Arc<dyn Fn() -> Result<BoxedInstance, ProvideError> + Send + Sync>;

/// An [`InstanceProvider`] backed by one factory per controller type.
///
/// ```rust,ignore
/// let mut factories = ControllerFactories::new();
/// factories.register_default::<Counter>();
/// factories.register(|| Greeter::new("Hello"));
/// ```
#[derive(Clone, Default)]
pub struct ControllerFactories {
    factories: HashMap<TypeId, Factory>,
}

impl ControllerFactories {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C, F>(&mut self, factory: F) -> &mut Self
    where
        C: Send + Sync + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<C>(),
            Arc::new(move || Ok(Arc::new(factory()) as BoxedInstance)),
        );
        self
    }

    /// Registers a fallible factory; its error becomes
    /// [`ProvideError::Construction`].
    pub fn try_register<C, E, F>(&mut self, factory: F) -> &mut Self
    where
        C: Send + Sync + 'static,
        E: fmt::Display,
        F: Fn() -> Result<C, E> + Send + Sync + 'static,
    {
        self.factories.insert(
            TypeId::of::<C>(),
            Arc::new(move || {
                factory()
                    .map(|controller| Arc::new(controller) as BoxedInstance)
                    .map_err(|e| ProvideError::construction(std::any::type_name::<C>(), e))
            }),
        );
        self
    }

    pub fn register_default<C>(&mut self) -> &mut Self
    where
        C: Default + Send + Sync + 'static,
    {
        self.register(C::default)
    }

    pub fn contains<C: 'static>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<C>())
    }
}

impl InstanceProvider for ControllerFactories {
    fn provide(&self, definition: &InteractionDefinition) -> Result<BoxedInstance, ProvideError> {
        let controller = definition.controller();
        let factory = self
            .factories
            .get(&controller.id())
            .ok_or(ProvideError::Unregistered(controller.name()))?;
        factory()
    }
}

impl fmt::Debug for ControllerFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerFactories")
            .field("count", &self.factories.len())
            .finish()
    }
}

// ============================================================================
// InteractionRuntime
// ============================================================================

/// The controller instances owned by one session.
pub struct InteractionRuntime {
    key: SessionKey,
    id: u64,
    instances: Mutex<HashMap<TypeId, BoxedInstance>>,
    last_activity: Mutex<Instant>,
    leases: AtomicUsize,
}

impl InteractionRuntime {
    fn new(key: SessionKey, id: u64) -> Self {
        Self {
            key,
            id,
            instances: Mutex::new(HashMap::new()),
            last_activity: Mutex::new(Instant::now()),
            leases: AtomicUsize::new(0),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Unique per runtime ever created by a supervisor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The live instance of controller `C`, if this runtime has built one.
    pub fn instance<C: Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        let instance = self.instances.lock().get(&TypeId::of::<C>()).cloned()?;
        instance.downcast::<C>().ok()
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    /// Dispatches currently holding this runtime.
    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::Acquire)
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn instance_or_provide(
        &self,
        definition: &InteractionDefinition,
        provider: &dyn InstanceProvider,
    ) -> Result<BoxedInstance, ProvideError> {
        let mut instances = self.instances.lock();
        let type_id = definition.controller().id();
        if let Some(instance) = instances.get(&type_id) {
            return Ok(Arc::clone(instance));
        }
        let instance = provider.provide(definition)?;
        debug!(
            session = %self.key,
            controller = %definition.controller(),
            "Constructed controller instance"
        );
        instances.insert(type_id, Arc::clone(&instance));
        Ok(instance)
    }

    fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        self.active_leases() == 0 && now.saturating_duration_since(self.last_activity()) >= timeout
    }
}

impl fmt::Debug for InteractionRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionRuntime")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("leases", &self.active_leases())
            .finish_non_exhaustive()
    }
}

/// A dispatch's hold on a runtime. While any lease is alive the runtime is
/// not evicted; dropping the last one starts its idle clock.
pub struct RuntimeLease {
    runtime: Arc<InteractionRuntime>,
    instance: BoxedInstance,
}

impl RuntimeLease {
    pub fn runtime(&self) -> &Arc<InteractionRuntime> {
        &self.runtime
    }

    /// The controller instance the leased definition is bound to.
    pub fn instance(&self) -> BoxedInstance {
        Arc::clone(&self.instance)
    }
}

impl Drop for RuntimeLease {
    fn drop(&mut self) {
        self.runtime.touch();
        self.runtime.leases.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for RuntimeLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeLease")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RuntimeSupervisor
// ============================================================================

/// Creates, reuses and expires session runtimes.
pub struct RuntimeSupervisor {
    provider: Arc<dyn InstanceProvider>,
    idle_timeout: Duration,
    runtimes: Mutex<HashMap<SessionKey, Arc<InteractionRuntime>>>,
    next_id: AtomicU64,
}

impl RuntimeSupervisor {
    pub fn new(provider: Arc<dyn InstanceProvider>, idle_timeout: Duration) -> Self {
        Self {
            provider,
            idle_timeout,
            runtimes: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Leases the runtime for `key`, creating it when none is live, and makes
    /// sure it holds an instance of `definition`'s controller.
    ///
    /// A runtime whose first controller fails to construct is not registered.
    pub fn acquire(
        &self,
        key: &SessionKey,
        definition: &InteractionDefinition,
    ) -> Result<RuntimeLease, ProvideError> {
        let mut runtimes = self.runtimes.lock();

        let (runtime, created) = match runtimes.get(key) {
            Some(runtime) => (Arc::clone(runtime), false),
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                (Arc::new(InteractionRuntime::new(key.clone(), id)), true)
            }
        };

        let instance = runtime.instance_or_provide(definition, self.provider.as_ref())?;
        runtime.leases.fetch_add(1, Ordering::AcqRel);
        runtime.touch();

        if created {
            debug!(session = %key, runtime = runtime.id(), "Created session runtime");
            runtimes.insert(key.clone(), Arc::clone(&runtime));
        } else {
            trace!(session = %key, runtime = runtime.id(), "Reusing session runtime");
        }

        Ok(RuntimeLease { runtime, instance })
    }

    /// The live runtime for `key`, without leasing it.
    pub fn get(&self, key: &SessionKey) -> Option<Arc<InteractionRuntime>> {
        self.runtimes.lock().get(key).cloned()
    }

    /// Removes the runtime for `key` regardless of activity. Dispatches that
    /// already hold a lease keep using the removed runtime.
    pub fn evict(&self, key: &SessionKey) -> bool {
        let removed = self.runtimes.lock().remove(key);
        if let Some(runtime) = &removed {
            debug!(session = %key, runtime = runtime.id(), "Evicted session runtime");
        }
        removed.is_some()
    }

    /// Removes every unleased runtime idle for at least the timeout.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let timeout = self.idle_timeout;
        let mut runtimes = self.runtimes.lock();
        let before = runtimes.len();
        runtimes.retain(|key, runtime| {
            let expired = runtime.is_idle(now, timeout);
            if expired {
                debug!(session = %key, runtime = runtime.id(), "Session runtime expired");
            }
            !expired
        });
        before - runtimes.len()
    }

    pub fn len(&self) -> usize {
        self.runtimes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runtimes.lock().is_empty()
    }

    /// Spawns the idle sweep, running every `interval` until `shutdown` is
    /// cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(?interval, idle_timeout = ?supervisor.idle_timeout, "Runtime sweeper started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = supervisor.evict_idle();
                        if evicted > 0 {
                            debug!(evicted, remaining = supervisor.len(), "Swept idle runtimes");
                        }
                    }
                }
            }
            info!("Runtime sweeper stopped");
        })
    }
}

impl fmt::Debug for RuntimeSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeSupervisor")
            .field("idle_timeout", &self.idle_timeout)
            .field("runtimes", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::adapter::TypeAdapterRegistry;
    use crate::definition::{InteractionRegistry, command};
    use crate::event::CommandEvent;
    use crate::validation::ValidatorRegistry;

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    struct Counter;

    async fn count(_: Arc<Counter>, _: CommandEvent) {}

    fn definition() -> Arc<InteractionDefinition> {
        let registry = InteractionRegistry::builder()
            .command(command("count").handler(count))
            .build(&TypeAdapterRegistry::new(), &ValidatorRegistry::new())
            .unwrap();
        registry.resolve("count").unwrap()
    }

    fn supervisor(built: &'static AtomicUsize, idle: Duration) -> Arc<RuntimeSupervisor> {
        let mut factories = ControllerFactories::new();
        factories.register(move || {
            built.fetch_add(1, Ordering::SeqCst);
            Counter
        });
        Arc::new(RuntimeSupervisor::new(Arc::new(factories), idle))
    }

    fn key() -> SessionKey {
        SessionKey::new("alice", "general")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_shares_one_runtime() {
        let supervisor = supervisor(&BUILT, DEFAULT_IDLE_TIMEOUT);
        let definition = definition();

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let supervisor = Arc::clone(&supervisor);
                let definition = Arc::clone(&definition);
                tokio::spawn(async move {
                    let lease = supervisor.acquire(&key(), &definition).unwrap();
                    (lease.runtime().id(), lease.instance())
                })
            })
            .collect();

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        let (first_id, first_instance) = &results[0];
        for (id, instance) in &results {
            assert_eq!(id, first_id);
            assert!(Arc::ptr_eq(instance, first_instance));
        }
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_runtime_expires() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let supervisor = supervisor(&BUILT, Duration::from_secs(60));
        let definition = definition();

        let first = {
            let lease = supervisor.acquire(&key(), &definition).unwrap();
            lease.instance()
        };

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(supervisor.evict_idle(), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(supervisor.evict_idle(), 1);
        assert!(supervisor.is_empty());

        let lease = supervisor.acquire(&key(), &definition).unwrap();
        assert!(!Arc::ptr_eq(&first, &lease.instance()));
        assert_eq!(BUILT.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leased_runtime_survives_sweep() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let supervisor = supervisor(&BUILT, Duration::from_secs(60));
        let definition = definition();

        let lease = supervisor.acquire(&key(), &definition).unwrap();
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(supervisor.evict_idle(), 0);

        // an acquire that lands before eviction sees the same instance
        let second = supervisor.acquire(&key(), &definition).unwrap();
        assert!(Arc::ptr_eq(&lease.instance(), &second.instance()));
        assert_eq!(lease.runtime().active_leases(), 2);

        drop(lease);
        drop(second);
        assert_eq!(supervisor.evict_idle(), 0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(supervisor.evict_idle(), 1);
        assert_eq!(BUILT.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_explicit_evict_then_fresh_instance() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let supervisor = supervisor(&BUILT, DEFAULT_IDLE_TIMEOUT);
        let definition = definition();

        let first = supervisor.acquire(&key(), &definition).unwrap();
        assert!(supervisor.evict(&key()));
        assert!(!supervisor.evict(&key()));

        let second = supervisor.acquire(&key(), &definition).unwrap();
        assert_ne!(first.runtime().id(), second.runtime().id());
        assert!(!Arc::ptr_eq(&first.instance(), &second.instance()));
        assert!(second.runtime().instance::<Counter>().is_some());
    }

    #[test]
    fn test_unregistered_controller() {
        let supervisor = RuntimeSupervisor::new(
            Arc::new(ControllerFactories::new()),
            DEFAULT_IDLE_TIMEOUT,
        );
        let err = supervisor.acquire(&key(), &definition()).unwrap_err();
        assert!(matches!(err, ProvideError::Unregistered(_)));
        assert!(supervisor.is_empty());
    }
}
