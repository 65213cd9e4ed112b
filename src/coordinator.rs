//! The top-level coordinator: composes [`Registry`], [`Kernel`],
//! [`GlobalScheduler`], [`MessageFactory`], and [`RuntimeConfig`] into the
//! single surface external callers (and `bin/junction-cli`) drive
//! (spec.md §4.2, §6, SPEC_FULL.md component L15).
//!
//! Mirrors this crate's message routing layer's top-level `MessageRouter`:
//! one struct owning every child service, `#[instrument]`ed entry points,
//! and a result envelope shape (`{success, ...}`) rather than a bare
//! `Result` at the public boundary, so the CLI and any future transport can
//! serialize failures uniformly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::config::RuntimeConfig;
use crate::domain_types::{QueueCapacity, SubsystemName};
use crate::error::{CoordinatorError, ErrorCode};
use crate::facet::{ContractRegistry, FacetManager, Hook, HookContext};
use crate::kernel::{Kernel, Pkr, Profile};
use crate::listeners::Listener;
use crate::message::{MessageFactory, MessageOptions};
use crate::queue::OverflowPolicy;
use crate::registry::Registry;
use crate::requests::{RequestBuilder, RequestOptions};
use crate::root_router::{RootRouter, RouteOutcome};
use crate::router::{RouteHandler, RouteMetadata};
use crate::scheduler::GlobalScheduler;
use crate::subsystem::{AcceptOptions, Disposition, Subsystem};
use crate::time_provider::{SharedTimeProvider, TimeProvider};

/// The coordinator's public result envelope (spec.md §6): a tagged success
/// union rather than a bare `Result`, so every surface (CLI, a future HTTP
/// transport) serializes the same shape regardless of transport.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// The subsystem the message was routed to, if routing got that far.
    pub subsystem: Option<SubsystemName>,
    /// The dispatched message's id.
    pub message_id: Option<Uuid>,
    /// The handler's result, for a resolved query or request.
    pub result: Option<Value>,
    /// Set when the message was enqueued rather than resolved immediately.
    pub enqueued: Option<bool>,
    /// The structured error, if `success` is `false`.
    pub error: Option<SendErrorBody>,
}

/// The `{code, message, details?}` error body spec.md §6 nests under
/// `SendResult::error`.
#[derive(Debug, Clone, Serialize)]
pub struct SendErrorBody {
    /// The stable error code taxonomy.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

impl From<CoordinatorError> for SendErrorBody {
    fn from(err: CoordinatorError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Options accepted by [`Coordinator::register_subsystem`].
pub struct RegisterOptions {
    /// Scheduling discipline (spec.md §4.6).
    pub disposition: Disposition,
    /// Bounded queue capacity.
    pub queue_capacity: QueueCapacity,
    /// Overflow policy applied once the queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Facet hooks to build for this subsystem (spec.md §4.3).
    pub hooks: Vec<Hook>,
    /// The scheduler priority passed to [`GlobalScheduler::schedule`].
    pub priority: i32,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            disposition: Disposition::Canonical,
            queue_capacity: QueueCapacity::default(),
            overflow_policy: OverflowPolicy::Error,
            hooks: Vec::new(),
            priority: 0,
        }
    }
}

/// The runtime's top-level composition root (spec.md §4.2 `bootstrap`).
pub struct Coordinator {
    registry: Arc<Mutex<Registry>>,
    kernel: Arc<Mutex<Kernel>>,
    scheduler: Arc<GlobalScheduler>,
    factory: MessageFactory,
    contracts: ContractRegistry,
    config: RuntimeConfig,
    time_provider: SharedTimeProvider,
}

impl Coordinator {
    /// Bootstraps the runtime: builds the kernel first (spec.md §3:
    /// "Coordinator bootstrap builds the kernel before any user
    /// subsystem"), then an empty registry and scheduler over both.
    #[must_use]
    pub fn bootstrap(config: RuntimeConfig, time_provider: SharedTimeProvider) -> Self {
        let now = now_millis(time_provider.as_ref());
        let kernel = Arc::new(Mutex::new(Kernel::bootstrap(config.error_manager_max_size(), now)));
        let registry = Arc::new(Mutex::new(Registry::new()));
        let scheduler = Arc::new(GlobalScheduler::new(
            registry.clone(),
            kernel.clone(),
            config.scheduling_strategy(),
            config.time_slice_ms(),
            config.tick_interval(),
            time_provider.clone(),
        ));

        Self {
            registry,
            kernel,
            scheduler,
            factory: MessageFactory::new(),
            contracts: ContractRegistry::new(),
            config,
            time_provider,
        }
    }

    /// The active runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Registers a named contract's required method list, consulted by
    /// every subsequent [`Self::register_subsystem`] whose hooks declare it
    /// (SPEC_FULL.md §3.1).
    pub fn register_contract(&mut self, contract: impl Into<String>, methods: Vec<String>) {
        self.contracts.register(contract, methods);
    }

    /// Registers a subsystem (spec.md §4.2/§4.9 `registerSubsystem`):
    ///
    /// 1. Mints a kernel-issued principal identity for the new subsystem.
    /// 2. Builds and initialises its facets from `opts.hooks`.
    /// 3. Attaches facets and identity, inserts into the registry.
    /// 4. Schedules it with the scheduler at `opts.priority`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Facet`] if facet build or init fails.
    #[instrument(skip(self, opts), fields(subsystem = %name))]
    pub async fn register_subsystem(
        &self,
        name: SubsystemName,
        opts: RegisterOptions,
    ) -> Result<SubsystemName, CoordinatorError> {
        let mut sub = Subsystem::new(name.clone(), opts.disposition, opts.queue_capacity, opts.overflow_policy);

        let ctx = HookContext {
            ms: 0,
            config: self.config.facet_config_map(),
            debug: self.config.debug(),
        };
        let mut facets = FacetManager::build(opts.hooks, &ctx, &name, &self.contracts)?;
        facets.init_all()?;
        sub.attach_facets(facets)?;

        let mut kernel = self.kernel.lock().await;
        let identity = kernel.register_subsystem(now_millis(self.time_provider.as_ref()));
        sub.attach_identity(identity.pkr);
        drop(kernel);

        self.registry.lock().await.insert(sub);
        self.scheduler.schedule(name.clone(), opts.priority).await;

        Ok(name)
    }

    /// Removes and disposes a subsystem, unscheduling it first so the
    /// scheduler never observes a half-torn-down entry.
    pub async fn unregister_subsystem(&self, name: &SubsystemName) {
        self.scheduler.unschedule(name).await;
        if let Some(mut sub) = self.registry.lock().await.remove(name) {
            sub.dispose();
        }
    }

    /// Sends a message through the root router (spec.md §4.2 `send`),
    /// returning the public result envelope rather than propagating a raw
    /// error, so callers at the transport boundary never need a second
    /// translation step.
    #[instrument(skip(self, body, options, accept))]
    pub async fn send(
        &self,
        path: impl Into<String> + std::fmt::Debug,
        body: Value,
        options: MessageOptions,
        accept: AcceptOptions,
    ) -> SendResult {
        let msg = match self.factory.create_with_options(path, body, options) {
            Ok(msg) => msg,
            Err(err) => return Self::failure(CoordinatorError::from(err)),
        };
        let message_id = msg.id();
        let subsystem = SubsystemName::try_new(msg.path().subsystem()).ok();

        let mut registry = self.registry.lock().await;
        let mut kernel = self.kernel.lock().await;
        let outcome = RootRouter::route(&mut registry, &mut kernel, msg, accept);
        Self::outcome_to_result(subsystem, message_id.into(), outcome)
    }

    /// Creates and sends a batch of messages sharing one transaction id
    /// (spec.md §4.1e `createTransactionBatch`), routing each in the order
    /// given under a single lock acquisition so enqueue order on any shared
    /// subsystem preserves `seq`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Message`] if any spec's path fails to
    /// parse; no message in the batch is routed in that case.
    pub async fn send_transaction_batch(
        &self,
        specs: Vec<(String, Value, MessageOptions)>,
        global_options: MessageOptions,
        accept: AcceptOptions,
    ) -> Result<Vec<SendResult>, CoordinatorError> {
        let messages = self.factory.create_transaction_batch(specs, global_options)?;

        let mut registry = self.registry.lock().await;
        let mut kernel = self.kernel.lock().await;
        let results = messages
            .into_iter()
            .map(|msg| {
                let message_id = msg.id();
                let subsystem = SubsystemName::try_new(msg.path().subsystem()).ok();
                let outcome = RootRouter::route(&mut registry, &mut kernel, msg, accept.clone());
                Self::outcome_to_result(subsystem, message_id.into(), outcome)
            })
            .collect();
        Ok(results)
    }

    fn outcome_to_result(
        subsystem: Option<SubsystemName>,
        message_id: Uuid,
        outcome: Result<RouteOutcome, CoordinatorError>,
    ) -> SendResult {
        match outcome {
            Ok(RouteOutcome::Resolved(result)) => SendResult {
                success: true,
                subsystem,
                message_id: Some(message_id),
                result: Some(result),
                enqueued: Some(false),
                error: None,
            },
            Ok(RouteOutcome::Enqueued(accepted)) => SendResult {
                success: accepted,
                subsystem,
                message_id: Some(message_id),
                result: None,
                enqueued: Some(accepted),
                error: if accepted {
                    None
                } else {
                    Some(CoordinatorError::Subsystem(crate::error::SubsystemError::Queue(
                        crate::error::QueueError::QueueFull { capacity: 0 },
                    ))
                    .into())
                },
            },
            Err(err) => Self::failure_with(subsystem, Some(message_id), err),
        }
    }

    /// Sends a message and awaits its reply via the request/response
    /// overlay (spec.md §5), rather than firing and returning immediately.
    ///
    /// # Errors
    ///
    /// See [`RequestBuilder::send`].
    pub async fn request(
        &self,
        path: impl Into<String>,
        body: Value,
        options: MessageOptions,
        request_opts: RequestOptions,
    ) -> Result<Value, CoordinatorError> {
        let requests = RequestBuilder::new(&self.factory, self.registry.clone(), self.kernel.clone());
        requests.send(path, body, options, request_opts).await
    }

    /// Executes an ACL-checked `sendProtected` call on behalf of `caller`
    /// (spec.md §4.10), dispatching onward via the root router once the
    /// kernel's checks pass.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError`](crate::error::KernelError) variants from the
    /// six-step algorithm, or whatever dispatch itself raises.
    pub async fn send_protected(
        &self,
        caller: Pkr,
        path: impl Into<String>,
        body: Value,
        options: MessageOptions,
        accept: AcceptOptions,
    ) -> Result<Value, CoordinatorError> {
        let msg = self.factory.create_with_options(path, body, options)?;
        // Lock registry before kernel, matching GlobalScheduler::tick's
        // acquisition order, so a concurrent tick never deadlocks against a
        // concurrent sendProtected call.
        let mut registry = self.registry.lock().await;
        let mut kernel = self.kernel.lock().await;
        let now = now_millis(self.time_provider.as_ref());

        kernel
            .send_protected(caller, msg, accept, now, |msg, opts, kernel| {
                match RootRouter::route(&mut registry, kernel, msg, opts) {
                    Ok(RouteOutcome::Resolved(value)) => Ok(value),
                    Ok(RouteOutcome::Enqueued(_)) => Ok(Value::Null),
                    Err(crate::error::CoordinatorError::Kernel(kernel_err)) => Err(kernel_err),
                    Err(_other) => Err(crate::error::KernelError::AccessDenied),
                }
            })
            .map_err(CoordinatorError::from)
    }

    /// Direct kernel passthrough: creates a resource owned by `owner`
    /// (spec.md §4.9 `createResource`).
    ///
    /// # Errors
    ///
    /// See [`Kernel::create_resource`].
    pub async fn create_resource(
        &self,
        owner: Pkr,
        name: impl Into<String>,
        instance: Value,
        metadata: HashMap<String, Value>,
    ) -> Result<(), CoordinatorError> {
        self.kernel
            .lock()
            .await
            .create_resource(owner, name, instance, metadata)
            .map_err(CoordinatorError::from)
    }

    /// Direct kernel passthrough: creates a channel (spec.md §4.9
    /// `createChannel`).
    ///
    /// # Errors
    ///
    /// See [`Kernel::create_channel`].
    pub async fn create_channel(
        &self,
        route: impl Into<String>,
        owner: Pkr,
        participants: HashSet<Uuid>,
        metadata: HashMap<String, Value>,
    ) -> Result<(), CoordinatorError> {
        self.kernel
            .lock()
            .await
            .create_channel(route, owner, participants, metadata)
            .map_err(CoordinatorError::from)
    }

    /// Direct kernel passthrough: mints a standalone friend principal
    /// (spec.md §4.12).
    pub async fn create_friend(&self, ttl_millis: Option<u128>) -> crate::kernel::Friend {
        let now = now_millis(self.time_provider.as_ref());
        self.kernel.lock().await.create_friend(ttl_millis, now)
    }

    /// Direct kernel passthrough: inserts or replaces a named profile.
    pub async fn upsert_profile(&self, profile: Profile) {
        self.kernel.lock().await.upsert_profile(profile);
    }

    /// Registers a handler for `pattern` on `subsystem`'s local router
    /// (spec.md §4.4). External callers reach the local router only through
    /// this passthrough, the same way [`Self::listener_on`] reaches the
    /// listener table — the registry lock is never exposed directly.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Subsystem`] if `subsystem` isn't
    /// registered, or [`CoordinatorError::Route`] if `pattern` fails to
    /// parse or duplicates an existing pattern without `overwrite`.
    pub async fn register_route(
        &self,
        subsystem: &SubsystemName,
        pattern: impl Into<String>,
        handler: RouteHandler,
        metadata: RouteMetadata,
        overwrite: bool,
    ) -> Result<(), CoordinatorError> {
        let mut registry = self.registry.lock().await;
        let sub = registry
            .get_mut(subsystem)
            .ok_or_else(|| CoordinatorError::Subsystem(crate::error::SubsystemError::InvalidState {
                subsystem: subsystem.to_string(),
                state: "unregistered",
                action: "register_route",
            }))?;
        sub.router_mut()
            .register_route(pattern, handler, metadata, overwrite)
            .map_err(CoordinatorError::from)
    }

    /// Registers a listener on `path` for `subsystem` (spec.md §4.2
    /// `listenerOn`, delegating to the subsystem's own listener table).
    pub async fn listener_on(&self, subsystem: &SubsystemName, path: impl Into<String>, listener: Listener) {
        if let Some(sub) = self.registry.lock().await.get_mut(subsystem) {
            sub.listener_on(path, listener);
        }
    }

    /// Removes every listener registered on `path` for `subsystem`.
    pub async fn listener_off(&self, subsystem: &SubsystemName, path: &str) -> bool {
        self.registry
            .lock()
            .await
            .get_mut(subsystem)
            .is_some_and(|sub| sub.listener_off(path))
    }

    /// Starts the background scheduler loop (spec.md §4.8 `startScheduler`).
    pub async fn start_scheduler(&self) {
        self.scheduler.start().await;
    }

    /// Stops the background scheduler loop (spec.md §4.8 `stopScheduler`).
    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    /// Whether the scheduler's background loop is currently running.
    pub async fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running().await
    }

    /// Lists every registered subsystem's name, for enumeration surfaces
    /// (the CLI's `subsystems list`).
    pub async fn subsystem_names(&self) -> Vec<SubsystemName> {
        self.registry.lock().await.names()
    }

    /// Queries the kernel's retained error history.
    pub async fn query_errors(
        &self,
        query: crate::error_manager::ErrorQuery,
    ) -> Vec<crate::error_manager::ErrorRecord> {
        self.kernel.lock().await.error_manager().query(&query)
    }

    fn failure(err: CoordinatorError) -> SendResult {
        Self::failure_with(None, None, err)
    }

    fn failure_with(subsystem: Option<SubsystemName>, message_id: Option<Uuid>, err: CoordinatorError) -> SendResult {
        SendResult {
            success: false,
            subsystem,
            message_id,
            result: None,
            enqueued: None,
            error: Some(err.into()),
        }
    }
}

fn now_millis(provider: &dyn TimeProvider) -> u128 {
    provider
        .now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_millis()
}
