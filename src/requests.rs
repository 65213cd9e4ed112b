//! Request/response overlay atop the one-shot reply waiters
//! [`crate::kernel::response_manager::ResponseManager`] tracks and the
//! channel membership [`crate::kernel::channel::ChannelManager`] enforces
//! (spec.md §5, SPEC_FULL.md component L14).
//!
//! A request is an ordinary message sent through [`crate::root_router::RootRouter`]
//! whose reply is awaited on a registered `<caller>://reply/<messageId>`
//! route. Whether the original message travelled a plain subsystem route or
//! a channel route makes no difference to the overlay: the responder's
//! eventual reply resolves the same waiter either way, since
//! [`crate::kernel::Kernel::send_protected`] recognises `is_reply()` paths
//! independent of how the request itself was delivered.
//!
//! [`RequestBuilder`] locks [`Registry`]/[`Kernel`] only for the synchronous
//! dispatch step, the same `Arc<Mutex<_>>` pair [`crate::scheduler::GlobalScheduler`]
//! holds — the reply wait itself holds no lock, so a slow responder never
//! blocks the scheduler's tick loop or a concurrent request.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::domain_types::TimeoutMs;
use crate::error::{CoordinatorError, RequestError};
use crate::kernel::Kernel;
use crate::message::{Message, MessageFactory, MessageOptions};
use crate::registry::Registry;
use crate::root_router::{RootRouter, RouteOutcome};
use crate::subsystem::AcceptOptions;

/// Per-request overlay options (spec.md §5: default one-shot timeout is
/// 5000ms).
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// How long to wait for a reply before giving up.
    pub timeout: TimeoutMs,
    /// Options forwarded to [`RootRouter::route`] for the outbound message.
    pub accept: AcceptOptions,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: TimeoutMs::default_one_shot(),
            accept: AcceptOptions::default(),
        }
    }
}

/// Sends a message and awaits its reply, composing [`MessageFactory`],
/// [`Kernel::register_reply_waiter`], and [`RootRouter::route`] the way
/// spec.md §5 describes the overlay built atop the message/routing layer.
pub struct RequestBuilder<'a> {
    factory: &'a MessageFactory,
    registry: Arc<Mutex<Registry>>,
    kernel: Arc<Mutex<Kernel>>,
}

impl<'a> RequestBuilder<'a> {
    /// Builds a request sender over the coordinator's shared registry,
    /// kernel, and message factory.
    #[must_use]
    pub fn new(factory: &'a MessageFactory, registry: Arc<Mutex<Registry>>, kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { factory, registry, kernel }
    }

    /// Sends `body` to `path` and awaits a reply, or times out.
    ///
    /// # Errors
    ///
    /// Returns whatever [`MessageFactory::create_with_options`] or
    /// [`RootRouter::route`] raise while constructing or routing the
    /// request, or [`RequestError::Timeout`] if no reply arrives within
    /// `opts.timeout`. A query path resolves immediately from `route`
    /// itself and never registers a waiter.
    pub async fn send(
        &self,
        path: impl Into<String>,
        body: Value,
        options: MessageOptions,
        opts: RequestOptions,
    ) -> Result<Value, CoordinatorError> {
        let msg = self.factory.create_with_options(path, body, options)?;
        self.send_message(msg, opts).await
    }

    /// As [`Self::send`], for a message already constructed (e.g. one leg
    /// of a transaction batch).
    ///
    /// # Errors
    ///
    /// See [`Self::send`].
    pub async fn send_message(&self, msg: Message, opts: RequestOptions) -> Result<Value, CoordinatorError> {
        let message_id = msg.id();

        let route_result = {
            // Lock registry before kernel, matching GlobalScheduler::tick's
            // acquisition order, so a concurrent tick never deadlocks
            // against a concurrent request.
            let mut registry = self.registry.lock().await;
            let mut kernel = self.kernel.lock().await;
            let rx = kernel.register_reply_waiter(message_id);
            match RootRouter::route(&mut registry, &mut kernel, msg, opts.accept) {
                Ok(RouteOutcome::Resolved(value)) => {
                    kernel.unregister_reply_waiter(&message_id);
                    return Ok(value);
                }
                Ok(RouteOutcome::Enqueued(_)) => Ok(rx),
                Err(err) => {
                    kernel.unregister_reply_waiter(&message_id);
                    Err(err)
                }
            }
        };
        let rx = route_result?;

        match timeout(opts.timeout.as_duration(), rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_recv_error)) => {
                self.kernel.lock().await.unregister_reply_waiter(&message_id);
                Err(CoordinatorError::Request(RequestError::NoWaiter { message_id }))
            }
            Err(_elapsed) => {
                self.kernel.lock().await.unregister_reply_waiter(&message_id);
                Err(CoordinatorError::Request(RequestError::Timeout { message_id }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{ErrorHistorySize, QueueCapacity};
    use crate::facet::{ContractRegistry, FacetManager, HookContext};
    use crate::queue::OverflowPolicy;
    use crate::subsystem::{Disposition, Subsystem};
    use serde_json::json;

    fn name(s: &str) -> crate::domain_types::SubsystemName {
        crate::domain_types::SubsystemName::try_new(s).unwrap()
    }

    fn kernel() -> Arc<Mutex<Kernel>> {
        Arc::new(Mutex::new(Kernel::bootstrap(ErrorHistorySize::try_new(100).unwrap(), 0)))
    }

    fn built_subsystem(n: &str, disposition: Disposition) -> Subsystem {
        let mut sub = Subsystem::new(
            name(n),
            disposition,
            QueueCapacity::try_new(10).unwrap(),
            OverflowPolicy::Error,
        );
        let facets = FacetManager::build(
            vec![],
            &HookContext {
                ms: 0,
                config: json!(null),
                debug: false,
            },
            sub.name(),
            &ContractRegistry::new(),
        )
        .unwrap();
        sub.attach_facets(facets).unwrap();
        sub
    }

    #[tokio::test]
    async fn query_route_resolves_without_registering_a_waiter() {
        let mut sub = built_subsystem("store", Disposition::Canonical);
        sub.router_mut()
            .register_route(
                "store://query/get",
                Arc::new(|_msg, _params| Ok(json!({"value": 42}))),
                std::collections::HashMap::new(),
                false,
            )
            .unwrap();
        let mut registry = Registry::new();
        registry.insert(sub);
        let registry = Arc::new(Mutex::new(registry));
        let kernel = kernel();

        let factory = MessageFactory::new();
        let requests = RequestBuilder::new(&factory, registry, kernel);
        let result = requests
            .send(
                "store://query/get",
                json!(null),
                MessageOptions::default(),
                RequestOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"value": 42}));
    }

    #[tokio::test]
    async fn enqueued_command_times_out_when_nothing_replies() {
        let mut registry = Registry::new();
        registry.insert(built_subsystem("store", Disposition::Canonical));
        let registry = Arc::new(Mutex::new(registry));
        let kernel = kernel();

        let factory = MessageFactory::new();
        let requests = RequestBuilder::new(&factory, registry, kernel);
        let result = requests
            .send(
                "store://command/set",
                json!({"k": "v"}),
                MessageOptions::default(),
                RequestOptions {
                    timeout: TimeoutMs::try_new(20).unwrap(),
                    accept: AcceptOptions::default(),
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(CoordinatorError::Request(RequestError::Timeout { .. }))
        ));
    }

    #[tokio::test]
    async fn unroutable_path_surfaces_its_error_and_drops_the_waiter() {
        let registry = Arc::new(Mutex::new(Registry::new()));
        let kernel = kernel();

        let factory = MessageFactory::new();
        let requests = RequestBuilder::new(&factory, registry, kernel);
        let result = requests
            .send(
                "ghost://op",
                json!(null),
                MessageOptions::default(),
                RequestOptions::default(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reply_arriving_through_send_protected_resolves_the_waiter() {
        let mut registry = Registry::new();
        registry.insert(built_subsystem("store", Disposition::Canonical));
        let registry = Arc::new(Mutex::new(registry));
        let kernel = kernel();
        let caller = kernel.lock().await.register_subsystem(0).pkr;

        let factory = MessageFactory::new();
        let requests = RequestBuilder::new(&factory, registry, kernel.clone());

        let command_msg = factory
            .create("store://command/set", json!({"k": "v"}))
            .unwrap();
        let message_id = command_msg.id();

        let pending = requests.send_message(
            command_msg,
            RequestOptions {
                timeout: TimeoutMs::try_new(5_000).unwrap(),
                accept: AcceptOptions::default(),
            },
        );
        tokio::pin!(pending);

        // Poll once so the request registers its waiter and enqueues before
        // the reply is sent, without yet driving it to completion.
        let not_ready = futures::poll!(&mut pending);
        assert!(matches!(not_ready, std::task::Poll::Pending));

        let reply_path = format!("store://reply/{message_id}");
        let reply_msg = factory.create(reply_path, json!({"done": true})).unwrap();
        let resolved = kernel
            .lock()
            .await
            .send_protected(caller, reply_msg, AcceptOptions::default(), 0, |msg, _opts, _kernel| {
                Ok(msg.body().clone())
            })
            .unwrap();
        assert_eq!(resolved, json!({"done": true}));

        let result = timeout(std::time::Duration::from_millis(50), pending)
            .await
            .expect("reply already resolved the waiter before this await completed")
            .unwrap();
        assert_eq!(result, json!({"done": true}));
    }
}
