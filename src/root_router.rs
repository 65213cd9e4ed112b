//! The root router: subsystem-name extraction, kernel special-casing,
//! registry lookup, and delegation to `subsystem.accept` (spec.md §4.7,
//! component L10).

use serde_json::Value;

use crate::domain_types::SubsystemName;
use crate::error::{CoordinatorError, KernelError};
use crate::error_manager::ErrorInput;
use crate::kernel::Kernel;
use crate::message::Message;
use crate::registry::Registry;
use crate::subsystem::{AcceptOptions, AcceptOutcome};

/// The result of routing one message through [`RootRouter::route`]: either
/// a query's synchronous result, or an acknowledgement that the message
/// was accepted/enqueued.
#[derive(Debug, Clone)]
pub enum RouteOutcome {
    /// The call resolved synchronously (a query, or a kernel call) and
    /// carries the handler's result.
    Resolved(Value),
    /// The call was enqueued for later processing by the scheduler.
    Enqueued(bool),
}

/// Dispatches by subsystem name, per spec.md §4.7's four-step algorithm.
pub struct RootRouter;

impl RootRouter {
    /// Routes `msg` (spec.md §4.7):
    ///
    /// 1. Extract the subsystem name from the path prefix.
    /// 2. If it is `kernel`, forward to kernel processing (synchronous,
    ///    no ACL — direct kernel calls bypass `sendProtected`, which is
    ///    itself reached by routing a message at `kernel://send-protected`
    ///    or, more commonly, by the coordinator calling
    ///    [`crate::kernel::Kernel::send_protected`] directly).
    /// 3. Else look up the name in the registry; if absent, record an
    ///    `unroutable` error and return a structured failure.
    /// 4. Else delegate to `subsystem.accept`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Kernel`] with
    /// [`KernelError::UnknownSubsystem`] if no subsystem (and no kernel
    /// special-case) matches, or whatever `accept` itself raises.
    pub fn route(
        registry: &mut Registry,
        kernel: &mut Kernel,
        msg: Message,
        opts: AcceptOptions,
    ) -> Result<RouteOutcome, CoordinatorError> {
        let name = msg.path().subsystem();

        if Kernel::is_kernel_route(name) {
            // The kernel itself exposes no user-defined routes in this
            // design; `kernel://*` calls are serviced by the coordinator's
            // direct kernel surface (createResource, createChannel, ...),
            // not by routing a Message through a kernel Subsystem. Callers
            // that reach here with a `kernel://` path get a structured
            // "no route" result rather than a panic.
            let err = ErrorInput::Raw {
                subsystem: crate::kernel::reserved_name(),
                error_type: Some(crate::error_manager::ErrorType::Unroutable),
                timestamp: crate::message::current_timestamp_millis(),
                message: "kernel subsystem exposes no message routes".to_string(),
                code: None,
                path: Some(msg.path().as_str().to_string()),
                cause: None,
                data: None,
            };
            kernel.error_manager_mut().record(err);
            return Err(CoordinatorError::Kernel(KernelError::UnknownSubsystem {
                name: crate::kernel::reserved_name(),
            }));
        }

        let subsystem_name = SubsystemName::try_new(name)
            .expect("MessagePath already validated this prefix against the same grammar");

        let Some(subsystem) = registry.get_mut(&subsystem_name) else {
            let err = ErrorInput::Raw {
                subsystem: subsystem_name.clone(),
                error_type: Some(crate::error_manager::ErrorType::Unroutable),
                timestamp: crate::message::current_timestamp_millis(),
                message: format!("no subsystem registered for {subsystem_name}"),
                code: None,
                path: Some(msg.path().as_str().to_string()),
                cause: None,
                data: None,
            };
            kernel.error_manager_mut().record(err);
            return Err(CoordinatorError::Kernel(KernelError::UnknownSubsystem {
                name: subsystem_name,
            }));
        };

        match subsystem.accept(msg, opts) {
            Ok(AcceptOutcome::Processed(value)) => Ok(RouteOutcome::Resolved(value)),
            Ok(AcceptOutcome::Enqueued(accepted)) => Ok(RouteOutcome::Enqueued(accepted)),
            Err(err) => Err(CoordinatorError::Subsystem(err)),
        }
    }
}
