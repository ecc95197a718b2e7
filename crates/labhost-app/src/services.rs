//! The service graph and its single-construction, single-disposal owner.

use std::sync::Arc;

use labhost_auth::{AccountLockoutTracker, AuthenticationGate, CredentialStore};
use labhost_core::{Clock, FailureCause, SecurityPolicy};
use labhost_funnel::ExceptionFunnel;
use labhost_logging::{AuditLog, ErrorReporter, FallbackNotifier, LogSink};

/// Release action for one constructed service.
pub type Disposer = Box<dyn FnOnce() -> Result<(), FailureCause> + Send + 'static>;

/// Externally supplied leaves of the service graph.
#[derive(Clone)]
pub struct HostParts {
    /// Structured log sink.
    pub sink: Arc<dyn LogSink>,
    /// User-facing error display.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Last-resort blocking notification.
    pub notifier: Arc<dyn FallbackNotifier>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Account persistence.
    pub store: Arc<dyn CredentialStore>,
}

struct ServiceSlot {
    name: &'static str,
    disposer: Disposer,
}

/// Owns the constructed services and releases them in reverse order.
pub struct ServiceHost {
    audit: AuditLog,
    tracker: Arc<AccountLockoutTracker>,
    gate: Arc<AuthenticationGate>,
    funnel: Arc<ExceptionFunnel>,
    slots: Vec<ServiceSlot>,
}

impl ServiceHost {
    /// Builds the graph leaves first: logging sink, error reporter, lockout
    /// tracker, authentication gate, exception funnel.
    pub fn build(parts: HostParts, policy: Arc<SecurityPolicy>) -> Self {
        let mut slots = Vec::new();

        let sink = Arc::clone(&parts.sink);
        slots.push(ServiceSlot {
            name: "logging sink",
            disposer: Box::new(move || sink.flush().map_err(|error| FailureCause::from_error(&error))),
        });
        let audit = AuditLog::new(Arc::clone(&parts.sink), Arc::clone(&parts.clock));

        slots.push(release("error reporter", Arc::clone(&parts.reporter)));

        let tracker = Arc::new(AccountLockoutTracker::new(&policy, Arc::clone(&parts.clock)));
        slots.push(release("account lockout tracker", Arc::clone(&tracker)));

        let gate = Arc::new(AuthenticationGate::new(
            Arc::clone(&parts.store),
            Arc::clone(&tracker),
            audit.clone(),
            policy,
        ));
        slots.push(release("authentication gate", Arc::clone(&gate)));

        let funnel = Arc::new(ExceptionFunnel::new(
            Arc::clone(&parts.sink),
            Arc::clone(&parts.reporter),
            Arc::clone(&parts.notifier),
            Arc::clone(&parts.clock),
        ));
        slots.push(release("exception funnel", Arc::clone(&funnel)));

        Self {
            audit,
            tracker,
            gate,
            funnel,
            slots,
        }
    }

    /// Adds a service constructed after the core graph. It is disposed
    /// before everything registered earlier.
    pub fn register(&mut self, name: &'static str, disposer: Disposer) {
        self.slots.push(ServiceSlot { name, disposer });
    }

    /// Service names in construction order.
    pub fn construction_order(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.name).collect()
    }

    /// Logging facade over the host sink.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Shared lockout tracker.
    pub fn tracker(&self) -> &Arc<AccountLockoutTracker> {
        &self.tracker
    }

    /// Shared authentication gate.
    pub fn gate(&self) -> &Arc<AuthenticationGate> {
        &self.gate
    }

    /// Shared exception funnel.
    pub fn funnel(&self) -> &Arc<ExceptionFunnel> {
        &self.funnel
    }

    /// Consumes the host, yielding disposers in reverse construction order.
    pub fn into_disposal_order(self) -> Vec<(&'static str, Disposer)> {
        self.slots
            .into_iter()
            .rev()
            .map(|slot| (slot.name, slot.disposer))
            .collect()
    }
}

fn release<T: ?Sized + Send + Sync + 'static>(name: &'static str, service: Arc<T>) -> ServiceSlot {
    ServiceSlot {
        name,
        disposer: Box::new(move || {
            drop(service);
            Ok(())
        }),
    }
}
