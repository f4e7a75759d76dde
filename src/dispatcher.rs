//! # Event Dispatcher
//!
//! The dispatcher is the central registry for raise/fail semantics. It
//! keeps an ordered callback list per execution context and, when a
//! [`HandlerResolver`] is configured, fans events out to globally
//! resolved handler objects as well.
//!
//! ## Dispatch Flow
//!
//! ```text
//! ┌────────┐  raise/fail_with   ┌─────────────────┐
//! │ Caller │ ──────────────────▶│ EventDispatcher │
//! └────────┘                    └───────┬─────────┘
//!                                       │
//!                      ┌────────────────┼────────────────┐
//!                      ▼                                 ▼
//!             ┌──────────────────┐            ┌───────────────────┐
//!             │ context callbacks│            │ resolved handlers │
//!             │ (registration    │            │ (resolver-returned│
//!             │  order)          │            │  order)           │
//!             └──────────────────┘            └───────────────────┘
//! ```
//!
//! Every invocation is isolated: a handler error is reported to the
//! diagnostic sink and never aborts dispatch or reaches the caller. The
//! single caller-visible error is `fail_with` finding no handler at all.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::context::ContextId;
use crate::error::{DispatchError, DispatchResult, HandlerError, HandlerResult};
use crate::event::{Event, FailureEvent};
use crate::resolver::HandlerResolver;
use crate::sink::{DiagnosticSink, TracingSink};

type ErasedCallback = Arc<dyn Fn(&dyn Any) -> HandlerResult + Send + Sync>;

struct CallbackEntry {
    token: u64,
    type_id: TypeId,
    callback: ErasedCallback,
}

/// Synchronous, context-scoped event dispatcher.
///
/// Construct with [`EventDispatcher::new`] or, to inject a resolver or a
/// different diagnostic sink, through [`EventDispatcher::builder`].
///
/// ```rust
/// use hansho::{Event, EventDispatcher};
///
/// #[derive(Debug)]
/// struct AllTestsPassed;
/// impl Event for AllTestsPassed {}
///
/// let dispatcher = EventDispatcher::new();
/// let registration = dispatcher.register(|_: &AllTestsPassed| {
///     println!("all tests passed!");
///     Ok(())
/// });
///
/// assert_eq!(dispatcher.raise(&AllTestsPassed), 1);
/// registration.release();
/// assert_eq!(dispatcher.raise(&AllTestsPassed), 0);
/// ```
pub struct EventDispatcher {
    /// Ordered callback lists keyed by owning execution context. An entry
    /// exists only while its context has at least one live registration.
    contexts: DashMap<ContextId, Vec<CallbackEntry>>,
    resolver: Option<Arc<dyn HandlerResolver>>,
    sink: Arc<dyn DiagnosticSink>,
    next_token: AtomicU64,
}

impl EventDispatcher {
    /// Dispatcher with no resolver and the default [`TracingSink`].
    pub fn new() -> Arc<Self> {
        Self::builder().build()
    }

    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Registers `callback` for events of type `T` raised from the
    /// calling thread's context.
    ///
    /// The callback list is created on first registration and preserves
    /// insertion order, which is the invocation order. Never fails.
    ///
    /// The returned [`Registration`] owns the registration: releasing it
    /// (or dropping it) unregisters the callback.
    pub fn register<T, F>(self: &Arc<Self>, callback: F) -> Registration
    where
        T: Event,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_in(ContextId::current(), callback)
    }

    /// Registers `callback` under an explicit execution context.
    pub fn register_in<T, F>(self: &Arc<Self>, context: ContextId, callback: F) -> Registration
    where
        T: Event,
        F: Fn(&T) -> HandlerResult + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let callback: ErasedCallback = Arc::new(move |event: &dyn Any| {
            match event.downcast_ref::<T>() {
                Some(event) => callback(event),
                None => Err(HandlerError::new(format!(
                    "callback for {} received a different event type",
                    std::any::type_name::<T>()
                ))),
            }
        });
        self.contexts.entry(context).or_default().push(CallbackEntry {
            token,
            type_id: TypeId::of::<T>(),
            callback,
        });
        trace!(
            "registered callback {} for {} on {}",
            token,
            std::any::type_name::<T>(),
            context
        );
        Registration {
            dispatcher: Arc::downgrade(self),
            context,
            token,
            active: true,
        }
    }

    /// Raises `event` on the calling thread's context.
    ///
    /// Invokes, in registration order, every callback of the context
    /// registered for exactly `T`, then every handler object the
    /// resolver returns for `T`, in the resolver's order. Returns the
    /// number of handlers that processed the event. Handler errors are
    /// reported to the diagnostic sink and do not stop dispatch.
    pub fn raise<T: Event>(&self, event: &T) -> usize {
        self.raise_in(ContextId::current(), event)
    }

    /// Raises `event` on an explicit execution context.
    pub fn raise_in<T: Event>(&self, context: ContextId, event: &T) -> usize {
        self.dispatch(context, event)
    }

    /// Raises a failure event on the calling thread's context.
    ///
    /// Dispatch semantics match [`EventDispatcher::raise`]; additionally,
    /// if zero handlers processed the event, the call fails with
    /// [`DispatchError::UnhandledFailure`] naming the event type.
    pub fn fail_with<T: FailureEvent>(&self, event: &T) -> DispatchResult<usize> {
        self.fail_with_in(ContextId::current(), event)
    }

    /// Raises a failure event on an explicit execution context.
    pub fn fail_with_in<T: FailureEvent>(
        &self,
        context: ContextId,
        event: &T,
    ) -> DispatchResult<usize> {
        let handled = self.dispatch(context, event);
        if handled == 0 {
            return Err(DispatchError::UnhandledFailure {
                event_type: event.event_name().to_string(),
            });
        }
        Ok(handled)
    }

    /// Discards all callback registrations of the calling thread's
    /// context. Other contexts and the resolver are unaffected.
    pub fn clear_callbacks(&self) {
        self.clear_callbacks_in(ContextId::current());
    }

    /// Discards all callback registrations of an explicit context.
    pub fn clear_callbacks_in(&self, context: ContextId) {
        self.contexts.remove(&context);
        debug!("cleared callbacks on {}", context);
    }

    /// Number of callbacks registered for the calling thread's context.
    pub fn callback_count(&self) -> usize {
        self.callback_count_in(ContextId::current())
    }

    /// Number of callbacks registered for an explicit context.
    pub fn callback_count_in(&self, context: ContextId) -> usize {
        self.contexts
            .get(&context)
            .map(|callbacks| callbacks.len())
            .unwrap_or(0)
    }

    /// Number of contexts with at least one live registration.
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    fn dispatch<T: Event>(&self, context: ContextId, event: &T) -> usize {
        let type_id = TypeId::of::<T>();
        trace!("dispatching {:?} on {}", event, context);

        // Snapshot the matching callbacks so handler code never runs
        // under a map shard lock and may itself register or release.
        // Callbacks registered during this dispatch are not invoked by it.
        let callbacks: Vec<ErasedCallback> = match self.contexts.get(&context) {
            Some(entries) => entries
                .iter()
                .filter(|entry| entry.type_id == type_id)
                .map(|entry| entry.callback.clone())
                .collect(),
            None => Vec::new(),
        };

        let mut handled = 0;
        for callback in callbacks {
            handled += 1;
            if let Err(err) = callback(event) {
                self.report_failure(event.event_name(), &err);
            }
        }

        if let Some(resolver) = &self.resolver {
            for handler in resolver.resolve(type_id) {
                handled += 1;
                if let Err(err) = handler.handle_erased(event) {
                    self.report_failure(event.event_name(), &err);
                }
            }
        }

        debug!(
            "dispatched {} to {} handler(s) on {}",
            event.event_name(),
            handled,
            context
        );
        handled
    }

    fn report_failure(&self, event_name: &str, err: &HandlerError) {
        self.sink
            .report(&format!("handler for {} failed: {}", event_name, err));
    }

    fn unregister(&self, context: ContextId, token: u64) {
        let emptied = match self.contexts.get_mut(&context) {
            Some(mut entries) => {
                entries.retain(|entry| entry.token != token);
                entries.is_empty()
            }
            None => false,
        };
        // The guard above is released before touching the map again.
        if emptied {
            self.contexts.remove_if(&context, |_, entries| entries.is_empty());
        }
    }
}

/// Builds an [`EventDispatcher`] with an optional resolver and sink.
#[derive(Default)]
pub struct DispatcherBuilder {
    resolver: Option<Arc<dyn HandlerResolver>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Collaborator queried for globally registered handler objects.
    pub fn resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Destination for handler-failure reports. Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Arc<EventDispatcher> {
        Arc::new(EventDispatcher {
            contexts: DashMap::new(),
            resolver: self.resolver,
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            next_token: AtomicU64::new(1),
        })
    }
}

/// Scoped handle for a registered callback.
///
/// Releasing the handle, explicitly through [`Registration::release`] or
/// by dropping it, unregisters the callback. Release is idempotent:
/// releasing after `clear_callbacks`, or dropping after an explicit
/// release, is a silent no-op.
#[must_use = "dropping the handle unregisters the callback"]
pub struct Registration {
    dispatcher: Weak<EventDispatcher>,
    context: ContextId,
    token: u64,
    active: bool,
}

impl Registration {
    /// The context the callback was registered under.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Unregisters the callback now.
    pub fn release(mut self) {
        self.deactivate();
    }

    fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(dispatcher) = self.dispatcher.upgrade() {
            dispatcher.unregister(self.context, self.token);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::resolver::MockHandlerResolver;
    use crate::sink::MemorySink;

    #[derive(Debug)]
    struct Ping;
    impl Event for Ping {}

    #[derive(Debug)]
    struct Broke;
    impl Event for Broke {}
    impl FailureEvent for Broke {}

    #[test]
    fn raise_without_registrations_reaches_nobody() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.raise(&Ping), 0);
    }

    #[test]
    fn resolver_is_queried_with_the_event_type() {
        let mut resolver = MockHandlerResolver::new();
        resolver
            .expect_resolve()
            .withf(|type_id| *type_id == TypeId::of::<Ping>())
            .returning(|_| Vec::new());

        let dispatcher = EventDispatcher::builder()
            .resolver(Arc::new(resolver))
            .build();
        assert_eq!(dispatcher.raise(&Ping), 0);
    }

    #[test]
    fn callback_errors_reach_the_sink_but_not_the_caller() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = EventDispatcher::builder().sink(sink.clone()).build();

        let _registration = dispatcher.register(|_: &Ping| Err("boom".into()));
        assert_eq!(dispatcher.raise(&Ping), 1);

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Ping"));
        assert!(messages[0].contains("boom"));
    }

    #[test]
    fn erroring_callback_still_counts_for_fail_with() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = EventDispatcher::builder().sink(sink.clone()).build();

        let _registration = dispatcher.register(|_: &Broke| Err("broken handler".into()));
        assert_eq!(dispatcher.fail_with(&Broke).unwrap(), 1);
        assert_eq!(sink.messages().len(), 1);
    }

    #[test]
    fn registry_entry_is_pruned_with_the_last_callback() {
        let dispatcher = EventDispatcher::new();
        assert_eq!(dispatcher.context_count(), 0);

        let first = dispatcher.register(|_: &Ping| Ok(()));
        let second = dispatcher.register(|_: &Ping| Ok(()));
        assert_eq!(dispatcher.context_count(), 1);
        assert_eq!(dispatcher.callback_count(), 2);

        first.release();
        assert_eq!(dispatcher.callback_count(), 1);
        assert_eq!(dispatcher.context_count(), 1);

        second.release();
        assert_eq!(dispatcher.callback_count(), 0);
        assert_eq!(dispatcher.context_count(), 0);
    }

    #[test]
    fn release_after_clear_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        let registration = dispatcher.register(|_: &Ping| Ok(()));
        dispatcher.clear_callbacks();
        registration.release();
        assert_eq!(dispatcher.raise(&Ping), 0);
    }

    #[test]
    fn handle_outliving_the_dispatcher_is_a_no_op() {
        let dispatcher = EventDispatcher::new();
        let registration = dispatcher.register(|_: &Ping| Ok(()));
        drop(dispatcher);
        registration.release();
    }

    #[test]
    fn a_callback_may_register_another_during_dispatch() {
        let dispatcher = EventDispatcher::new();
        let late_invocations = Arc::new(AtomicUsize::new(0));

        let inner_dispatcher = dispatcher.clone();
        let late = late_invocations.clone();
        let _outer = dispatcher.register(move |_: &Ping| {
            let late = late.clone();
            // Keep the nested registration alive past this dispatch.
            std::mem::forget(inner_dispatcher.register(move |_: &Ping| {
                late.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
            Ok(())
        });

        // The nested callback is not seen by the dispatch that created it.
        assert_eq!(dispatcher.raise(&Ping), 1);
        assert_eq!(late_invocations.load(Ordering::SeqCst), 0);

        // It is live for the next raise: outer + one nested callback, and
        // the outer run registers another.
        assert_eq!(dispatcher.raise(&Ping), 2);
        assert_eq!(late_invocations.load(Ordering::SeqCst), 1);
    }
}
