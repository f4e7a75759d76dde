//! Handler-object resolution.
//!
//! Local callbacks cover the registering context only. Handler objects
//! are the global path: types implementing [`Handles`] for an event
//! type, resolved through a [`HandlerResolver`] collaborator injected
//! into the dispatcher. The dispatcher invokes whatever the resolver
//! returns, in the order it returns it; the matching policy on this path
//! belongs entirely to the resolver.

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{HandlerError, HandlerResult};
use crate::event::Event;

/// A handler for events of type `T`.
pub trait Handles<T: Event>: Send + Sync {
    fn handle(&self, event: &T) -> HandlerResult;
}

/// Object-safe, type-erased form of [`Handles`].
///
/// The event arrives as `&dyn Any`; adapters downcast to their concrete
/// event type.
pub trait ErasedHandler: Send + Sync {
    fn handle_erased(&self, event: &dyn Any) -> HandlerResult;
}

/// Carries a `Handles<T>` implementation through the erased interface.
struct TypedHandler<T, H> {
    inner: Arc<H>,
    _event: PhantomData<fn(&T)>,
}

impl<T, H> ErasedHandler for TypedHandler<T, H>
where
    T: Event,
    H: Handles<T>,
{
    fn handle_erased(&self, event: &dyn Any) -> HandlerResult {
        match event.downcast_ref::<T>() {
            Some(event) => self.inner.handle(event),
            None => Err(HandlerError::new(format!(
                "handler resolved for {} received a different event type",
                std::any::type_name::<T>()
            ))),
        }
    }
}

/// Resolves globally registered handler objects for an event type.
///
/// Injected into the dispatcher as a replaceable dependency; when absent,
/// only local callbacks apply. A resolver shared between dispatchers is
/// queried concurrently from multiple contexts.
#[cfg_attr(test, mockall::automock)]
pub trait HandlerResolver: Send + Sync {
    /// All handler objects for events of `type_id`, in invocation order.
    fn resolve(&self, type_id: TypeId) -> Vec<Arc<dyn ErasedHandler>>;
}

/// Registration-order handler registry, the default resolver.
///
/// ```rust
/// use std::sync::Arc;
/// use hansho::{Event, HandlerRegistry, HandlerResult, Handles};
///
/// #[derive(Debug)]
/// struct DeployFinished;
/// impl Event for DeployFinished {}
///
/// #[derive(Debug)]
/// struct Notifier;
/// impl Handles<DeployFinished> for Notifier {
///     fn handle(&self, _event: &DeployFinished) -> HandlerResult {
///         Ok(())
///     }
/// }
///
/// let registry = HandlerRegistry::new();
/// registry.register::<DeployFinished, _>(Arc::new(Notifier));
/// assert_eq!(registry.handler_count::<DeployFinished>(), 1);
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<TypeId, Vec<Arc<dyn ErasedHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler object for events of type `T`.
    ///
    /// Handlers for the same event type are invoked in registration order.
    pub fn register<T, H>(&self, handler: Arc<H>)
    where
        T: Event,
        H: Handles<T> + 'static,
    {
        let erased: Arc<dyn ErasedHandler> = Arc::new(TypedHandler {
            inner: handler,
            _event: PhantomData,
        });
        self.handlers
            .entry(TypeId::of::<T>())
            .or_default()
            .push(erased);
    }

    /// Number of handler objects registered for `T`.
    pub fn handler_count<T: Event>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<T>())
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, type_id: TypeId) -> Vec<Arc<dyn ErasedHandler>> {
        self.handlers
            .get(&type_id)
            .map(|handlers| handlers.clone())
            .unwrap_or_default()
    }
}
