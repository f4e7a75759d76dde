//! # Hansho: Typed In-Process Event Dispatch
//!
//! Hansho (半鐘, the fire-watchtower bell) is a small synchronous event
//! dispatch utility: callers raise typed event values, and previously
//! registered handlers are invoked before the call returns.
//!
//! ## Architecture Overview
//!
//! Two handler populations exist side by side:
//!
//! - **Context callbacks**: ad-hoc closures registered per execution
//!   context ([`context::ContextId`], a thread or logical task). Each
//!   context owns an isolated, ordered callback list; a raise only sees
//!   the callbacks of the context it runs in.
//! - **Resolved handler objects**: types implementing
//!   [`resolver::Handles`] for an event type, looked up through an
//!   injected [`resolver::HandlerResolver`] collaborator shared by all
//!   contexts.
//!
//! ```text
//! ┌────────┐   raise(event)   ┌─────────────────┐   resolve(T)   ┌──────────┐
//! │ Caller │ ────────────────▶│ EventDispatcher │ ──────────────▶│ Resolver │
//! └────────┘                  └───────┬─────────┘                └──────────┘
//!                                     │
//!                          context callbacks, in
//!                          registration order
//! ```
//!
//! Handler failures are isolated: an error inside one handler is sent to
//! the [`sink::DiagnosticSink`] and the remaining handlers still run.
//! The one caller-visible error is raising a [`event::FailureEvent`]
//! that nobody handles.
//!
//! ## Usage
//!
//! ```rust
//! use hansho::{Event, EventDispatcher, FailureEvent};
//!
//! #[derive(Debug)]
//! struct AllTestsPassed;
//! impl Event for AllTestsPassed {}
//!
//! #[derive(Debug)]
//! struct PreconditionFailed;
//! impl Event for PreconditionFailed {}
//! impl FailureEvent for PreconditionFailed {}
//!
//! let dispatcher = EventDispatcher::new();
//!
//! let registration = dispatcher.register(|_: &AllTestsPassed| {
//!     println!("all tests passed!");
//!     Ok(())
//! });
//!
//! assert_eq!(dispatcher.raise(&AllTestsPassed), 1);
//!
//! // Nobody handles the failure event, so the raise itself errors.
//! assert!(dispatcher.fail_with(&PreconditionFailed).is_err());
//!
//! registration.release();
//! ```

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod resolver;
pub mod sink;

// Re-exports
pub use context::*;
pub use dispatcher::*;
pub use error::*;
pub use event::*;
pub use resolver::*;
pub use sink::*;

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
