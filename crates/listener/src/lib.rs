//! Polling event listeners
//!
//! A [`Listener`] calls a [`PollSource`] on a fixed interval and hands every
//! non-empty batch of events to each registered [`EventHandler`] in its own
//! task. The engine knows nothing about what is polled; it is generic over the
//! client passed to sources and handlers and over the event type.
//!
//! ```no_run
//! use std::sync::Arc;
//! use botsky_listener::{DispatchContext, Listener, PollContext, PollError};
//!
//! # async fn run() {
//! struct Api;
//!
//! let listener = Listener::new(
//!     "Counter",
//!     Arc::new(Api),
//!     |ctx: PollContext, _api: Arc<Api>| async move { Ok::<_, PollError>(vec![ctx.cycle]) },
//! );
//! listener
//!     .register_handler("print", |ctx: DispatchContext, _api: Arc<Api>, events: Arc<[u64]>| async move {
//!         println!("{} got {:?}", ctx.handler_id, events);
//!     })
//!     .unwrap();
//! listener.start();
//! # }
//! ```

mod error;
mod handler;
mod listener;

pub use error::{ListenerError, PollError};
pub use handler::{
    DispatchContext, EventHandler, HandlerRegistry, PollContext, PollSource, SharedHandler,
};
pub use listener::{Listener, DEFAULT_LISTENER_NAME, DEFAULT_POLLING_INTERVAL};
