//! The polling loop.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ListenerError;
use crate::handler::{
    DispatchContext, EventHandler, HandlerRegistry, PollContext, PollSource, SharedHandler,
};

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LISTENER_NAME: &str = "Listener";

struct RunState {
    active: bool,
    polling_interval: Duration,
    stop: Option<CancellationToken>,
}

/// Polls a source at a fixed interval and fans every non-empty batch out to
/// the registered handlers.
///
/// The listener is idle until [`Listener::start`]. Each handler runs in its
/// own task, so a slow handler never delays the next poll. Dropping the
/// listener stops its loop.
pub struct Listener<C, E> {
    name: Arc<str>,
    client: Arc<C>,
    source: Arc<dyn PollSource<C, E>>,
    handlers: Arc<HandlerRegistry<C, E>>,
    run: Mutex<RunState>,
}

impl<C, E> Listener<C, E>
where
    C: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// An empty `name` falls back to [`DEFAULT_LISTENER_NAME`].
    pub fn new<S>(name: &str, client: Arc<C>, source: S) -> Self
    where
        S: PollSource<C, E> + 'static,
    {
        let name = if name.is_empty() {
            DEFAULT_LISTENER_NAME
        } else {
            name
        };
        Self {
            name: Arc::from(name),
            client,
            source: Arc::new(source),
            handlers: Arc::new(HandlerRegistry::new()),
            run: Mutex::new(RunState {
                active: false,
                polling_interval: DEFAULT_POLLING_INTERVAL,
                stop: None,
            }),
        }
    }

    pub fn with_polling_interval(self, interval: Duration) -> Self {
        self.set_polling_interval(interval);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn is_active(&self) -> bool {
        self.lock_run().active
    }

    pub fn polling_interval(&self) -> Duration {
        self.lock_run().polling_interval
    }

    pub fn handler_ids(&self) -> Vec<String> {
        self.handlers.ids()
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler under `id`. Ids are unique per listener; a duplicate
    /// is rejected and the existing handler stays in place.
    pub fn register_handler<H>(&self, id: impl Into<String>, handler: H) -> Result<(), ListenerError>
    where
        H: EventHandler<C, E> + 'static,
    {
        let id = id.into();
        let handler: SharedHandler<C, E> = Arc::new(handler);
        self.handlers.register(id.clone(), handler).map_err(|e| {
            warn!("{}: {}", self.name, e);
            e
        })?;
        debug!("{}: registered handler {}", self.name, id);
        Ok(())
    }

    /// Remove a handler. Dispatches already running are not interrupted.
    pub fn deregister_handler(&self, id: &str) -> Result<(), ListenerError> {
        self.handlers.deregister(id).map_err(|e| {
            warn!("{}: {}", self.name, e);
            e
        })?;
        debug!("{}: deregistered handler {}", self.name, id);
        Ok(())
    }

    /// Begin polling. The first poll happens one interval from now. Starting
    /// an active listener only logs a warning.
    pub fn start(&self) {
        let mut run = self.lock_run();
        self.start_locked(&mut run);
    }

    /// Stop polling. No poll begins after this returns. A poll already in
    /// progress finishes and its batch is still dispatched; handler tasks
    /// that are already running finish on their own.
    pub fn stop(&self) {
        let mut run = self.lock_run();
        if !run.active {
            warn!("{} is not active", self.name);
            return;
        }
        self.stop_locked(&mut run);
    }

    /// Change the polling interval. Zero selects [`DEFAULT_POLLING_INTERVAL`].
    /// An active listener is restarted so the next poll is one new interval
    /// from now.
    pub fn set_polling_interval(&self, interval: Duration) {
        let interval = if interval.is_zero() {
            DEFAULT_POLLING_INTERVAL
        } else {
            interval
        };

        let mut run = self.lock_run();
        run.polling_interval = interval;
        if run.active {
            debug!("{}: restarting with polling interval {:?}", self.name, interval);
            self.stop_locked(&mut run);
            self.start_locked(&mut run);
        }
    }

    fn start_locked(&self, run: &mut RunState) {
        if run.active {
            warn!("{} is already active", self.name);
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!("{} cannot start outside of a tokio runtime", self.name);
                return;
            }
        };

        let stop = CancellationToken::new();
        run.active = true;
        run.stop = Some(stop.clone());

        info!("{} started, polling every {:?}", self.name, run.polling_interval);
        runtime.spawn(poll_loop(
            self.name.clone(),
            self.client.clone(),
            self.source.clone(),
            self.handlers.clone(),
            run.polling_interval,
            stop,
        ));
    }

    fn stop_locked(&self, run: &mut RunState) {
        run.active = false;
        if let Some(stop) = run.stop.take() {
            stop.cancel();
        }
        info!("{} stopped", self.name);
    }
}

impl<C, E> Drop for Listener<C, E> {
    fn drop(&mut self) {
        let run = self.run.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(stop) = run.stop.take() {
            stop.cancel();
        }
    }
}

impl<C, E> fmt::Debug for Listener<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("active", &run.active)
            .field("polling_interval", &run.polling_interval)
            .field("handlers", &self.handlers.ids())
            .finish()
    }
}

async fn poll_loop<C, E>(
    name: Arc<str>,
    client: Arc<C>,
    source: Arc<dyn PollSource<C, E>>,
    handlers: Arc<HandlerRegistry<C, E>>,
    period: Duration,
    stop: CancellationToken,
) where
    C: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycle: u64 = 0;

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        cycle += 1;
        let ctx = PollContext {
            listener: name.clone(),
            cycle,
        };

        // A started poll runs to completion and its batch is dispatched even
        // if a stop arrives meanwhile; the loop exits at the next tick.
        let events = match source.poll(ctx, client.clone()).await {
            Ok(events) => events,
            Err(e) => {
                warn!("{}: poll failed: {:#}", name, e);
                continue;
            }
        };
        if events.is_empty() {
            continue;
        }

        let events: Arc<[E]> = events.into();
        let snapshot = handlers.snapshot();
        debug!(
            "{}: dispatching {} event(s) to {} handler(s)",
            name,
            events.len(),
            snapshot.len()
        );

        for (handler_id, handler) in snapshot {
            let ctx = DispatchContext {
                listener: name.clone(),
                handler_id,
                dispatch_id: Uuid::new_v4(),
                cycle,
            };
            let client = client.clone();
            let events = events.clone();
            tokio::spawn(async move {
                debug!(
                    "{}: handler {} dispatch {} started",
                    ctx.listener, ctx.handler_id, ctx.dispatch_id
                );
                handler.handle(ctx, client, events).await;
            });
        }
    }

    debug!("{}: poll loop exited", name);
}
