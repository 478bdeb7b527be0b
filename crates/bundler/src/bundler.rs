//! The bundling engine.
//!
//! # Concurrency model
//!
//! ```text
//!  add() ──┐                         ┌──────────────┐   permit   ┌──────────────┐
//!  add() ──┼─ Mutex<State> ─ mpsc ──▶│  dispatcher  │──────────▶ │ handler task │
//!  add() ──┘   (open bundle,         │ (timer, join)│  JoinSet   │ handler task │
//!               backlog)             └──────────────┘            └──────────────┘
//! ```
//!
//! Callers of [`Bundler::add`] only ever take the state mutex: every limit
//! check and the append happen in one critical section, and a closed bundle
//! is pushed onto an unbounded channel before the lock is released, so the
//! dispatcher sees bundles in the order they were closed. The channel needs
//! no bound of its own: everything on it is counted in the backlog, which
//! `buffered_byte_limit` caps.
//!
//! The dispatcher is the single long-lived task. It owns the delay timer of
//! the open bundle and starts one handler task per closed bundle, at most
//! `handler_limit` at a time. Closed bundles wait in a FIFO queue inside the
//! dispatcher until a permit frees up, so the timer keeps firing while every
//! handler is busy. A slow handler therefore never blocks `add`; it only
//! holds backlog, which eventually turns into `Overflow` errors.

use crate::bundle::Bundle;
use crate::config::BundlerConfig;
use crate::error::BundlerError;
use crate::handler::{BundleHandler, BundleHandlerBoxed};
#[cfg(debug_assertions)]
use crate::invariants::{
    debug_assert_backlog_bounded, debug_assert_below_thresholds, debug_assert_bundle_bounded,
    debug_assert_release_accounted,
};
use crate::metrics::{BundlerMetrics, FlushTrigger};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedSemaphorePermit;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{sleep_until, Instant};

/// Messages from `add`/`flush` to the dispatcher.
enum Command<T> {
    /// A new bundle was opened and must be flushed by `deadline`.
    Arm { generation: u64, deadline: Instant },
    /// A closed bundle ready for the handler.
    Flush(Bundle<T>),
    /// Stop once every started handler has returned.
    Shutdown,
}

struct State<T> {
    open: Bundle<T>,
    buffered: usize,
    next_generation: u64,
    closed: bool,
}

impl<T> State<T> {
    /// Swaps in a fresh bundle and returns the one that was open.
    fn take_open(&mut self) -> Bundle<T> {
        let generation = self.next_generation;
        self.next_generation += 1;
        std::mem::replace(&mut self.open, Bundle::new(generation))
    }
}

struct Shared<T> {
    config: BundlerConfig,
    state: Mutex<State<T>>,
    metrics: BundlerMetrics,
    drained: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Nothing runs user code under this lock, so a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a handled bundle's size to the backlog budget.
    fn release(&self, size: usize) {
        let drained = {
            let mut state = self.lock();
            #[cfg(debug_assertions)]
            debug_assert_release_accounted!(size, state.buffered);
            state.buffered = state.buffered.saturating_sub(size);
            state.buffered == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
    }

    async fn wait_drained(&self) {
        loop {
            // Registered before the check so a release in between is not missed.
            let notified = self.drained.notified();
            let buffered = self.lock().buffered;
            if buffered == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases a bundle's backlog share when it is dropped, including after a
/// handler panic or from the dispatcher queue.
struct ReleaseOnDrop<T> {
    shared: Arc<Shared<T>>,
    size: usize,
    started: bool,
}

impl<T> ReleaseOnDrop<T> {
    fn new(shared: &Arc<Shared<T>>, size: usize) -> Self {
        Self {
            shared: Arc::clone(shared),
            size,
            started: false,
        }
    }

    /// Counts the bundle as in flight. Called once its permit is held.
    fn start(&mut self) {
        self.shared.metrics.handler_started();
        self.started = true;
    }
}

impl<T> Drop for ReleaseOnDrop<T> {
    fn drop(&mut self) {
        if self.started {
            self.shared.metrics.handler_finished();
        }
        self.shared.release(self.size);
    }
}

/// A closed bundle waiting in the dispatcher for a handler permit.
struct Queued<T> {
    bundle: Bundle<T>,
    release: ReleaseOnDrop<T>,
}

impl<T> Queued<T> {
    fn new(shared: &Arc<Shared<T>>, bundle: Bundle<T>) -> Self {
        let release = ReleaseOnDrop::new(shared, bundle.size());
        Self { bundle, release }
    }
}

/// Accumulates items into bundles bounded by count, size and age, and hands
/// each closed bundle to a [`BundleHandler`].
///
/// # Example
///
/// ```ignore
/// let bundler = Bundler::new(BundlerConfig::default(), MyHandler::new())?;
///
/// match bundler.add(item, 2) {
///     Ok(()) => {}
///     Err(e) if e.is_overflow() => send_directly(item_copy).await,
///     Err(e) => tracing::warn!(error = %e, "item dropped"),
/// }
///
/// bundler.shutdown().await;
/// ```
pub struct Bundler<T> {
    shared: Arc<Shared<T>>,
    commands: mpsc::UnboundedSender<Command<T>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Bundler<T> {
    /// Creates a bundler and spawns its dispatcher on the current tokio runtime.
    pub fn new<H>(config: BundlerConfig, handler: H) -> Result<Self, BundlerError>
    where
        H: BundleHandler<T> + 'static,
    {
        Self::with_boxed_handler(config, Arc::new(handler))
    }

    /// Creates a bundler around an already type-erased handler.
    pub fn with_boxed_handler(
        config: BundlerConfig,
        handler: Arc<dyn BundleHandlerBoxed<T>>,
    ) -> Result<Self, BundlerError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| BundlerError::NoRuntime)?;

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(State {
                open: Bundle::new(0),
                buffered: 0,
                next_generation: 1,
                closed: false,
            }),
            metrics: BundlerMetrics::default(),
            drained: Notify::new(),
        });

        let (commands, receiver) = mpsc::unbounded_channel();
        let dispatcher = runtime.spawn(dispatch(Arc::clone(&shared), handler, receiver));

        Ok(Self {
            shared,
            commands,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Appends `item`, accounted at `size` units, to the open bundle.
    ///
    /// Sizes below one unit are counted as one. Never blocks on the handler:
    /// the only wait is for the internal state lock.
    ///
    /// # Errors
    ///
    /// - [`BundlerError::Closed`] after [`shutdown`](Self::shutdown).
    /// - [`BundlerError::OversizedItem`] if `size` alone exceeds
    ///   `bundle_byte_limit`, whatever the backlog.
    /// - [`BundlerError::Overflow`] if the backlog would exceed
    ///   `buffered_byte_limit`.
    ///
    /// Nothing is modified when an error is returned.
    pub fn add(&self, item: T, size: usize) -> Result<(), BundlerError> {
        let size = size.max(1);
        let config = &self.shared.config;
        let metrics = &self.shared.metrics;
        let mut state = self.shared.lock();

        if state.closed {
            return Err(BundlerError::Closed);
        }
        if size > config.bundle_byte_limit {
            metrics.record_oversized();
            return Err(BundlerError::OversizedItem {
                size,
                limit: config.bundle_byte_limit,
            });
        }
        if state.buffered.saturating_add(size) > config.buffered_byte_limit {
            metrics.record_overflow();
            tracing::debug!(
                size,
                buffered = state.buffered,
                limit = config.buffered_byte_limit,
                "bundler backlog full, rejecting item"
            );
            return Err(BundlerError::Overflow {
                size,
                buffered: state.buffered,
                limit: config.buffered_byte_limit,
            });
        }

        if !state.open.is_empty() && state.open.size() + size > config.bundle_byte_limit {
            self.close_open(&mut state, FlushTrigger::Limit);
        }

        let opening = state.open.is_empty();
        state.open.push(item, size);
        state.buffered += size;
        metrics.record_added();

        #[cfg(debug_assertions)]
        debug_assert_bundle_bounded!(state.open, config);
        #[cfg(debug_assertions)]
        debug_assert_backlog_bounded!(state.buffered, config.buffered_byte_limit);

        if state.open.len() >= config.bundle_count_threshold {
            self.close_open(&mut state, FlushTrigger::Count);
        } else if state.open.size() >= config.bundle_byte_threshold {
            self.close_open(&mut state, FlushTrigger::Bytes);
        } else if opening {
            let command = Command::Arm {
                generation: state.open.generation(),
                deadline: state.open.opened_at() + config.delay_threshold,
            };
            // A gone dispatcher is detected when the bundle itself is sent.
            let _ = self.commands.send(command);
        }

        #[cfg(debug_assertions)]
        debug_assert_below_thresholds!(state.open, config);

        Ok(())
    }

    /// Flushes the open bundle and waits until every accepted item has been
    /// handled.
    ///
    /// Items added while waiting are waited for as well.
    pub async fn flush(&self) {
        {
            let mut state = self.shared.lock();
            if !state.open.is_empty() {
                self.close_open(&mut state, FlushTrigger::Explicit);
            }
        }
        self.shared.wait_drained().await;
    }

    /// Stops accepting items, flushes what is buffered and waits for the
    /// dispatcher to exit. Later calls return immediately.
    pub async fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.closed = true;
            if !state.open.is_empty() {
                self.close_open(&mut state, FlushTrigger::Explicit);
            }
        }
        self.shared.wait_drained().await;

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            let _ = self.commands.send(Command::Shutdown);
            if let Err(e) = dispatcher.await {
                tracing::error!(error = %e, "bundle dispatcher task failed");
            }
        }
    }

    /// Size of all accepted items not yet handled.
    pub fn buffered(&self) -> usize {
        self.shared.lock().buffered
    }

    /// Number of items in the open bundle.
    pub fn pending(&self) -> usize {
        self.shared.lock().open.len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn config(&self) -> &BundlerConfig {
        &self.shared.config
    }

    pub fn metrics(&self) -> &BundlerMetrics {
        &self.shared.metrics
    }

    /// Closes the open bundle and queues it for the dispatcher. Must be
    /// called with the state lock held.
    fn close_open(&self, state: &mut State<T>, trigger: FlushTrigger) {
        let bundle = state.take_open();
        self.shared.metrics.record_flush(trigger);
        tracing::trace!(
            generation = bundle.generation(),
            items = bundle.len(),
            size = bundle.size(),
            ?trigger,
            "bundle closed"
        );

        if let Err(mpsc::error::SendError(Command::Flush(lost))) =
            self.commands.send(Command::Flush(bundle))
        {
            // Runtime gone: the items can never be handled, so stop counting them.
            tracing::warn!(
                items = lost.len(),
                size = lost.size(),
                "bundle dispatcher is not running, dropping bundle"
            );
            state.buffered = state.buffered.saturating_sub(lost.size());
            if state.buffered == 0 {
                self.shared.drained.notify_waiters();
            }
        }
    }
}

/// Dispatcher loop: arms the delay timer, closes expired bundles and starts
/// queued bundles as handler permits free up.
async fn dispatch<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    handler: Arc<dyn BundleHandlerBoxed<T>>,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
) {
    let permits = Arc::new(Semaphore::new(shared.config.handler_limit));
    let mut tasks: JoinSet<()> = JoinSet::new();
    let mut queue: VecDeque<Queued<T>> = VecDeque::new();
    let mut armed: Option<(u64, Instant)> = None;
    let mut stopping = false;

    while !stopping {
        let deadline = armed.map(|(_, deadline)| deadline);
        let timer = async move {
            match deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "bundle handler task failed");
                }
            }

            permit = Arc::clone(&permits).acquire_owned(), if !queue.is_empty() => {
                // The semaphore is never closed.
                if let (Ok(permit), Some(queued)) = (permit, queue.pop_front()) {
                    spawn_handler(&handler, &mut tasks, permit, queued);
                }
            }

            () = timer => {
                let Some((generation, _)) = armed.take() else { continue };
                // Bundles `add` closed before this one expired are queued first.
                while let Ok(command) = commands.try_recv() {
                    if !apply(&shared, command, &mut queue, &mut armed) {
                        stopping = true;
                        break;
                    }
                }
                let expired = {
                    let mut state = shared.lock();
                    if state.open.generation() == generation && !state.open.is_empty() {
                        shared.metrics.record_flush(FlushTrigger::Delay);
                        Some(state.take_open())
                    } else {
                        None
                    }
                };
                if let Some(bundle) = expired {
                    tracing::trace!(
                        generation,
                        items = bundle.len(),
                        queued = queue.len(),
                        "bundle delay elapsed"
                    );
                    queue.push_back(Queued::new(&shared, bundle));
                }
            }

            command = commands.recv() => {
                stopping = match command {
                    Some(command) => !apply(&shared, command, &mut queue, &mut armed),
                    None => true,
                };
            }
        }
    }

    // Whatever is still queued (the bundler was dropped without a shutdown)
    // is handled before the dispatcher exits.
    while let Some(queued) = queue.pop_front() {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        spawn_handler(&handler, &mut tasks, permit, queued);
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "bundle handler task failed during shutdown");
        }
    }
}

/// Applies one command. Returns `false` on shutdown.
fn apply<T>(
    shared: &Arc<Shared<T>>,
    command: Command<T>,
    queue: &mut VecDeque<Queued<T>>,
    armed: &mut Option<(u64, Instant)>,
) -> bool {
    match command {
        Command::Arm {
            generation,
            deadline,
        } => {
            *armed = Some((generation, deadline));
            true
        }
        Command::Flush(bundle) => {
            queue.push_back(Queued::new(shared, bundle));
            true
        }
        Command::Shutdown => false,
    }
}

fn spawn_handler<T: Send + 'static>(
    handler: &Arc<dyn BundleHandlerBoxed<T>>,
    tasks: &mut JoinSet<()>,
    permit: OwnedSemaphorePermit,
    queued: Queued<T>,
) {
    let Queued {
        bundle,
        mut release,
    } = queued;
    release.start();
    let handler = Arc::clone(handler);

    tasks.spawn(async move {
        // Dropped in reverse order: the bundle stops counting as in flight
        // before its permit goes back.
        let _permit = permit;
        let _release = release;
        handler.handle_boxed(bundle).await;
    });
}
