//! Message router: owns the inbound and outbound queues and the loops between them.
//!
//! Inbound messages (from a transport or a timed event) are logged and queued; the dispatch
//! loop hands each one to the installed `ResponseGenerator` and queues any reply; the sending
//! loop delivers replies through the transport in FIFO order and logs every attempt.
//! Generation runs inline in the dispatch loop, so messages are processed one at a time.
//!
//! `stop` abandons whatever is still queued inbound; `drain` closes the inbound side and answers
//! everything already queued first.

use crate::channels::ChatTransport;
use crate::dealer::ResponseGenerator;
use crate::log_store::ConversationLog;
use crate::message::{ChatType, Message};
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// How long the dispatch loop waits on the inbound queue before re-checking for shutdown.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const QUEUE_CAPACITY: usize = 64;

/// Lifecycle: Created -> Running -> Stopping -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    Created,
    Running,
    Stopping,
    Stopped,
}

impl RouterState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RouterState::Created,
            1 => RouterState::Running,
            2 => RouterState::Stopping,
            _ => RouterState::Stopped,
        }
    }

    fn is_shutting_down(self) -> bool {
        matches!(self, RouterState::Stopping | RouterState::Stopped)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("router already started")]
    AlreadyStarted,
    #[error("router is stopped")]
    Stopped,
    #[error("message has an empty chat id")]
    EmptyChatId,
    #[error("timed event interval must be greater than zero")]
    ZeroInterval,
    #[error("inbound queue closed")]
    Closed,
}

/// Opaque id of a registered timed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

struct TimedEvent {
    interval: Duration,
    template: Message,
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Entry point for inbound messages: logs each message, then queues it for dispatch.
/// Cloned into transports and timed events.
#[derive(Clone)]
pub struct Inbox {
    tx: mpsc::Sender<Message>,
    log: Arc<ConversationLog>,
    state: Arc<AtomicU8>,
}

impl Inbox {
    /// Rejected once the router is stopping, so nothing is logged that will never be answered.
    pub async fn deliver(&self, message: Message) -> Result<(), RouterError> {
        if message.chat_id.is_empty() {
            return Err(RouterError::EmptyChatId);
        }
        if RouterState::from_u8(self.state.load(Ordering::SeqCst)).is_shutting_down() {
            return Err(RouterError::Stopped);
        }
        if self.tx.is_closed() {
            return Err(RouterError::Closed);
        }
        if let Err(e) = self.log.append(&message).await {
            log::warn!("router: failed to log inbound message: {}", e);
        }
        self.tx.send(message).await.map_err(|_| RouterError::Closed)
    }
}

pub struct Router {
    state: Arc<AtomicU8>,
    /// Set by `drain`: the dispatch loop closes the inbound queue and exits once it is empty.
    draining: Arc<AtomicBool>,
    generator: Arc<RwLock<Arc<dyn ResponseGenerator>>>,
    transport: Arc<dyn ChatTransport>,
    log: Arc<ConversationLog>,
    inbox: Inbox,
    /// Taken by `start`; dropping it before start closes the queue.
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    poll_interval: Duration,
    timers: Mutex<HashMap<TimerHandle, TimedEvent>>,
    next_timer_id: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        log: Arc<ConversationLog>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let state = Arc::new(AtomicU8::new(RouterState::Created as u8));
        Self {
            inbox: Inbox {
                tx,
                log: log.clone(),
                state: state.clone(),
            },
            state,
            draining: Arc::new(AtomicBool::new(false)),
            generator: Arc::new(RwLock::new(generator)),
            transport,
            log,
            inbound_rx: Mutex::new(Some(rx)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timers: Mutex::new(HashMap::new()),
            next_timer_id: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Bound on how long `stop` waits for an idle dispatch loop to notice shutdown.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn state(&self) -> RouterState {
        RouterState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Inbound handle for transports.
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Replace the response generator. The next dispatched message uses the new one.
    pub async fn set_response_generator(&self, generator: Arc<dyn ResponseGenerator>) {
        *self.generator.write().await = generator;
    }

    /// Log and queue an inbound message. Accepted before start (queued until then).
    pub async fn submit(&self, message: Message) -> Result<(), RouterError> {
        self.inbox.deliver(message).await
    }

    /// Launch the dispatch loop and the sending loop.
    pub async fn start(&self) -> Result<(), RouterError> {
        if let Err(current) = self.state.compare_exchange(
            RouterState::Created as u8,
            RouterState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(if RouterState::from_u8(current).is_shutting_down() {
                RouterError::Stopped
            } else {
                RouterError::AlreadyStarted
            });
        }
        let inbound_rx = self
            .inbound_rx
            .lock()
            .await
            .take()
            .ok_or(RouterError::AlreadyStarted)?;
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);

        let dispatch = tokio::spawn(run_dispatch_loop(
            self.state.clone(),
            self.draining.clone(),
            self.generator.clone(),
            inbound_rx,
            outbound_tx,
            self.poll_interval,
        ));
        let sending = tokio::spawn(run_sending_loop(
            self.transport.clone(),
            self.log.clone(),
            outbound_rx,
        ));
        self.tasks.lock().await.extend([dispatch, sending]);
        log::info!("router: started (transport {})", self.transport.id());
        Ok(())
    }

    /// Cancel timed events, let the dispatch loop finish its current message, drain the
    /// outbound queue, and wait for both loops. Safe to call more than once.
    pub async fn stop(&self) {
        let stopping = self.state.compare_exchange(
            RouterState::Running as u8,
            RouterState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if stopping.is_err()
            && self
                .state
                .compare_exchange(
                    RouterState::Created as u8,
                    RouterState::Stopped as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        {
            self.inbound_rx.lock().await.take();
            log::debug!("router: stopped before start");
        }
        self.finish().await;
    }

    /// Stop accepting inbound messages, answer everything already queued, then stop.
    /// Used when the transport finishes on its own. Before start this is the same as `stop`.
    pub async fn drain(&self) {
        if self.state() != RouterState::Running {
            self.stop().await;
            return;
        }
        self.draining.store(true, Ordering::SeqCst);
        log::info!("router: draining inbound queue");
        self.finish().await;
    }

    /// Cancel timed events, then wait for the loops and the timer tasks.
    async fn finish(&self) {
        let timers: Vec<TimedEvent> = self.timers.lock().await.drain().map(|(_, ev)| ev).collect();
        let mut timer_tasks = Vec::with_capacity(timers.len());
        for ev in timers {
            let _ = ev.cancel.send(());
            timer_tasks.push(ev.task);
        }

        // Loops first: once the dispatch loop exits the inbound queue closes, which also
        // releases a timer blocked on a full queue.
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for handle in tasks.into_iter().chain(timer_tasks) {
            if let Err(e) = handle.await {
                log::warn!("router: task failed: {}", e);
            }
        }
        self.state.store(RouterState::Stopped as u8, Ordering::SeqCst);
        log::info!("router: stopped");
    }

    /// Every `interval`, feed a fresh copy of a direct text message from `sender_id` into the
    /// inbound path (logged and answered like a real message).
    pub async fn register_timed_event(
        &self,
        interval: Duration,
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<TimerHandle, RouterError> {
        let template = Message::text(chat_id, ChatType::Direct, sender_id, text);
        self.register_timed_message(interval, template).await
    }

    /// Like `register_timed_event` with a caller-built template message.
    pub async fn register_timed_message(
        &self,
        interval: Duration,
        template: Message,
    ) -> Result<TimerHandle, RouterError> {
        if interval.is_zero() {
            return Err(RouterError::ZeroInterval);
        }
        if template.chat_id.is_empty() {
            return Err(RouterError::EmptyChatId);
        }
        if self.state().is_shutting_down() {
            return Err(RouterError::Stopped);
        }
        let handle = TimerHandle(self.next_timer_id.fetch_add(1, Ordering::SeqCst));
        let (cancel, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(run_timed_event(
            handle,
            interval,
            template.clone(),
            self.inbox.clone(),
            cancel_rx,
        ));
        self.timers.lock().await.insert(
            handle,
            TimedEvent {
                interval,
                template,
                cancel,
                task,
            },
        );
        log::info!("router: registered {} every {:?}", handle, interval);
        Ok(handle)
    }

    /// Cancel a timed event. Unknown or already-cancelled handles are ignored.
    pub async fn unregister_timed_event(&self, handle: TimerHandle) {
        let Some(ev) = self.timers.lock().await.remove(&handle) else {
            return;
        };
        let _ = ev.cancel.send(());
        log::info!(
            "router: cancelled {} (every {:?} for chat {})",
            handle,
            ev.interval,
            ev.template.chat_id
        );
    }

    pub async fn timed_event_count(&self) -> usize {
        self.timers.lock().await.len()
    }
}

async fn run_dispatch_loop(
    state: Arc<AtomicU8>,
    draining: Arc<AtomicBool>,
    generator: Arc<RwLock<Arc<dyn ResponseGenerator>>>,
    mut inbound_rx: mpsc::Receiver<Message>,
    outbound_tx: mpsc::Sender<Message>,
    poll_interval: Duration,
) {
    while RouterState::from_u8(state.load(Ordering::SeqCst)) == RouterState::Running {
        // Closing keeps buffered messages receivable; recv yields None once they are gone.
        if draining.load(Ordering::SeqCst) {
            inbound_rx.close();
        }
        let message = match tokio::time::timeout(poll_interval, inbound_rx.recv()).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                log::debug!("router: inbound queue closed");
                break;
            }
            Err(_) => continue,
        };
        let current = generator.read().await.clone();
        let chat_id = message.chat_id.clone();
        match AssertUnwindSafe(current.generate_reply(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(Some(reply))) => {
                if outbound_tx.send(reply).await.is_err() {
                    log::warn!("router: outbound queue closed, stopping dispatch");
                    break;
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => log::warn!("router: dropping message for chat {}: {}", chat_id, e),
            Err(_) => log::error!(
                "router: response generator panicked on message for chat {}",
                chat_id
            ),
        }
    }
    state.store(RouterState::Stopped as u8, Ordering::SeqCst);
    log::info!("router: dispatch loop stopped");
}

async fn run_sending_loop(
    transport: Arc<dyn ChatTransport>,
    log: Arc<ConversationLog>,
    mut outbound_rx: mpsc::Receiver<Message>,
) {
    while let Some(message) = outbound_rx.recv().await {
        if let Err(e) = transport.send_message(&message).await {
            log::warn!("router: {}", e);
        }
        if let Err(e) = log.append(&message).await {
            log::warn!("router: failed to log outbound message: {}", e);
        }
    }
    log::info!("router: sending loop stopped");
}

async fn run_timed_event(
    handle: TimerHandle,
    interval: Duration,
    template: Message,
    inbox: Inbox,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => break,
            _ = ticker.tick() => {
                if let Err(e) = inbox.deliver(template.restamped()).await {
                    log::debug!("router: {} stopping: {}", handle, e);
                    break;
                }
            }
        }
    }
    log::debug!("router: {} finished", handle);
}
