//! Reader monitor
//!
//! A poller thread watches one reader and owns the connection to whatever card
//! sits in its field. Transitions between an empty and an occupied reader are
//! turned into [`CardEvent`]s and handed to a dispatcher thread, which invokes
//! the subscribers in registration order.

use std::{
    ffi::CString,
    fmt, mem,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use mifare_apdu_core::CardTransport;
use parking_lot::Mutex;
use pcsc::{Context, ReaderState, State};
use tracing::{debug, info, warn};

use crate::{
    config::{MonitorConfig, PcscConfig},
    error::{PcscError, Result},
    event::{CardEvent, CardEventHandler, CardEventReceiver, ChannelSubscriber, card_event_channel},
    reader::card_present,
    transport::PcscTransport,
};

/// Snapshot of a reader returned by one poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderStatus {
    /// ATR of the card in the field, empty when the reader is empty
    pub atr: Bytes,
}

impl ReaderStatus {
    /// Status of an empty reader
    pub const fn absent() -> Self {
        Self { atr: Bytes::new() }
    }

    /// Status of a reader holding a card with the given ATR
    pub fn present(atr: impl Into<Bytes>) -> Self {
        Self { atr: atr.into() }
    }

    /// Whether a card is in the field
    pub fn is_present(&self) -> bool {
        !self.atr.is_empty()
    }
}

/// Source of reader status and card connections driven by the monitor
pub trait ReaderBackend: Send + 'static {
    /// Connection type opened for a card
    type Connection: CardTransport<Error = PcscError> + 'static;

    /// Name of the watched reader
    fn reader_name(&self) -> &str;

    /// Poll the reader without blocking
    fn status(&mut self) -> Result<ReaderStatus>;

    /// Open a connection to the card currently in the field
    fn connect(&mut self) -> Result<Self::Connection>;
}

/// Monitor backend talking to a real PC/SC reader
pub struct PcscBackend {
    context: Context,
    reader: CString,
    reader_name: String,
    config: PcscConfig,
}

impl fmt::Debug for PcscBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscBackend")
            .field("reader_name", &self.reader_name)
            .field("config", &self.config)
            .finish()
    }
}

impl PcscBackend {
    /// Watch `reader_name` through `context`
    pub fn new(context: Context, reader_name: &str, config: PcscConfig) -> Result<Self> {
        let reader = CString::new(reader_name)
            .map_err(|_| PcscError::ReaderNotFound(reader_name.to_string()))?;
        Ok(Self {
            context,
            reader,
            reader_name: reader_name.to_string(),
            config,
        })
    }
}

impl ReaderBackend for PcscBackend {
    type Connection = PcscTransport;

    fn reader_name(&self) -> &str {
        &self.reader_name
    }

    fn status(&mut self) -> Result<ReaderStatus> {
        let mut states = [ReaderState::new(self.reader.as_c_str(), State::UNAWARE)];
        self.context
            .get_status_change(Some(Duration::ZERO), &mut states)?;

        let state = &states[0];
        if card_present(state.event_state()) {
            Ok(ReaderStatus::present(state.atr().to_vec()))
        } else {
            Ok(ReaderStatus::absent())
        }
    }

    fn connect(&mut self) -> Result<PcscTransport> {
        PcscTransport::connect(self.context.clone(), &self.reader_name, self.config)
    }
}

/// The single live connection of a monitor
#[derive(Debug)]
struct Slot<C> {
    /// Bumped on every installed connection so stale handles can be told apart
    generation: u64,
    connection: Option<C>,
}

type SharedSlot<C> = Arc<Mutex<Slot<C>>>;

/// Handle to the connection the monitor opened for one card
///
/// The monitor keeps ownership of the connection. Once the card is removed
/// (or another card is inserted) every operation on the handle fails with
/// [`PcscError::NoCard`].
pub struct ConnectionHandle<C> {
    reader: String,
    generation: u64,
    slot: SharedSlot<C>,
}

impl<C> ConnectionHandle<C> {
    /// Name of the reader holding the card
    pub fn reader(&self) -> &str {
        &self.reader
    }

    /// Whether the connection behind this handle is still live
    pub fn is_current(&self) -> bool {
        let slot = self.slot.lock();
        slot.generation == self.generation && slot.connection.is_some()
    }

    fn with<R>(&self, f: impl FnOnce(&mut C) -> Result<R>) -> Result<R> {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        match slot.connection.as_mut() {
            Some(connection) if slot.generation == self.generation => f(connection),
            _ => Err(PcscError::NoCard(self.reader.clone())),
        }
    }
}

impl<C> Clone for ConnectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            generation: self.generation,
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<C> fmt::Debug for ConnectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("reader", &self.reader)
            .field("generation", &self.generation)
            .finish()
    }
}

impl<C> CardTransport for ConnectionHandle<C>
where
    C: CardTransport<Error = PcscError>,
{
    type Error = PcscError;

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes> {
        self.with(|connection| connection.do_transmit_raw(command))
    }

    fn is_connected(&self) -> bool {
        self.with(|connection| Ok(connection.is_connected()))
            .unwrap_or(false)
    }

    fn atr(&self) -> Option<Bytes> {
        self.with(|connection| Ok(connection.atr())).ok().flatten()
    }

    fn reset(&mut self) -> Result<()> {
        self.with(|connection| connection.reset())
    }
}

/// Identifies a subscription for [`ReaderMonitor::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscribers<C> {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Box<dyn CardEventHandler<C>>)>,
}

impl<C: 'static> Subscribers<C> {
    const fn new() -> Self {
        Self {
            next_id: 0,
            handlers: Vec::new(),
        }
    }

    /// Deliver `event` to every handler; a panicking handler is logged and skipped
    fn dispatch(&mut self, event: &CardEvent<C>) {
        for (id, handler) in &mut self.handlers {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| handler.handle_event(event)));
            if delivered.is_err() {
                warn!(subscription = id.0, reader = event.reader(), "Card event handler panicked");
            }
        }
    }
}

/// Poller-side state machine
struct Poller<B: ReaderBackend> {
    backend: B,
    reader: String,
    slot: SharedSlot<B::Connection>,
    events: Sender<CardEvent<B::Connection>>,
    present: bool,
}

impl<B: ReaderBackend> Poller<B> {
    /// One poll of the reader, applying at most one transition
    fn poll(&mut self) -> Result<()> {
        let status = self.backend.status()?;

        match (self.present, status.is_present()) {
            (false, true) => {
                let connection = self.backend.connect()?;
                let handle = self.install(connection);
                self.present = true;
                info!(
                    reader = %self.reader,
                    atr = %hex::encode_upper(&status.atr),
                    "Card added"
                );
                self.emit(CardEvent::Added {
                    reader: self.reader.clone(),
                    atr: status.atr,
                    connection: handle,
                })
            }
            (true, false) => {
                self.dispose();
                self.present = false;
                info!(reader = %self.reader, "Card removed");
                self.emit(CardEvent::Removed {
                    reader: self.reader.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Install `connection` as the sole live one and hand out a handle to it
    fn install(&self, connection: B::Connection) -> ConnectionHandle<B::Connection> {
        let (generation, stale) = {
            let mut slot = self.slot.lock();
            slot.generation += 1;
            (slot.generation, slot.connection.replace(connection))
        };
        if stale.is_some() {
            debug!(reader = %self.reader, "Disposing stale connection");
        }
        drop(stale);

        ConnectionHandle {
            reader: self.reader.clone(),
            generation,
            slot: Arc::clone(&self.slot),
        }
    }

    /// Clear the live connection and release it
    fn dispose(&self) {
        let connection = self.slot.lock().connection.take();
        drop(connection);
    }

    fn emit(&self, event: CardEvent<B::Connection>) -> Result<()> {
        self.events
            .send(event)
            .map_err(|_| PcscError::MonitorStopped)
    }

    fn run(mut self, shutdown: &Receiver<()>, interval: Duration) -> B {
        debug!(reader = %self.reader, "Reader monitor started");
        loop {
            match shutdown.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Err(error) = self.poll() {
                warn!(reader = %self.reader, %error, "Reader poll failed");
            }
        }

        self.dispose();
        if mem::take(&mut self.present) {
            info!(reader = %self.reader, "Card removed on shutdown");
            // The dispatcher outlives the poller, so this cannot fail.
            let _ = self.emit(CardEvent::Removed {
                reader: self.reader.clone(),
            });
        }
        debug!(reader = %self.reader, "Reader monitor stopped");
        self.backend
    }
}

struct Running<B> {
    shutdown: Sender<()>,
    poller: JoinHandle<B>,
    dispatcher: JoinHandle<()>,
}

/// Watches one reader for card insertion and removal
///
/// The reader is first polled one interval after [`ReaderMonitor::start`],
/// so subscribers registered before it see every event. Dropping the monitor
/// stops it.
pub struct ReaderMonitor<B: ReaderBackend> {
    reader: String,
    config: MonitorConfig,
    backend: Option<B>,
    slot: SharedSlot<B::Connection>,
    subscribers: Arc<Mutex<Subscribers<B::Connection>>>,
    running: Option<Running<B>>,
}

impl<B: ReaderBackend> fmt::Debug for ReaderMonitor<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderMonitor")
            .field("reader", &self.reader)
            .field("config", &self.config)
            .field("running", &self.running.is_some())
            .finish()
    }
}

impl<B: ReaderBackend> ReaderMonitor<B> {
    /// Create a stopped monitor over `backend`
    pub fn new(backend: B, config: MonitorConfig) -> Self {
        Self {
            reader: backend.reader_name().to_string(),
            config,
            backend: Some(backend),
            slot: Arc::new(Mutex::new(Slot {
                generation: 0,
                connection: None,
            })),
            subscribers: Arc::new(Mutex::new(Subscribers::new())),
            running: None,
        }
    }

    /// Name of the watched reader
    pub fn reader(&self) -> &str {
        &self.reader
    }

    /// Register a handler called for every event
    pub fn subscribe<H>(&self, handler: H) -> SubscriptionId
    where
        H: CardEventHandler<B::Connection>,
    {
        let mut subscribers = self.subscribers.lock();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.handlers.push((id, Box::new(handler)));
        id
    }

    /// Register a channel subscriber and return its receiving end
    pub fn subscribe_channel(&self) -> (SubscriptionId, CardEventReceiver<B::Connection>) {
        let (sender, receiver) = card_event_channel();
        (self.subscribe(ChannelSubscriber::new(sender)), receiver)
    }

    /// Remove a subscription, returning whether it existed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.handlers.len();
        subscribers.handlers.retain(|(existing, _)| *existing != id);
        subscribers.handlers.len() != before
    }

    /// Whether the poller is running
    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Whether a card connection is currently live
    pub fn is_card_present(&self) -> bool {
        self.slot.lock().connection.is_some()
    }

    /// Handle to the live connection, if a card is present
    pub fn current_connection(&self) -> Option<ConnectionHandle<B::Connection>> {
        let slot = self.slot.lock();
        slot.connection.as_ref().map(|_| ConnectionHandle {
            reader: self.reader.clone(),
            generation: slot.generation,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Spawn the poller and dispatcher threads
    ///
    /// Starting a running monitor is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }
        let backend = self.backend.take().ok_or(PcscError::MonitorStopped)?;

        let (events_tx, events_rx) = card_event_channel();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let subscribers = Arc::clone(&self.subscribers);
        let dispatcher = thread::Builder::new()
            .name(format!("{} events", self.reader))
            .spawn(move || {
                for event in &events_rx {
                    subscribers.lock().dispatch(&event);
                }
            })
            .map_err(|e| PcscError::other(format!("failed to spawn dispatcher: {e}")))?;

        let poller = Poller {
            backend,
            reader: self.reader.clone(),
            slot: Arc::clone(&self.slot),
            events: events_tx,
            present: false,
        };
        let interval = self.config.poll_interval;
        let poller = thread::Builder::new()
            .name(format!("{} poller", self.reader))
            .spawn(move || poller.run(&shutdown_rx, interval))
            .map_err(|e| PcscError::other(format!("failed to spawn poller: {e}")))?;

        self.running = Some(Running {
            shutdown: shutdown_tx,
            poller,
            dispatcher,
        });
        Ok(())
    }

    /// Stop polling and wait for both threads
    ///
    /// A card still present gets a final [`CardEvent::Removed`] after its
    /// connection is disposed. Stopping a stopped monitor is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(());
        let backend = running
            .poller
            .join()
            .map_err(|_| PcscError::other("reader poller panicked"))?;
        self.backend = Some(backend);

        running
            .dispatcher
            .join()
            .map_err(|_| PcscError::other("event dispatcher panicked"))
    }
}

impl<B: ReaderBackend> Drop for ReaderMonitor<B> {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(reader = %self.reader, %error, "Failed to stop reader monitor");
        }
    }
}
