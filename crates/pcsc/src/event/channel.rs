//! Channel-based event delivery

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{CardEvent, CardEventHandler};

/// Sender for card events
pub type CardEventSender<C> = Sender<CardEvent<C>>;
/// Receiver for card events
pub type CardEventReceiver<C> = Receiver<CardEvent<C>>;

/// Create an unbounded channel for card events
pub fn card_event_channel<C>() -> (CardEventSender<C>, CardEventReceiver<C>) {
    unbounded()
}

/// Subscriber forwarding every event into a channel
#[derive(Debug)]
pub struct ChannelSubscriber<C> {
    sender: CardEventSender<C>,
}

impl<C> ChannelSubscriber<C> {
    /// Forward events into `sender`
    pub const fn new(sender: CardEventSender<C>) -> Self {
        Self { sender }
    }
}

impl<C: Send + 'static> CardEventHandler<C> for ChannelSubscriber<C> {
    fn handle_event(&mut self, event: &CardEvent<C>) {
        // A dropped receiver only means nobody listens any more.
        let _ = self.sender.send(event.clone());
    }
}
