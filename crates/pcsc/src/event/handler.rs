//! Callback-style subscribers

use super::CardEvent;

/// Receives card events on the monitor's dispatcher thread
///
/// Handlers run while the subscriber list is locked, so a handler must not
/// subscribe or unsubscribe on the monitor that is calling it.
pub trait CardEventHandler<C>: Send + 'static {
    /// Handle one event
    fn handle_event(&mut self, event: &CardEvent<C>);
}

impl<C, F> CardEventHandler<C> for F
where
    F: FnMut(&CardEvent<C>) + Send + 'static,
{
    fn handle_event(&mut self, event: &CardEvent<C>) {
        self(event)
    }
}
