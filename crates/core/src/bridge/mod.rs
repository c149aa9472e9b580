//! Typed publish/subscribe surface over the host's raw string channel.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, trace, warn};

use crate::{
    protocol::{Decoded, Message},
    Result, SpectrumViewError,
};

/// Callback the host invokes with every inbound text message.
pub type RawHandler = Box<dyn FnMut(&str) + Send>;

/// Handle returned by [`HostChannel::listen`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The string transport bound into the host environment.
///
/// Implementations are injected into [`PluginBridge`]; nothing in this crate
/// reaches for a global channel.
pub trait HostChannel: Send + Sync {
    /// Hands a message to the host. Fire-and-forget.
    fn send(&self, text: String) -> Result<()>;

    fn listen(&self, handler: RawHandler) -> Result<ListenerId>;

    /// Removes a listener. Unknown ids are ignored.
    fn unlisten(&self, id: ListenerId);
}

/// Adapts a [`HostChannel`] into typed [`Message`] traffic.
#[derive(Clone)]
pub struct PluginBridge {
    channel: Arc<dyn HostChannel>,
}

impl PluginBridge {
    pub fn new(channel: Arc<dyn HostChannel>) -> Self {
        Self { channel }
    }

    /// Serializes `message` and sends it to the host.
    pub fn publish(&self, message: &Message) -> Result<()> {
        let text = message.encode()?;
        trace!(%text, "publishing to host");
        self.channel.send(text)
    }

    /// Registers `handler` for decoded inbound messages.
    ///
    /// Malformed text is logged and dropped; envelopes with unknown tags are
    /// skipped. Neither ends the subscription.
    pub fn subscribe<F>(&self, mut handler: F) -> Result<Subscription>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let raw: RawHandler = Box::new(move |text: &str| match Message::decode(text) {
            Ok(Decoded::Known(message)) => handler(message),
            Ok(Decoded::Unrecognized { kind, inner }) => {
                trace!(%kind, ?inner, "ignoring unrecognised host message");
            }
            Err(err) => warn!(%err, "dropping malformed host message"),
        });

        let id = self.channel.listen(raw)?;
        debug!(listener = id.0, "subscribed to host channel");
        Ok(Subscription {
            channel: Some(self.channel.clone()),
            id,
        })
    }
}

impl fmt::Debug for PluginBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginBridge").finish_non_exhaustive()
    }
}

/// A live listener registration. Dropping it unsubscribes.
pub struct Subscription {
    channel: Option<Arc<dyn HostChannel>>,
    id: ListenerId,
}

impl Subscription {
    /// Stops deliveries to the handler. Calling it again does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.unlisten(self.id);
            debug!(listener = self.id.0, "unsubscribed from host channel");
        }
    }

    pub fn is_active(&self) -> bool {
        self.channel.is_some()
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// In-process channel: outbound text is queued for whoever plays the host,
/// inbound text is pushed with [`LoopbackChannel::deliver`].
#[derive(Clone, Default)]
pub struct LoopbackChannel {
    shared: Arc<Mutex<LoopbackState>>,
}

#[derive(Default)]
struct LoopbackState {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<Mutex<RawHandler>>)>,
    outbound: VecDeque<String>,
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains everything sent towards the host so far, oldest first.
    pub fn take_outbound(&self) -> Result<Vec<String>> {
        let mut state = self.lock()?;
        Ok(state.outbound.drain(..).collect())
    }

    /// Delivers `text` to every listener registered at call time and returns
    /// how many received it. A listener removed mid-delivery is skipped.
    pub fn deliver(&self, text: &str) -> Result<usize> {
        let snapshot: Vec<_> = self
            .lock()?
            .listeners
            .iter()
            .map(|(id, handler)| (*id, handler.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            if !self.lock()?.listeners.iter().any(|(live, _)| *live == id) {
                continue;
            }
            let mut handler = handler
                .lock()
                .map_err(|_| SpectrumViewError::msg("host listener has been poisoned"))?;
            (*handler)(text);
            delivered += 1;
        }
        Ok(delivered)
    }

    pub fn listener_count(&self) -> Result<usize> {
        Ok(self.lock()?.listeners.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LoopbackState>> {
        self.shared
            .lock()
            .map_err(|_| SpectrumViewError::msg("loopback channel has been poisoned"))
    }
}

impl HostChannel for LoopbackChannel {
    fn send(&self, text: String) -> Result<()> {
        self.lock()?.outbound.push_back(text);
        Ok(())
    }

    fn listen(&self, handler: RawHandler) -> Result<ListenerId> {
        let mut state = self.lock()?;
        let id = ListenerId(state.next_id);
        state.next_id += 1;
        state.listeners.push((id, Arc::new(Mutex::new(handler))));
        Ok(id)
    }

    fn unlisten(&self, id: ListenerId) {
        match self.lock() {
            Ok(mut state) => state.listeners.retain(|(live, _)| *live != id),
            Err(err) => warn!(%err, "could not remove host listener"),
        }
    }
}

impl fmt::Debug for LoopbackChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (listeners, outbound) = self
            .lock()
            .map(|state| (state.listeners.len(), state.outbound.len()))
            .unwrap_or_default();
        f.debug_struct("LoopbackChannel")
            .field("listeners", &listeners)
            .field("outbound", &outbound)
            .finish()
    }
}
