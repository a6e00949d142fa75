//! The ledger-plugin seam between protocol layers and transports.
//!
//! A [`Plugin`] moves two things between directly connected peers: ILP
//! packets (`send_data`) and money notifications (`send_money`). Incoming
//! traffic is delivered to at most one registered handler of each kind.
//! Higher layers hold a `Plugin` and never see the transport underneath.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use ilp_packet::IlpError;
use parking_lot::Mutex;

/// Answers an incoming ILP packet with a response packet (Fulfill or
/// Reject, already serialized).
pub type DataHandler =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Bytes, IlpError>> + Send + Sync>;

/// Accepts an incoming money notification for the given amount.
pub type MoneyHandler =
    Arc<dyn Fn(u64) -> BoxFuture<'static, Result<(), IlpError>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin is not connected")]
    NotConnected,
    #[error("a {0} handler is already registered")]
    HandlerOccupied(&'static str),
    #[error("no {0} handler is registered")]
    NoHandler(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Reject(#[from] IlpError),
}

/// A bilateral transport for ILP packets and money.
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn connect(&self) -> Result<(), PluginError>;

    async fn disconnect(&self) -> Result<(), PluginError>;

    fn is_connected(&self) -> bool;

    /// Sends a serialized ILP packet and resolves with the peer's
    /// serialized response packet.
    async fn send_data(&self, data: Bytes) -> Result<Bytes, PluginError>;

    /// Notifies the peer that `amount` units have been paid.
    async fn send_money(&self, amount: u64) -> Result<(), PluginError>;

    fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError>;

    fn deregister_data_handler(&self);

    fn register_money_handler(&self, handler: MoneyHandler) -> Result<(), PluginError>;

    fn deregister_money_handler(&self);
}

/// Holds at most one handler. Registering over an occupied slot is an
/// error; the caller must deregister first.
pub struct HandlerSlot<H> {
    name: &'static str,
    slot: Mutex<Option<H>>,
}

impl<H: Clone> HandlerSlot<H> {
    pub fn new(name: &'static str) -> Self {
        HandlerSlot {
            name,
            slot: Mutex::new(None),
        }
    }

    pub fn register(&self, handler: H) -> Result<(), PluginError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(PluginError::HandlerOccupied(self.name));
        }
        *slot = Some(handler);
        Ok(())
    }

    pub fn deregister(&self) {
        *self.slot.lock() = None;
    }

    pub fn get(&self) -> Option<H> {
        self.slot.lock().clone()
    }

    pub fn require(&self) -> Result<H, PluginError> {
        self.get().ok_or(PluginError::NoHandler(self.name))
    }
}

struct ChannelEnd {
    data: HandlerSlot<DataHandler>,
    money: HandlerSlot<MoneyHandler>,
    connected: AtomicBool,
}

impl ChannelEnd {
    fn new() -> Arc<Self> {
        Arc::new(ChannelEnd {
            data: HandlerSlot::new("data"),
            money: HandlerSlot::new("money"),
            connected: AtomicBool::new(true),
        })
    }
}

/// An in-process loopback plugin: whatever one side sends is handled by
/// the handlers registered on the other side. Used to wire a sender and
/// a receiver together without a network.
pub struct ChannelPlugin {
    local: Arc<ChannelEnd>,
    peer: Arc<ChannelEnd>,
}

/// Two plugins joined back to back.
pub fn channel_pair() -> (ChannelPlugin, ChannelPlugin) {
    let a = ChannelEnd::new();
    let b = ChannelEnd::new();
    (
        ChannelPlugin {
            local: a.clone(),
            peer: b.clone(),
        },
        ChannelPlugin { local: b, peer: a },
    )
}

impl ChannelPlugin {
    fn ensure_connected(&self) -> Result<(), PluginError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(PluginError::NotConnected)
        }
    }
}

#[async_trait]
impl Plugin for ChannelPlugin {
    async fn connect(&self) -> Result<(), PluginError> {
        self.local.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PluginError> {
        self.local.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.local.connected.load(Ordering::SeqCst) && self.peer.connected.load(Ordering::SeqCst)
    }

    async fn send_data(&self, data: Bytes) -> Result<Bytes, PluginError> {
        self.ensure_connected()?;
        let handler = self.peer.data.require()?;
        Ok(handler(data).await?)
    }

    async fn send_money(&self, amount: u64) -> Result<(), PluginError> {
        self.ensure_connected()?;
        let handler = self.peer.money.require()?;
        Ok(handler(amount).await?)
    }

    fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError> {
        self.local.data.register(handler)
    }

    fn deregister_data_handler(&self) {
        self.local.data.deregister();
    }

    fn register_money_handler(&self, handler: MoneyHandler) -> Result<(), PluginError> {
        self.local.money.register(handler)
    }

    fn deregister_money_handler(&self) {
        self.local.money.deregister();
    }
}
