use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures::{Sink, SinkExt, Stream, StreamExt};
use ilp_plugin::{DataHandler, HandlerSlot, MoneyHandler, Plugin, PluginError};
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use ring::constant_time;

use crate::errors::BtpTransportError;
use crate::packet::{BtpError, BtpMessage, BtpPacket, BtpResponse, BtpTransfer, ProtocolData};
use crate::subprotocols::{auth_protocol_data, SubProtocols, AUTH, AUTH_TOKEN};

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Clone, Debug)]
pub struct BtpConfig {
    /// How long an outgoing request waits for its Response or Error
    /// before the call fails and the pending entry is dropped.
    pub response_timeout: Duration,
}

impl Default for BtpConfig {
    fn default() -> Self {
        BtpConfig {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
        }
    }
}

type PendingReply = oneshot::Sender<Result<BtpResponse, BtpError>>;

struct Shared {
    outgoing: mpsc::UnboundedSender<Bytes>,
    pending: Mutex<HashMap<u32, PendingReply>>,
    data_handler: HandlerSlot<DataHandler>,
    money_handler: HandlerSlot<MoneyHandler>,
    response_timeout: Duration,
}

impl Shared {
    fn send_packet(&self, packet: &BtpPacket) -> Result<(), BtpTransportError> {
        self.outgoing
            .unbounded_send(packet.to_bytes())
            .map_err(|_| BtpTransportError::ConnectionClosed)
    }

    fn settle(&self, request_id: u32, result: Result<BtpResponse, BtpError>) {
        match self.pending.lock().remove(&request_id) {
            Some(reply) => {
                // The caller may have timed out between our lookup and
                // this send; nothing left to do then.
                let _ = reply.send(result);
            }
            None => trace!("dropping late reply for unknown request {}", request_id),
        }
    }
}

/// One side of a BTP connection: correlates outgoing requests with
/// replies and dispatches incoming traffic to the registered handlers.
///
/// Cheap to clone; all clones share the connection.
#[derive(Clone)]
pub struct BtpService {
    shared: Arc<Shared>,
}

impl fmt::Debug for BtpService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtpService").finish_non_exhaustive()
    }
}

impl BtpService {
    /// Starts the service over an established (already authenticated)
    /// duplex byte channel. Spawns the forwarding and dispatch tasks,
    /// so this must be called within a tokio runtime.
    pub fn new<Tx, Rx>(transport_tx: Tx, transport_rx: Rx, config: BtpConfig) -> BtpService
    where
        Tx: Sink<Bytes> + Send + Unpin + 'static,
        Tx::Error: fmt::Display,
        Rx: Stream<Item = Bytes> + Send + Unpin + 'static,
    {
        let (outgoing, outgoing_rx) = mpsc::unbounded::<Bytes>();
        let shared = Arc::new(Shared {
            outgoing,
            pending: Mutex::new(HashMap::new()),
            data_handler: HandlerSlot::new("data"),
            money_handler: HandlerSlot::new("money"),
            response_timeout: config.response_timeout,
        });

        tokio::spawn(forward_outgoing(outgoing_rx, transport_tx));
        tokio::spawn(dispatch_loop(shared.clone(), transport_rx));

        BtpService { shared }
    }

    /// Client-side connect: starts the service and performs the auth
    /// handshake before returning it.
    pub async fn connect<Tx, Rx>(
        transport_tx: Tx,
        transport_rx: Rx,
        token: &str,
        config: BtpConfig,
    ) -> Result<BtpService, BtpTransportError>
    where
        Tx: Sink<Bytes> + Send + Unpin + 'static,
        Tx::Error: fmt::Display,
        Rx: Stream<Item = Bytes> + Send + Unpin + 'static,
    {
        let service = BtpService::new(transport_tx, transport_rx, config);
        service.request(auth_protocol_data(token)).await?;
        debug!("btp client authenticated");
        Ok(service)
    }

    /// Server-side accept: the first inbound packet must be an auth
    /// Message carrying the expected token. On success the peer gets an
    /// empty Response and the service starts; on failure it gets an
    /// Error and the transport is dropped.
    pub async fn accept<Tx, Rx>(
        mut transport_tx: Tx,
        mut transport_rx: Rx,
        expected_token: &str,
        config: BtpConfig,
    ) -> Result<BtpService, BtpTransportError>
    where
        Tx: Sink<Bytes> + Send + Unpin + 'static,
        Tx::Error: fmt::Display,
        Rx: Stream<Item = Bytes> + Send + Unpin + 'static,
    {
        let bytes = transport_rx
            .next()
            .await
            .ok_or(BtpTransportError::ConnectionClosed)?;
        let message = match BtpPacket::from_bytes(&bytes)? {
            BtpPacket::Message(message) => message,
            other => {
                let reason = "first packet was not an auth message".to_owned();
                let reply =
                    BtpError::from_name(other.request_id(), "NotAcceptedError", reason.clone());
                let _ = transport_tx.send(reply.to_bytes()).await;
                return Err(BtpTransportError::Unauthorized(reason));
            }
        };

        match verify_auth(&message, expected_token) {
            Ok(()) => {
                let response = BtpResponse {
                    request_id: message.request_id,
                    protocol_data: Vec::new(),
                };
                transport_tx
                    .send(response.to_bytes())
                    .await
                    .map_err(|_| BtpTransportError::ConnectionClosed)?;
                debug!("btp peer authenticated");
                Ok(BtpService::new(transport_tx, transport_rx, config))
            }
            Err(reason) => {
                warn!("btp auth failed: {}", reason);
                let reply =
                    BtpError::from_name(message.request_id, "NotAcceptedError", reason.clone());
                let _ = transport_tx.send(reply.to_bytes()).await;
                Err(BtpTransportError::Unauthorized(reason))
            }
        }
    }

    /// Sends a Message and waits for the matching Response.
    pub async fn request(
        &self,
        protocol_data: Vec<ProtocolData>,
    ) -> Result<BtpResponse, BtpTransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request_id = self.register_pending(reply_tx);
        let packet = BtpPacket::Message(BtpMessage {
            request_id,
            protocol_data,
        });
        if let Err(err) = self.shared.send_packet(&packet) {
            self.shared.pending.lock().remove(&request_id);
            return Err(err);
        }
        self.await_reply(request_id, reply_rx).await
    }

    /// Sends a Transfer and waits for the matching Response.
    pub async fn transfer(
        &self,
        amount: u64,
        protocol_data: Vec<ProtocolData>,
    ) -> Result<BtpResponse, BtpTransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request_id = self.register_pending(reply_tx);
        let packet = BtpPacket::Transfer(BtpTransfer {
            request_id,
            amount,
            protocol_data,
        });
        if let Err(err) = self.shared.send_packet(&packet) {
            self.shared.pending.lock().remove(&request_id);
            return Err(err);
        }
        self.await_reply(request_id, reply_rx).await
    }

    pub fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError> {
        self.shared.data_handler.register(handler)
    }

    pub fn deregister_data_handler(&self) {
        self.shared.data_handler.deregister();
    }

    pub fn register_money_handler(&self, handler: MoneyHandler) -> Result<(), PluginError> {
        self.shared.money_handler.register(handler)
    }

    pub fn deregister_money_handler(&self) {
        self.shared.money_handler.deregister();
    }

    pub fn is_open(&self) -> bool {
        !self.shared.outgoing.is_closed()
    }

    /// Stops accepting outgoing packets. The dispatch task ends when
    /// the peer's half closes.
    pub fn close(&self) {
        self.shared.outgoing.close_channel();
    }

    fn register_pending(&self, reply: PendingReply) -> u32 {
        let mut pending = self.shared.pending.lock();
        let mut request_id = rand::random::<u32>();
        while pending.contains_key(&request_id) {
            request_id = rand::random();
        }
        pending.insert(request_id, reply);
        request_id
    }

    async fn await_reply(
        &self,
        request_id: u32,
        reply_rx: oneshot::Receiver<Result<BtpResponse, BtpError>>,
    ) -> Result<BtpResponse, BtpTransportError> {
        match tokio::time::timeout(self.shared.response_timeout, reply_rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(error))) => Err(BtpTransportError::Peer(error)),
            Ok(Err(_canceled)) => Err(BtpTransportError::ConnectionClosed),
            Err(_elapsed) => {
                self.shared.pending.lock().remove(&request_id);
                Err(BtpTransportError::Timeout(request_id))
            }
        }
    }
}

fn verify_auth(message: &BtpMessage, expected_token: &str) -> Result<(), String> {
    let first_is_auth = message
        .protocol_data
        .first()
        .map(|entry| entry.protocol_name == AUTH)
        .unwrap_or(false);
    if !first_is_auth {
        return Err("auth must be the first sub-protocol".to_owned());
    }
    let token = message
        .protocol_data
        .iter()
        .find(|entry| entry.protocol_name == AUTH_TOKEN)
        .ok_or_else(|| "missing auth_token".to_owned())?;
    if constant_time::verify_slices_are_equal(&token.data, expected_token.as_bytes()).is_ok() {
        Ok(())
    } else {
        Err("invalid auth token".to_owned())
    }
}

async fn forward_outgoing<Tx>(mut outgoing_rx: mpsc::UnboundedReceiver<Bytes>, mut transport_tx: Tx)
where
    Tx: Sink<Bytes> + Unpin,
    Tx::Error: fmt::Display,
{
    while let Some(bytes) = outgoing_rx.next().await {
        if let Err(err) = transport_tx.send(bytes).await {
            warn!("failed to forward outgoing packet: {}", err);
            break;
        }
    }
}

async fn dispatch_loop<Rx>(shared: Arc<Shared>, mut transport_rx: Rx)
where
    Rx: Stream<Item = Bytes> + Unpin,
{
    while let Some(bytes) = transport_rx.next().await {
        let packet = match BtpPacket::from_bytes(&bytes) {
            Ok(packet) => packet,
            Err(err) => {
                // A peer that sends garbage cannot be trusted to frame
                // the next packet either.
                error!("malformed btp packet, closing connection: {}", err);
                break;
            }
        };
        match packet {
            BtpPacket::Response(response) => {
                shared.settle(response.request_id, Ok(response));
            }
            BtpPacket::Error(error) => {
                shared.settle(error.request_id, Err(error));
            }
            BtpPacket::Message(message) => {
                tokio::spawn(handle_message(shared.clone(), message));
            }
            BtpPacket::Transfer(transfer) => {
                tokio::spawn(handle_transfer(shared.clone(), transfer));
            }
        }
    }
    shared.outgoing.close_channel();
    // Wake every caller still waiting; dropping the senders surfaces
    // ConnectionClosed on their end.
    shared.pending.lock().clear();
}

async fn handle_message(shared: Arc<Shared>, message: BtpMessage) {
    let request_id = message.request_id;
    let reply = match respond_to_message(&shared, message).await {
        Ok(protocol_data) => BtpPacket::Response(BtpResponse {
            request_id,
            protocol_data,
        }),
        Err(error) => BtpPacket::Error(error),
    };
    if shared.send_packet(&reply).is_err() {
        trace!("connection closed before reply to request {}", request_id);
    }
}

async fn respond_to_message(
    shared: &Shared,
    message: BtpMessage,
) -> Result<Vec<ProtocolData>, BtpError> {
    let request_id = message.request_id;
    let sub_protocols = SubProtocols::from_protocol_data(message.protocol_data)
        .map_err(|err| BtpError::from_name(request_id, "InvalidFieldsError", err.to_string()))?;
    let ilp = sub_protocols.ilp.ok_or_else(|| {
        BtpError::from_name(request_id, "NotAcceptedError", "no ilp sub-protocol")
    })?;
    let handler = shared.data_handler.get().ok_or_else(|| {
        BtpError::from_name(request_id, "UnreachableError", "no data handler registered")
    })?;
    match handler(ilp).await {
        Ok(response) => Ok(SubProtocols::ilp(response).into_protocol_data()),
        Err(err) => Err(BtpError::from_name(
            request_id,
            "NotAcceptedError",
            err.to_string(),
        )),
    }
}

async fn handle_transfer(shared: Arc<Shared>, transfer: BtpTransfer) {
    let request_id = transfer.request_id;
    let reply = match shared.money_handler.get() {
        Some(handler) => match handler(transfer.amount).await {
            Ok(()) => BtpPacket::Response(BtpResponse {
                request_id,
                protocol_data: Vec::new(),
            }),
            Err(err) => BtpPacket::Error(BtpError::from_name(
                request_id,
                "NotAcceptedError",
                err.to_string(),
            )),
        },
        None => BtpPacket::Error(BtpError::from_name(
            request_id,
            "UnreachableError",
            "no money handler registered",
        )),
    };
    if shared.send_packet(&reply).is_err() {
        trace!("connection closed before reply to request {}", request_id);
    }
}

/// [`Plugin`] over an authenticated BTP connection: `send_data` is a
/// Message carrying the `ilp` sub-protocol, `send_money` is a Transfer.
pub struct BtpPlugin {
    service: BtpService,
}

impl BtpPlugin {
    pub fn new(service: BtpService) -> Self {
        BtpPlugin { service }
    }

    pub fn service(&self) -> &BtpService {
        &self.service
    }
}

#[async_trait]
impl Plugin for BtpPlugin {
    async fn connect(&self) -> Result<(), PluginError> {
        // The connection is established and authenticated before the
        // plugin is constructed.
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), PluginError> {
        self.service.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.service.is_open()
    }

    async fn send_data(&self, data: Bytes) -> Result<Bytes, PluginError> {
        let response = self
            .service
            .request(SubProtocols::ilp(data).into_protocol_data())
            .await
            .map_err(|err| PluginError::Transport(err.to_string()))?;
        let sub_protocols = SubProtocols::from_protocol_data(response.protocol_data)
            .map_err(|err| PluginError::Transport(err.to_string()))?;
        sub_protocols
            .ilp
            .ok_or_else(|| PluginError::Transport("response carried no ilp sub-protocol".into()))
    }

    async fn send_money(&self, amount: u64) -> Result<(), PluginError> {
        self.service
            .transfer(amount, Vec::new())
            .await
            .map_err(|err| PluginError::Transport(err.to_string()))?;
        Ok(())
    }

    fn register_data_handler(&self, handler: DataHandler) -> Result<(), PluginError> {
        self.service.register_data_handler(handler)
    }

    fn deregister_data_handler(&self) {
        self.service.deregister_data_handler();
    }

    fn register_money_handler(&self, handler: MoneyHandler) -> Result<(), PluginError> {
        self.service.register_money_handler(handler)
    }

    fn deregister_money_handler(&self) {
        self.service.deregister_money_handler();
    }
}
