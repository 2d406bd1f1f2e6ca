use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, error, info, trace, warn};

use crate::core::{Error, FirmwareVersion, KettleConfig, Result, Timing};
use crate::protocol::{
    CommandChannel, Frame, FrameCodec, KettleProtocol, LinkEvent, LinkState, LinkStateMachine,
    Opcode, StateInfo,
};
use crate::util::hex;
use super::{Link, Transport, RX_CHARACTERISTIC, TX_CHARACTERISTIC};

/// Link to one kettle.
///
/// Owns the transport session and the notification subscription, tracks the
/// connect/auth lifecycle and enforces one outstanding command at a time:
/// every exchange goes through `&mut self`.
pub struct KettleConnection {
    /// BLE stack used to open sessions
    transport: Arc<dyn Transport>,
    /// Normalized device address
    address: String,
    /// Adapter to connect through
    adapter: Option<String>,
    /// Pairing key sent with auth
    key: Vec<u8>,
    /// Connect and receive timeouts
    timing: Timing,
    /// Command set of the model
    protocol: KettleProtocol,
    /// Open transport session
    link: Option<Box<dyn Link>>,
    /// Raw frames from the RX characteristic
    notifications: Option<mpsc::UnboundedReceiver<Bytes>>,
    /// Connect/auth lifecycle
    state: LinkStateMachine,
    /// Frame encoder and decoder
    codec: FrameCodec,
    /// Sequence number of the next command
    sequence: u8,
    /// Set once by dispose, shared with the owning session
    disposed: Arc<AtomicBool>,
    /// Whether the last connect attempt succeeded
    last_connect_ok: bool,
    /// Whether the last auth attempt succeeded
    last_auth_ok: bool,
    /// Version read after auth
    firmware: Option<FirmwareVersion>,
}

impl KettleConnection {
    /// Creates a new, disconnected link
    pub fn new(transport: Arc<dyn Transport>, config: &KettleConfig, protocol: KettleProtocol) -> Self {
        KettleConnection {
            transport,
            address: config.address.clone(),
            adapter: config.adapter.clone(),
            key: config.key.clone(),
            timing: config.timing.clone(),
            protocol,
            link: None,
            notifications: None,
            state: LinkStateMachine::new(),
            codec: FrameCodec::new(),
            sequence: 0,
            disposed: Arc::new(AtomicBool::new(false)),
            last_connect_ok: false,
            last_auth_ok: false,
            firmware: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn protocol(&self) -> KettleProtocol {
        self.protocol
    }

    pub fn state(&self) -> LinkState {
        self.state.state()
    }

    pub fn state_info(&self) -> StateInfo {
        self.state.get_state_info()
    }

    /// Whether the transport still reports the session as up
    pub fn is_link_alive(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_connected())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == LinkState::Authenticated
    }

    pub fn last_connect_ok(&self) -> bool {
        self.last_connect_ok
    }

    pub fn last_auth_ok(&self) -> bool {
        self.last_auth_ok
    }

    /// Firmware version read after the last successful auth
    pub fn firmware(&self) -> Option<FirmwareVersion> {
        self.firmware
    }

    /// Flag raised by [`dispose`](Self::dispose); shareable for lock-free checks
    pub fn disposed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.disposed)
    }

    fn check_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::Disposed);
        }
        Ok(())
    }

    /// Opens the transport session and subscribes to notifications
    pub async fn connect(&mut self) -> Result<()> {
        self.check_disposed()?;
        if self.state().is_linked() {
            return Ok(());
        }

        self.state.apply(LinkEvent::Connect)?;
        debug!(address = %self.address, "connecting");
        match self.open().await {
            Ok((link, notifications)) => {
                self.link = Some(link);
                self.notifications = Some(notifications);
                self.sequence = rand::random();
                self.state.apply(LinkEvent::Established)?;
                self.last_connect_ok = true;
                debug!(address = %self.address, "connected");
                Ok(())
            }
            Err(e) => {
                self.last_connect_ok = false;
                self.state.apply(LinkEvent::Disconnect)?;
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<(Box<dyn Link>, mpsc::UnboundedReceiver<Bytes>)> {
        let connect_timeout = self.timing.connect_timeout;
        let pending = self
            .transport
            .connect(&self.address, self.adapter.as_deref(), connect_timeout);
        let mut link = match timeout(connect_timeout, pending).await {
            Ok(Ok(link)) => link,
            Ok(Err(Error::Connect(msg))) => return Err(Error::Connect(msg)),
            Ok(Err(e)) => return Err(Error::connect(e.to_string())),
            Err(_) => {
                return Err(Error::connect(format!(
                    "no connection to {} within {:?}",
                    self.address, connect_timeout
                )))
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = link.subscribe(RX_CHARACTERISTIC, tx).await {
            if let Err(close) = link.disconnect().await {
                debug!(error = %close, "disconnect after failed subscribe");
            }
            return Err(Error::connect(format!("subscribe failed: {e}")));
        }
        Ok((link, rx))
    }

    /// Brings the link up to the authenticated state.
    ///
    /// A rejected key disconnects and yields [`Error::Auth`]. The first
    /// successful auth of a session reads the firmware version and syncs the
    /// device clock.
    pub async fn ensure_ready(&mut self) -> Result<()> {
        self.check_disposed()?;

        if self.state().is_linked() && !self.is_link_alive() {
            warn!(address = %self.address, "link dropped");
            self.disconnect().await;
        }

        if self.state() == LinkState::Disconnected {
            self.connect().await?;
        }

        if self.state() == LinkState::Connected {
            let protocol = self.protocol;
            let key = self.key.clone();
            if !protocol.auth(self, &key).await? {
                self.last_auth_ok = false;
                error!(address = %self.address, "{}", Error::Auth);
                self.disconnect().await;
                return Err(Error::Auth);
            }
            self.last_auth_ok = true;
            debug!(address = %self.address, "auth ok");

            self.firmware = Some(protocol.get_version(self).await?);
            protocol.sync_time(self).await?;
            self.state.apply(LinkEvent::Authenticated)?;
        }

        Ok(())
    }

    /// Closes the session. Transport errors are logged and swallowed.
    pub async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.disconnect().await {
                debug!(address = %self.address, error = %e, "disconnect failed");
            }
        }
        self.notifications = None;

        match self.state() {
            LinkState::Disconnected | LinkState::Disposed => {}
            _ => {
                if let Err(e) = self.state.apply(LinkEvent::Disconnect) {
                    debug!(error = %e, "disconnect transition");
                }
                debug!(address = %self.address, "disconnected");
            }
        }
    }

    /// Disconnects for good; every later call fails with [`Error::Disposed`]
    pub async fn dispose(&mut self) {
        self.disposed.store(true, Ordering::SeqCst);
        if self.state() == LinkState::Disposed {
            return;
        }
        self.disconnect().await;
        if let Err(e) = self.state.apply(LinkEvent::Dispose) {
            debug!(error = %e, "dispose transition");
        }
        info!(address = %self.address, "disposed");
    }

    fn next_sequence(&mut self) -> u8 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }
}

#[async_trait]
impl CommandChannel for KettleConnection {
    async fn command(&mut self, opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
        self.check_disposed()?;
        if !self.state().is_linked() {
            return Err(Error::invalid_state(format!(
                "{opcode:?} while {}",
                self.state().name()
            )));
        }

        let sequence = self.next_sequence();
        let command = opcode.code();
        let receive_timeout = self.timing.receive_timeout;

        let mut request = BytesMut::new();
        self.codec
            .encode(Frame::new(sequence, command, Bytes::copy_from_slice(payload)), &mut request)?;

        let (link, notifications) = match (self.link.as_mut(), self.notifications.as_mut()) {
            (Some(link), Some(notifications)) => (link, notifications),
            _ => return Err(Error::invalid_state("no transport session")),
        };

        // Anything queued now answers an earlier, abandoned request
        while let Ok(stale) = notifications.try_recv() {
            trace!(data = %hex(&stale), "dropping stale notification");
        }

        trace!(seq = sequence, data = %hex(&request), "send");
        link.write(TX_CHARACTERISTIC, &request).await?;

        let deadline = Instant::now() + receive_timeout;
        loop {
            let data = match timeout_at(deadline, notifications.recv()).await {
                Ok(Some(data)) => data,
                Ok(None) => return Err(Error::transport("notification stream closed")),
                Err(_) => {
                    return Err(Error::ReceiveTimeout {
                        command,
                        timeout: receive_timeout,
                    })
                }
            };
            trace!(data = %hex(&data), "recv");

            let mut buf = BytesMut::from(&data[..]);
            let frame = match self.codec.decode(&mut buf)? {
                Some(frame) => frame,
                None => continue,
            };
            if frame.sequence != sequence {
                trace!(expected = sequence, got = frame.sequence, "ignoring frame");
                continue;
            }
            if frame.command != command {
                return Err(Error::protocol(format!(
                    "response to {command:#04x} echoes command {:#04x}",
                    frame.command
                )));
            }
            return Ok(frame.payload);
        }
    }
}
