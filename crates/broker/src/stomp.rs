//! STOMP-over-TCP transport
//!
//! Speaks STOMP 1.2 to an ActiveMQ-style broker. Destinations are published
//! as `/topic/<name>`. The reader half runs in its own task so ERROR frames
//! are logged and a dropped socket moves the connection to `Closed`.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use contracts::{
    BrokerAddress, BrokerConnection, BrokerSession, BrokerTransport, ConnectionState,
    ContractError, Destination, Endpoint, SharedState, TransportMessage,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{BrokerError, Result};
use crate::frame::Frame;

/// Default timeout for TCP connect and the CONNECT/CONNECTED handshake
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens STOMP connections, trying failover addresses in order
#[derive(Debug, Clone)]
pub struct StompTransport {
    connect_timeout: Duration,
}

impl StompTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for StompTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerTransport for StompTransport {
    type Connection = StompConnection;

    #[instrument(name = "stomp_connect", skip(self), fields(endpoint = %endpoint))]
    async fn connect(
        &self,
        endpoint: &Endpoint,
        client_id: &str,
    ) -> std::result::Result<StompConnection, ContractError> {
        let mut last_error = None;
        for address in endpoint.addresses() {
            let addr = address.to_string();
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => {
                    info!(address = %addr, "TCP connection established");
                    return Ok(StompConnection::new(
                        stream,
                        address.clone(),
                        client_id,
                        self.connect_timeout,
                    ));
                }
                Ok(Err(e)) => {
                    warn!(address = %addr, error = %e, "Broker address unreachable");
                    last_error = Some(e.to_string());
                }
                Err(_) => {
                    warn!(address = %addr, "Connect timed out");
                    last_error = Some(format!(
                        "connect timed out after {}ms",
                        self.connect_timeout.as_millis()
                    ));
                }
            }
        }

        Err(ContractError::connection(
            endpoint.to_string(),
            format!(
                "no broker address reachable (last error: {})",
                last_error.unwrap_or_else(|| "none".into())
            ),
        ))
    }
}

/// One STOMP connection
pub struct StompConnection {
    client_id: String,
    address: BrokerAddress,
    state: SharedState,
    handshake_timeout: Duration,
    /// Raw socket until `start` splits it
    stream: Option<TcpStream>,
    session: Arc<StompSession>,
    reader: Option<JoinHandle<()>>,
}

impl StompConnection {
    fn new(
        stream: TcpStream,
        address: BrokerAddress,
        client_id: &str,
        handshake_timeout: Duration,
    ) -> Self {
        let state = SharedState::default();
        Self {
            client_id: client_id.to_string(),
            address,
            session: Arc::new(StompSession {
                state: state.clone(),
                writer: Mutex::new(None),
            }),
            state,
            handshake_timeout,
            stream: Some(stream),
            reader: None,
        }
    }

    /// Address this connection was opened to
    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    async fn handshake(&self, stream: &mut TcpStream) -> Result<BytesMut> {
        let connect = Frame::new("CONNECT")
            .header("accept-version", "1.2")
            .header("host", self.address.host.clone())
            .header("client-id", self.client_id.clone())
            .header("heart-beat", "0,0");
        stream.write_all(&connect.to_bytes()).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(1024);
        loop {
            if let Some(frame) = Frame::decode(&mut buf)? {
                return match frame.command.as_str() {
                    "CONNECTED" => {
                        debug!(
                            version = frame.get("version").unwrap_or("1.0"),
                            server = frame.get("server").unwrap_or("unknown"),
                            "STOMP session established"
                        );
                        Ok(buf)
                    }
                    "ERROR" => Err(BrokerError::rejected(error_text(&frame))),
                    other => Err(BrokerError::frame(format!(
                        "expected CONNECTED, got {other}"
                    ))),
                };
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(BrokerError::Disconnected);
            }
        }
    }
}

impl BrokerConnection for StompConnection {
    type Session = StompSession;

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    #[instrument(name = "stomp_start", skip(self), fields(address = %self.address, client_id = %self.client_id))]
    async fn start(&mut self) -> std::result::Result<(), ContractError> {
        match self.state.get() {
            ConnectionState::Started => return Ok(()),
            ConnectionState::Closed => {
                return Err(ContractError::connection(
                    self.address.to_string(),
                    "connection is closed",
                ))
            }
            ConnectionState::Unopened => {}
        }

        let mut stream = self.stream.take().ok_or_else(|| {
            ContractError::connection(self.address.to_string(), "socket already consumed")
        })?;

        let leftover = match tokio::time::timeout(self.handshake_timeout, self.handshake(&mut stream))
            .await
        {
            Ok(Ok(buf)) => buf,
            Ok(Err(e)) => {
                self.state.set(ConnectionState::Closed);
                return Err(e.into_connection_error(self.address.to_string()));
            }
            Err(_) => {
                self.state.set(ConnectionState::Closed);
                return Err(ContractError::connection(
                    self.address.to_string(),
                    "handshake timed out",
                ));
            }
        };

        let (read_half, write_half) = stream.into_split();
        *self.session.writer.lock().await = Some(write_half);
        self.state.set(ConnectionState::Started);
        self.reader = Some(tokio::spawn(read_loop(
            read_half,
            leftover,
            self.state.clone(),
            self.address.to_string(),
        )));

        info!("Broker connection started");
        Ok(())
    }

    fn session(&self) -> Arc<StompSession> {
        Arc::clone(&self.session)
    }

    #[instrument(name = "stomp_close", skip(self), fields(address = %self.address))]
    async fn close(&mut self) -> std::result::Result<(), ContractError> {
        if self.state.get() == ConnectionState::Closed && self.reader.is_none() {
            return Ok(());
        }
        self.state.set(ConnectionState::Closed);
        self.stream = None;

        if let Some(mut writer) = self.session.writer.lock().await.take() {
            let disconnect = Frame::new("DISCONNECT").to_bytes();
            if let Err(e) = writer.write_all(&disconnect).await {
                debug!(error = %e, "DISCONNECT not delivered");
            }
            let _ = writer.shutdown().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }

        info!("Broker connection closed");
        Ok(())
    }
}

/// Publishing handle; sends are serialized on the socket's write half
pub struct StompSession {
    state: SharedState,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl BrokerSession for StompSession {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn publish(
        &self,
        destination: &Destination,
        message: TransportMessage,
    ) -> std::result::Result<(), ContractError> {
        let state = self.state.get();
        if state != ConnectionState::Started {
            return Err(ContractError::NotStarted { state });
        }

        let frame = Frame::new("SEND")
            .header("destination", format!("/topic/{destination}"))
            .header("content-type", message.content_type)
            .header("content-length", message.body.len().to_string())
            .body(message.body);
        let bytes = frame.to_bytes();

        let mut send = PendingSend {
            writer: self.writer.lock().await,
            state: &self.state,
            finished: false,
        };
        let half = send
            .writer
            .as_mut()
            .ok_or(ContractError::NotStarted { state: self.state.get() })?;
        half.write_all(&bytes)
            .await
            .map_err(|e| ContractError::publish(destination.as_str(), e.to_string()))?;
        send.finished = true;
        Ok(())
    }
}

/// A SEND being written; if it never finishes, the stream holds a torn frame
/// and the connection is closed so later publishes fail instead of vanishing
struct PendingSend<'a> {
    writer: MutexGuard<'a, Option<OwnedWriteHalf>>,
    state: &'a SharedState,
    finished: bool,
}

impl Drop for PendingSend<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(half) = self.writer.take() {
            warn!("SEND interrupted mid-frame, closing connection");
            drop(half);
        }
        self.state.set(ConnectionState::Closed);
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    mut buf: BytesMut,
    state: SharedState,
    address: String,
) {
    loop {
        loop {
            match Frame::decode(&mut buf) {
                Ok(Some(frame)) if frame.command == "ERROR" => {
                    warn!(address = %address, error = %error_text(&frame), "Broker sent ERROR frame");
                }
                Ok(Some(frame)) => {
                    debug!(address = %address, command = %frame.command, "Ignoring frame");
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(address = %address, error = %e, "Unreadable frame, dropping connection");
                    state.set(ConnectionState::Closed);
                    return;
                }
            }
        }

        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                if state.get() == ConnectionState::Started {
                    warn!(address = %address, "Broker closed the connection");
                }
                state.set(ConnectionState::Closed);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(address = %address, error = %e, "Broker connection lost");
                state.set(ConnectionState::Closed);
                return;
            }
        }
    }
}

fn error_text(frame: &Frame) -> String {
    let body = String::from_utf8_lossy(&frame.body);
    match frame.get("message") {
        Some(message) if body.trim().is_empty() => message.to_string(),
        Some(message) => format!("{message}: {}", body.trim()),
        None => body.trim().to_string(),
    }
}
