//! WebSocket task driving the Socket.IO session.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::events::ServerEvent;
use super::packet::Packet;
use super::{ClientEvent, RealtimeError, RealtimeSink, install_crypto_provider};

/// How long to wait for the WebSocket upgrade, and then for the Engine.IO
/// open and Socket.IO connect packets.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands from handles to the socket task.
#[derive(Debug)]
enum Command {
    Emit(String),
    Disconnect,
}

/// Entry point for opening a realtime connection.
pub struct RealtimeChannel;

impl RealtimeChannel {
    /// Open the WebSocket, complete the Socket.IO handshake and spawn the
    /// task that owns the socket.
    ///
    /// Server events arrive on the returned receiver, which holds at most
    /// `capacity` undelivered events. The receiver yields `None` once the
    /// connection is gone.
    ///
    /// # Errors
    ///
    /// Returns `RealtimeError::Connect` if the socket cannot be opened or the
    /// server refuses the namespace connect.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn connect(
        url: &Url,
        capacity: usize,
    ) -> Result<(RealtimeHandle, mpsc::Receiver<ServerEvent>), RealtimeError> {
        // No-op when the binary already installed one.
        let _ = install_crypto_provider();

        let (mut socket, _) = tokio::time::timeout(HANDSHAKE_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| RealtimeError::Connect("connect timed out".to_string()))?
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut socket))
            .await
            .map_err(|_| RealtimeError::Connect("handshake timed out".to_string()))??;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(capacity.max(1));

        tokio::spawn(run(socket, commands_rx, events_tx));
        info!("Realtime channel connected");

        Ok((
            RealtimeHandle {
                commands: commands_tx,
            },
            events_rx,
        ))
    }
}

/// Wait for the Engine.IO open packet, then connect the default namespace.
async fn handshake(socket: &mut Socket) -> Result<(), RealtimeError> {
    let mut opened = false;

    while let Some(frame) = socket.next().await {
        let frame = frame.map_err(|e| RealtimeError::Connect(e.to_string()))?;
        let WsMessage::Text(text) = frame else {
            continue;
        };

        match Packet::decode(text.as_str())? {
            Packet::Open(info) => {
                debug!(sid = %info.sid, ping_interval = info.ping_interval, "Engine.IO open");
                opened = true;
                send_packet(socket, &Packet::Connect(None)).await?;
            }
            Packet::Ping => send_packet(socket, &Packet::Pong).await?,
            Packet::Connect(_) if opened => return Ok(()),
            Packet::ConnectError(data) => {
                return Err(RealtimeError::Connect(format!("connect refused: {data}")));
            }
            Packet::Close | Packet::Disconnect => break,
            other => debug!(packet = ?other, "Ignoring packet during handshake"),
        }
    }

    Err(RealtimeError::Connect(
        "connection closed during handshake".to_string(),
    ))
}

async fn send_packet(socket: &mut Socket, packet: &Packet) -> Result<(), RealtimeError> {
    socket
        .send(WsMessage::text(packet.encode()?))
        .await
        .map_err(|e| RealtimeError::Connect(e.to_string()))
}

/// Socket task: forwards queued commands out and typed events in until the
/// connection ends or a handle asks to disconnect.
async fn run(
    socket: Socket,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<ServerEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit(frame)) => {
                    if let Err(e) = sink.send(WsMessage::text(frame)).await {
                        warn!(error = %e, "Realtime send failed, closing channel");
                        break;
                    }
                }
                Some(Command::Disconnect) | None => {
                    if let Ok(frame) = Packet::Disconnect.encode() {
                        let _ = sink.send(WsMessage::text(frame)).await;
                    }
                    debug!("Realtime channel disconnected by client");
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match Packet::decode(text.as_str()) {
                    Ok(Packet::Ping) => {
                        if let Ok(pong) = Packet::Pong.encode() {
                            if sink.send(WsMessage::text(pong)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Packet::Event { name, data }) => match ServerEvent::from_event(&name, data) {
                        Ok(Some(event)) => {
                            if events.send(event).await.is_err() {
                                debug!("Event receiver dropped, closing channel");
                                break;
                            }
                        }
                        Ok(None) => debug!(event = %name, "Ignoring unknown realtime event"),
                        Err(e) => warn!(event = %name, error = %e, "Malformed realtime event"),
                    },
                    Ok(Packet::Close | Packet::Disconnect) => {
                        warn!("Realtime channel closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "Undecodable realtime frame"),
                },
                Some(Ok(WsMessage::Close(_))) | None => {
                    warn!("Realtime connection dropped");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime connection error");
                    break;
                }
            },
        }
    }

    let _ = sink.close().await;
}

/// Cloneable handle to a live realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl RealtimeHandle {
    /// Ask the socket task to leave the namespace and close the connection.
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Resolves once the socket task has stopped.
    pub async fn closed(&self) {
        self.commands.closed().await;
    }

    /// Whether the socket task is still running.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }
}

impl RealtimeSink for RealtimeHandle {
    #[instrument(skip_all, fields(event = event.name()))]
    fn emit(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        let frame = event.to_packet()?.encode()?;
        self.commands
            .send(Command::Emit(frame))
            .map_err(|_| RealtimeError::Closed)
    }
}
