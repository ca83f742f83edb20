//! Per-connection worker.
//!
//! The worker reads and frames the socket, waits for the `JOIN` packet,
//! builds the [`Session`], and then dispatches packets strictly in arrival
//! order. A sibling task drains the session's outbound queue to the socket.

use crate::broadcast::announce_presence;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::error::ServerError;
use crate::protocol::{self, inbound};
use crate::session::Session;
use crate::trade;
use bytes::{Bytes, BytesMut};
use packet_codec::{FrameDecoder, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Framed inbound half of a connection.
struct Inbound {
    reader: OwnedReadHalf,
    buf: BytesMut,
    decoder: FrameDecoder,
    timeout: Duration,
}

enum ReadEvent {
    Packet(Packet),
    /// A malformed frame was discarded.
    Dropped,
    Closed,
}

impl Inbound {
    /// Returns the next event, reading from the socket only when no complete
    /// frame is buffered.
    async fn next(&mut self) -> Result<ReadEvent, ServerError> {
        loop {
            match self.decoder.decode(&mut self.buf) {
                Ok(Some(packet)) => return Ok(ReadEvent::Packet(packet)),
                Ok(None) => {}
                Err(e) => {
                    warn!("discarding malformed frame: {}", e);
                    return Ok(ReadEvent::Dropped);
                }
            }

            let read = tokio::time::timeout(self.timeout, self.reader.read_buf(&mut self.buf))
                .await
                .map_err(|_| ServerError::Network("read timed out".into()))?
                .map_err(|e| ServerError::Network(e.to_string()))?;
            if read == 0 {
                return Ok(ReadEvent::Closed);
            }
        }
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Bytes>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_all(&frame).await {
            debug!("write failed: {}", e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Drives one client connection from `JOIN` to teardown.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let ctx = dispatcher.context().clone();
    let (reader, mut writer) = stream.into_split();
    let mut framed = Inbound {
        reader,
        buf: BytesMut::with_capacity(1024),
        decoder: FrameDecoder::new(config.max_packet_size),
        timeout: config.connection_timeout(),
    };

    let join = match framed.next().await? {
        ReadEvent::Packet(packet) if packet.type_id() == inbound::JOIN => packet,
        ReadEvent::Packet(packet) => {
            return Err(ServerError::Network(format!(
                "{addr} sent packet {} before joining",
                packet.type_id()
            )));
        }
        ReadEvent::Dropped | ReadEvent::Closed => {
            return Err(ServerError::Network(format!("{addr} closed before joining")));
        }
    };
    let character_id = join
        .reader()
        .read_i64()
        .map_err(|e| ServerError::Network(format!("malformed join from {addr}: {e}")))?;

    let character = match ctx.persistence.load_character(character_id).await {
        Ok(character) => character,
        Err(e) => {
            warn!(%addr, character_id, "join refused: {}", e);
            if let Ok(frame) = protocol::system_message("Character could not be loaded.") {
                let _ = writer.write_all(&frame).await;
            }
            return Ok(());
        }
    };

    let handle = ctx.directory.allocate_handle();
    let (session, outbound) = Session::new(handle, config.channel, config.instance, character);
    let writer_task = tokio::spawn(write_frames(writer, outbound));

    if let Err(e) = ctx.directory.register(&session).await {
        warn!(%addr, character_id, "join refused: {}", e);
        if let Ok(frame) = protocol::system_message("This character is already online.") {
            session.send(frame);
        }
        drop(session);
        let _ = tokio::time::timeout(WRITER_GRACE, writer_task).await;
        return Ok(());
    }

    info!(
        %addr,
        character_id,
        handle,
        connection = %session.id(),
        "👋 {} joined the {} host",
        session.name(),
        config.instance
    );
    match protocol::join_accepted(handle) {
        Ok(frame) => {
            session.send(frame);
        }
        Err(e) => error!("could not encode join reply: {}", e),
    }
    if let Err(e) = announce_presence(&ctx, &session, true).await {
        warn!(character_id, "presence announcement failed: {}", e);
    }

    let reason = loop {
        let event = tokio::select! {
            event = framed.next() => event,
            _ = session.closed() => break "session closed",
            _ = shutdown.recv() => break "server shutdown",
        };
        match event {
            Ok(ReadEvent::Packet(packet)) => {
                dispatcher.dispatch(&session, &packet).await;
            }
            Ok(ReadEvent::Dropped) => {}
            Ok(ReadEvent::Closed) => break "client closed",
            Err(e) => {
                debug!(character_id, "read ended: {}", e);
                break "read error or timeout";
            }
        }
    };

    // teardown: mark closed, unregister, cancel trade, announce offline
    session.disconnect();
    ctx.directory.unregister(&session).await;
    trade::cancel_for(&ctx, &session).await;
    if let Err(e) = announce_presence(&ctx, &session, false).await {
        warn!(character_id, "presence announcement failed: {}", e);
    }
    info!(character_id, connection = %session.id(), reason, "👋 {} left", session.name());

    drop(session);
    let _ = tokio::time::timeout(WRITER_GRACE, writer_task).await;
    Ok(())
}
