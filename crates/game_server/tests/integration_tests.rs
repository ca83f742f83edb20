//! End-to-end tests over real TCP connections.
//!
//! Each test binds an ephemeral port, serves it with the default handler
//! table and talks to it with raw frames.

use bytes::Bytes;
use game_server::model::Character;
use game_server::protocol::{inbound, outbound};
use game_server::{create_server, GameServer, GameSettings, MemoryStore, ServerConfig, ServerContext};
use packet_codec::{Packet, PacketWriter, HEADER_LEN};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    server: Arc<GameServer>,
    addr: SocketAddr,
    ctx: Arc<ServerContext>,
}

async fn start(store: MemoryStore, config: ServerConfig) -> Running {
    let ctx = Arc::new(ServerContext::new(Arc::new(store), GameSettings::default()));
    let server = Arc::new(create_server(config, ctx.clone()).unwrap());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serving = server.clone();
    tokio::spawn(async move { serving.serve(listener).await });
    Running { server, addr, ctx }
}

fn store_with(names: &[(i64, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    for (id, name) in names {
        store.insert_character(Character::new(*id, *name, 8));
    }
    store
}

fn test_config() -> ServerConfig {
    ServerConfig {
        channel: 1,
        ..Default::default()
    }
}

fn frame(type_id: u16, build: impl FnOnce(&mut PacketWriter)) -> Bytes {
    let mut writer = PacketWriter::new(type_id);
    build(&mut writer);
    writer.finish().unwrap()
}

async fn read_packet(stream: &mut TcpStream) -> Option<Packet> {
    let mut header = [0u8; HEADER_LEN];
    timeout(WAIT, stream.read_exact(&mut header)).await.ok()?.ok()?;
    let len = u16::from_le_bytes([header[0], header[1]]) as usize;
    let mut frame = header.to_vec();
    frame.resize(len, 0);
    timeout(WAIT, stream.read_exact(&mut frame[HEADER_LEN..]))
        .await
        .ok()?
        .ok()?;
    Some(Packet::from_frame(&frame).unwrap())
}

async fn join(addr: SocketAddr, character_id: i64) -> (TcpStream, u32) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&frame(inbound::JOIN, |w| {
            w.write_i64(character_id);
        }))
        .await
        .unwrap();
    let accepted = read_packet(&mut stream).await.unwrap();
    assert_eq!(accepted.type_id(), outbound::JOIN_ACCEPTED);
    let handle = accepted.reader().read_u32().unwrap();
    (stream, handle)
}

async fn wait_until_online(ctx: &ServerContext, character_id: i64) {
    for _ in 0..100 {
        if let Some(session) = ctx.directory.find_by_character_id(character_id).await {
            if session.state() == game_server::SessionState::Ready {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("character {character_id} never became ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn join_is_accepted_with_a_handle() {
    let running = start(store_with(&[(1, "Tai")]), test_config()).await;

    let (_stream, handle) = join(running.addr, 1).await;

    assert_ne!(handle, 0);
    let session = running.ctx.directory.find_by_character_id(1).await.unwrap();
    assert_eq!(session.handle(), handle);
    assert_eq!(session.channel(), 1);
    running.server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_frame_does_not_end_the_connection() {
    let running = start(store_with(&[(1, "Tai")]), test_config()).await;
    let (mut stream, _) = join(running.addr, 1).await;

    // declared length shorter than the header
    stream.write_all(&[2, 0, 0, 0]).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    stream
        .write_all(&frame(inbound::ENCYCLOPEDIA_LOAD, |_| {}))
        .await
        .unwrap();

    let reply = read_packet(&mut stream).await.unwrap();
    assert_eq!(reply.type_id(), outbound::ENCYCLOPEDIA);
    assert_eq!(reply.reader().read_u16().unwrap(), 0);
    running.server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn second_login_of_an_online_character_is_refused() {
    let running = start(store_with(&[(1, "Tai")]), test_config()).await;
    let (_first, first_handle) = join(running.addr, 1).await;

    let mut second = TcpStream::connect(running.addr).await.unwrap();
    second
        .write_all(&frame(inbound::JOIN, |w| {
            w.write_i64(1);
        }))
        .await
        .unwrap();

    let reply = read_packet(&mut second).await.unwrap();
    assert_eq!(reply.type_id(), outbound::SYSTEM_MESSAGE);
    assert!(read_packet(&mut second).await.is_none());
    let session = running.ctx.directory.find_by_character_id(1).await.unwrap();
    assert_eq!(session.handle(), first_handle);
    running.server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn trade_request_travels_between_connections() {
    let running = start(store_with(&[(1, "Tai"), (2, "Sora")]), test_config()).await;
    let (mut tai, _) = join(running.addr, 1).await;
    let (mut sora, sora_handle) = join(running.addr, 2).await;
    for stream in [&mut tai, &mut sora] {
        stream
            .write_all(&frame(inbound::LOADING_COMPLETE, |_| {}))
            .await
            .unwrap();
    }
    wait_until_online(&running.ctx, 1).await;
    wait_until_online(&running.ctx, 2).await;

    tai.write_all(&frame(inbound::TRADE_REQUEST, |w| {
        w.write_u32(sora_handle);
    }))
    .await
    .unwrap();

    let offer = read_packet(&mut sora).await.unwrap();
    assert_eq!(offer.type_id(), outbound::TRADE_REQUEST_SUCCESS);
    running.server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnect_unregisters_and_cancels_the_trade() {
    let running = start(store_with(&[(1, "Tai"), (2, "Sora")]), test_config()).await;
    let (mut tai, _) = join(running.addr, 1).await;
    let (mut sora, sora_handle) = join(running.addr, 2).await;
    for stream in [&mut tai, &mut sora] {
        stream
            .write_all(&frame(inbound::LOADING_COMPLETE, |_| {}))
            .await
            .unwrap();
    }
    wait_until_online(&running.ctx, 1).await;
    wait_until_online(&running.ctx, 2).await;
    tai.write_all(&frame(inbound::TRADE_REQUEST, |w| {
        w.write_u32(sora_handle);
    }))
    .await
    .unwrap();
    read_packet(&mut sora).await.unwrap();

    drop(tai);

    let cancel = read_packet(&mut sora).await.unwrap();
    assert_eq!(cancel.type_id(), outbound::TRADE_CANCEL);
    for _ in 0..100 {
        if running.ctx.directory.find_by_character_id(1).await.is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(running.ctx.directory.find_by_character_id(1).await.is_none());
    assert!(running.ctx.trades.is_empty());
    running.server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_character_is_refused() {
    let running = start(MemoryStore::new(), test_config()).await;
    let mut stream = TcpStream::connect(running.addr).await.unwrap();
    stream
        .write_all(&frame(inbound::JOIN, |w| {
            w.write_i64(404);
        }))
        .await
        .unwrap();

    let reply = read_packet(&mut stream).await.unwrap();
    assert_eq!(reply.type_id(), outbound::SYSTEM_MESSAGE);
    assert!(read_packet(&mut stream).await.is_none());
    running.server.shutdown().await.unwrap();
}

#[tokio::test]
async fn zero_connection_limit_is_a_config_error() {
    let ctx = Arc::new(ServerContext::new(Arc::new(MemoryStore::new()), GameSettings::default()));
    let config = ServerConfig {
        max_connections: 0,
        ..Default::default()
    };
    let server = create_server(config, ctx).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    assert!(matches!(
        server.serve(listener).await,
        Err(game_server::ServerError::Config(_))
    ));
}
