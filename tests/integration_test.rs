// End-to-end tests driving `RtmpServer` over real TCP sockets with the
// lightweight `TestClient` harness in `tests/common`: handshake, publish/play,
// GOP replay for late joiners, duplicate-publish rejection, publisher
// disconnect/re-idle, and pause/unpause.

mod common;

use common::*;
use rtmp::{RtmpServer, ServerConfig, MSG_TYPE_USER_CONTROL};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_server(port: u16) -> Arc<RtmpServer> {
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .max_connections(10)
        .build()
        .expect("failed to build server config");

    let server = Arc::new(RtmpServer::new(config));
    let spawned = server.clone();
    tokio::spawn(async move {
        let _ = spawned.listen().await;
    });

    for _ in 0..50 {
        if tokio::net::TcpStream::connect(format!("127.0.0.1:{}", port)).await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server
}

async fn connected_publisher(port: u16, app: &str, stream_name: &str) -> TestClient {
    let mut client = TestClient::connect(&format!("127.0.0.1:{}", port)).await;
    client.connect_app(app).await;
    assert_eq!(client.read_status_code().await, "NetConnection.Connect.Success");
    client.create_stream().await;
    let _create_stream_result = client.read_command().await;
    client.publish(stream_name).await;
    assert_eq!(client.read_status_code().await, "NetStream.Publish.Start");
    client
}

async fn connected_player(port: u16, app: &str) -> TestClient {
    let mut client = TestClient::connect(&format!("127.0.0.1:{}", port)).await;
    client.connect_app(app).await;
    assert_eq!(client.read_status_code().await, "NetConnection.Connect.Success");
    client.create_stream().await;
    let _create_stream_result = client.read_command().await;
    client
}

/// S1: basic publish/play. The player joins before the publisher sends any
/// media, so it receives every frame live, in order.
#[tokio::test]
async fn s1_basic_publish_and_play() {
    let port = 19460;
    let _server = spawn_server(port).await;

    let mut publisher = connected_publisher(port, "live", "stream1").await;

    let mut player = connected_player(port, "live").await;
    player.play("stream1").await;
    assert_eq!(player.read_status_code().await, "NetStream.Play.Reset");
    assert_eq!(player.read_status_code().await, "NetStream.Play.Start");
    let sample_access = player.read_command().await;
    assert_eq!(sample_access.name, "|RtmpSampleAccess");

    tokio::time::sleep(Duration::from_millis(50)).await;

    publisher.send_audio(generate_aac_sequence_header(), 0).await;
    publisher.send_video(generate_avc_sequence_header(), 0).await;
    publisher.send_video(generate_h264_keyframe(), 40).await;
    publisher.send_video(generate_h264_interframe(), 73).await;
    publisher.send_video(generate_h264_interframe(), 106).await;

    let aac_seq = player.read_message().await;
    assert_eq!(aac_seq.header.message_type, 8);
    assert_eq!(aac_seq.payload[1], 0x00); // AAC sequence header marker

    let avc_seq = player.read_message().await;
    assert_eq!(avc_seq.header.message_type, 9);
    assert_eq!(avc_seq.payload[1], 0x00); // AVC sequence header marker

    let idr = player.read_message().await;
    assert_eq!(idr.payload[0], 0x17);

    let p1 = player.read_message().await;
    assert_eq!(p1.payload[0], 0x27);
    let p2 = player.read_message().await;
    assert_eq!(p2.payload[0], 0x27);
}

/// S2: a player joining mid-stream must receive the cached sequence headers
/// and the buffered GOP before any new live frame.
#[tokio::test]
async fn s2_late_join_receives_gop_cache() {
    let port = 19461;
    let _server = spawn_server(port).await;

    let mut publisher = connected_publisher(port, "live", "stream1").await;

    publisher.send_audio(generate_aac_sequence_header(), 0).await;
    publisher.send_video(generate_avc_sequence_header(), 0).await;
    publisher.send_video(generate_h264_keyframe(), 40).await;
    publisher.send_video(generate_h264_interframe(), 73).await;
    publisher.send_video(generate_h264_interframe(), 106).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut player = connected_player(port, "live").await;
    player.play("stream1").await;
    assert_eq!(player.read_status_code().await, "NetStream.Play.Reset");
    assert_eq!(player.read_status_code().await, "NetStream.Play.Start");
    let _sample_access = player.read_command().await;

    let aac_seq = player.read_message().await;
    assert_eq!(aac_seq.header.message_type, 8);
    let avc_seq = player.read_message().await;
    assert_eq!(avc_seq.header.message_type, 9);
    assert_eq!(avc_seq.payload[1], 0x00);

    let idr = player.read_message().await;
    assert_eq!(idr.payload[0], 0x17);
    let p1 = player.read_message().await;
    assert_eq!(p1.payload[0], 0x27);
    let p2 = player.read_message().await;
    assert_eq!(p2.payload[0], 0x27);

    tokio::time::sleep(Duration::from_millis(50)).await;
    publisher.send_video(generate_h264_interframe(), 140).await;
    let p3 = player.read_message().await;
    assert_eq!(p3.header.timestamp, 140);
}

/// S3: a second publish attempt on an already-published path is rejected;
/// the incumbent publisher is left untouched.
#[tokio::test]
async fn s3_duplicate_publish_is_rejected() {
    let port = 19462;
    let _server = spawn_server(port).await;

    let _publisher = connected_publisher(port, "live", "stream1").await;

    let mut second = TestClient::connect(&format!("127.0.0.1:{}", port)).await;
    second.connect_app("live").await;
    assert_eq!(second.read_status_code().await, "NetConnection.Connect.Success");
    second.create_stream().await;
    let _ = second.read_command().await;
    second.publish("stream1").await;
    assert_eq!(second.read_status_code().await, "NetStream.Publish.BadName");
}

/// S4: when the publisher disconnects, its subscribers are notified and
/// re-idled; a later publish on the same path automatically promotes them
/// back to live, replaying cached state first.
#[tokio::test]
async fn s4_publisher_disconnect_then_republish_reconnects_player() {
    let port = 19463;
    let _server = spawn_server(port).await;

    let publisher = connected_publisher(port, "live", "stream1").await;

    let mut player = connected_player(port, "live").await;
    player.play("stream1").await;
    assert_eq!(player.read_status_code().await, "NetStream.Play.Reset");
    assert_eq!(player.read_status_code().await, "NetStream.Play.Start");
    let _sample_access = player.read_command().await;

    drop(publisher);
    assert_eq!(player.read_status_code().await, "NetStream.Play.UnpublishNotify");

    let mut republisher = connected_publisher(port, "live", "stream1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    republisher.send_audio(generate_aac_sequence_header(), 0).await;
    let aac_seq = player.read_message().await;
    assert_eq!(aac_seq.header.message_type, 8);
}

/// S5: a player that joined before any publisher existed sits idle, then
/// automatically transitions to live once a publisher appears.
#[tokio::test]
async fn s5_idle_join_before_publisher() {
    let port = 19464;
    let _server = spawn_server(port).await;

    let mut player = connected_player(port, "live").await;
    player.play("stream1").await;
    assert_eq!(player.read_status_code().await, "NetStream.Play.Reset");
    assert_eq!(player.read_status_code().await, "NetStream.Play.Start");
    let _sample_access = player.read_command().await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut publisher = connected_publisher(port, "live", "stream1").await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    publisher.send_video(generate_avc_sequence_header(), 0).await;
    let avc_seq = player.read_message().await;
    assert_eq!(avc_seq.header.message_type, 9);
    assert_eq!(avc_seq.payload[1], 0x00);

    publisher.send_video(generate_h264_keyframe(), 40).await;
    let idr = player.read_message().await;
    assert_eq!(idr.payload[0], 0x17);
}

/// S6: pause stops live delivery and is acknowledged; unpause resends
/// sequence headers before live frames resume.
#[tokio::test]
async fn s6_pause_and_unpause_round_trip() {
    let port = 19465;
    let _server = spawn_server(port).await;

    let mut publisher = connected_publisher(port, "live", "stream1").await;
    publisher.send_video(generate_avc_sequence_header(), 0).await;

    let mut player = connected_player(port, "live").await;
    player.play("stream1").await;
    assert_eq!(player.read_status_code().await, "NetStream.Play.Reset");
    assert_eq!(player.read_status_code().await, "NetStream.Play.Start");
    let _sample_access = player.read_command().await;
    let avc_seq = player.read_message().await;
    assert_eq!(avc_seq.header.message_type, 9);

    tokio::time::sleep(Duration::from_millis(50)).await;
    player.pause(true).await;
    assert_eq!(player.read_status_code().await, "NetStream.Pause.Notify");

    tokio::time::sleep(Duration::from_millis(50)).await;
    player.pause(false).await;

    let stream_begin = player.read_message().await;
    assert_eq!(stream_begin.header.message_type, MSG_TYPE_USER_CONTROL);

    let resent_avc_seq = player.read_message().await;
    assert_eq!(resent_avc_seq.header.message_type, 9);
    assert_eq!(resent_avc_seq.payload[1], 0x00);

    assert_eq!(player.read_status_code().await, "NetStream.Unpause.Notify");
}

/// Window Acknowledgement accounting: once the peer announces a Window
/// Acknowledgement Size, the server must send a type-3 Acknowledgement with
/// the running byte count once that many bytes have been read.
#[tokio::test]
async fn session_sends_ack_past_window_ack_size() {
    let port = 19467;
    let _server = spawn_server(port).await;

    let mut publisher = connected_publisher(port, "live", "stream1").await;

    // By the time connect/createStream/publish have round-tripped, the
    // session has already read well past this small window.
    publisher.send_window_ack_size(100).await;
    let acked = publisher.read_ack().await;
    assert!(acked >= 100, "ack count {acked} should be at least the window size");
}

#[tokio::test]
async fn server_respects_connection_limit() {
    let port = 19466;
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .max_connections(2)
        .build()
        .expect("failed to build config");

    let server = Arc::new(RtmpServer::new(config));
    let spawned = server.clone();
    tokio::spawn(async move {
        let _ = spawned.listen().await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let _a = TestClient::connect(&format!("127.0.0.1:{}", port)).await;
    let _b = TestClient::connect(&format!("127.0.0.1:{}", port)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.connection_count().await, 2);
}

#[test]
fn server_config_validation() {
    assert!(ServerConfig::builder().port(0).build().is_err(), "should reject port 0");
    assert!(ServerConfig::builder().chunk_size(100).build().is_err(), "should reject chunk size < 128");
    assert!(ServerConfig::builder().chunk_size(100_000).build().is_err(), "should reject chunk size > 65536");
    assert!(
        ServerConfig::builder().host("0.0.0.0").port(1935).chunk_size(4096).build().is_ok(),
        "should accept valid config"
    );
}
