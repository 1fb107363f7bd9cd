// Shared test harness: raw RTMP client driven over a real TCP socket against
// a live `RtmpServer`, using the crate's own handshake/chunk/AMF modules
// instead of a dedicated client type (this crate is server-only).

use rtmp::{
    ChunkReader, ChunkWriter, RtmpCommand, RtmpHeader, RtmpPacket, C0C1, C2, S0S1S2,
    CHUNK_STREAM_PROTOCOL, MSG_TYPE_ABORT, MSG_TYPE_ACK, MSG_TYPE_COMMAND_AMF0, MSG_TYPE_COMMAND_AMF3,
    MSG_TYPE_SET_CHUNK_SIZE, MSG_TYPE_SET_PEER_BW, MSG_TYPE_WINDOW_ACK,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A minimal RTMP client used only by tests: performs the handshake, sends
/// commands/media, and decodes whatever comes back, ignoring the protocol
/// control messages (window ack, set chunk size, ...) a real player would
/// also just apply and move past.
pub struct TestClient {
    stream: TcpStream,
    writer: ChunkWriter,
    reader: ChunkReader,
    transaction_id: f64,
}

impl TestClient {
    pub async fn connect(addr: &str) -> Self {
        let mut stream = TcpStream::connect(addr).await.expect("connect to test server");

        let c0c1 = C0C1::create_client();
        stream.write_all(&c0c1.encode()).await.expect("write C0+C1");
        stream.flush().await.unwrap();

        let mut response = vec![0u8; 1 + 1536 * 2];
        stream.read_exact(&mut response).await.expect("read S0+S1+S2");
        let s0s1s2 = S0S1S2::parse(&response).expect("parse S0+S1+S2");

        let c2 = C2::create_from_s1(&s0s1s2);
        stream.write_all(&c2.encode()).await.expect("write C2");
        stream.flush().await.unwrap();

        TestClient {
            stream,
            writer: ChunkWriter::new(),
            reader: ChunkReader::new(),
            transaction_id: 1.0,
        }
    }

    fn next_transaction_id(&mut self) -> f64 {
        self.transaction_id += 1.0;
        self.transaction_id
    }

    async fn send_command(&mut self, cmd: &RtmpCommand, stream_id: u32) {
        let payload = cmd.encode().expect("encode command");
        let header = RtmpHeader::command(0, payload.len() as u32, stream_id);
        let packet = RtmpPacket::new(header, payload);
        self.writer.write_packet(&packet, &mut self.stream).await.expect("write command");
    }

    pub async fn connect_app(&mut self, app: &str) {
        let cmd = RtmpCommand::connect(app, &format!("rtmp://127.0.0.1/{}", app));
        self.send_command(&cmd, 0).await;
    }

    pub async fn create_stream(&mut self) -> f64 {
        let tid = self.next_transaction_id();
        let cmd = RtmpCommand::create_stream(tid);
        self.send_command(&cmd, 0).await;
        tid
    }

    pub async fn publish(&mut self, stream_name: &str) {
        let cmd = RtmpCommand::publish(stream_name, "live");
        self.send_command(&cmd, 1).await;
    }

    pub async fn play(&mut self, stream_name: &str) {
        let cmd = RtmpCommand::play(stream_name, -2.0, -1.0, true);
        self.send_command(&cmd, 1).await;
    }

    pub async fn pause(&mut self, pause: bool) {
        let mut cmd = RtmpCommand::new("pause".to_string(), 0.0);
        cmd.arguments.push(rtmp::Amf0Value::Boolean(pause));
        self.send_command(&cmd, 1).await;
    }

    pub async fn send_audio(&mut self, payload: Vec<u8>, timestamp: u32) {
        let header = RtmpHeader::audio(timestamp, payload.len() as u32, 1);
        let packet = RtmpPacket::new(header, payload);
        self.writer.write_packet(&packet, &mut self.stream).await.expect("write audio");
    }

    pub async fn send_video(&mut self, payload: Vec<u8>, timestamp: u32) {
        let header = RtmpHeader::video(timestamp, payload.len() as u32, 1);
        let packet = RtmpPacket::new(header, payload);
        self.writer.write_packet(&packet, &mut self.stream).await.expect("write video");
    }

    /// Sends a Window Acknowledgement Size (message type 5) announcing the
    /// byte window after which the server should Ack how much it has read.
    pub async fn send_window_ack_size(&mut self, size: u32) {
        let header = RtmpHeader::new(0, 4, MSG_TYPE_WINDOW_ACK, 0, CHUNK_STREAM_PROTOCOL);
        let packet = RtmpPacket::new(header, size.to_be_bytes().to_vec());
        self.writer.write_packet(&packet, &mut self.stream).await.expect("write window ack size");
    }

    /// Reads messages until a type-3 Acknowledgement arrives, transparently
    /// applying (and swallowing) the other protocol control messages, and
    /// returns the acknowledged byte count.
    pub async fn read_ack(&mut self) -> u32 {
        loop {
            let packet = self
                .reader
                .read_chunk(&mut self.stream)
                .await
                .expect("read chunk")
                .expect("connection closed unexpectedly");

            match packet.header.message_type {
                MSG_TYPE_SET_CHUNK_SIZE if packet.payload.len() >= 4 => {
                    let size = u32::from_be_bytes([
                        packet.payload[0],
                        packet.payload[1],
                        packet.payload[2],
                        packet.payload[3],
                    ]);
                    self.reader.set_chunk_size(size as usize);
                }
                MSG_TYPE_ACK if packet.payload.len() >= 4 => {
                    return u32::from_be_bytes([
                        packet.payload[0],
                        packet.payload[1],
                        packet.payload[2],
                        packet.payload[3],
                    ]);
                }
                MSG_TYPE_WINDOW_ACK | MSG_TYPE_SET_PEER_BW | MSG_TYPE_ABORT => {}
                _ => {}
            }
        }
    }

    /// Reads the next message off the wire, transparently applying (and
    /// swallowing) the protocol control messages a real player's session
    /// layer would also just apply without surfacing to the application.
    pub async fn read_message(&mut self) -> RtmpPacket {
        loop {
            let packet = self
                .reader
                .read_chunk(&mut self.stream)
                .await
                .expect("read chunk")
                .expect("connection closed unexpectedly");

            match packet.header.message_type {
                MSG_TYPE_SET_CHUNK_SIZE if packet.payload.len() >= 4 => {
                    let size = u32::from_be_bytes([
                        packet.payload[0],
                        packet.payload[1],
                        packet.payload[2],
                        packet.payload[3],
                    ]);
                    self.reader.set_chunk_size(size as usize);
                }
                MSG_TYPE_WINDOW_ACK | MSG_TYPE_SET_PEER_BW | MSG_TYPE_ABORT | MSG_TYPE_ACK => {}
                _ => return packet,
            }
        }
    }

    /// Reads the next message and decodes it as an AMF0/AMF3 command,
    /// skipping the AMF3 type-switch prefix byte when present.
    pub async fn read_command(&mut self) -> RtmpCommand {
        let packet = self.read_message().await;
        let payload = if packet.header.message_type == MSG_TYPE_COMMAND_AMF3 {
            &packet.payload[1..]
        } else {
            assert_eq!(packet.header.message_type, MSG_TYPE_COMMAND_AMF0, "expected a command message");
            &packet.payload[..]
        };
        RtmpCommand::decode(payload).expect("decode command")
    }

    /// Reads the next message and asserts it is a command carrying an
    /// `onStatus`-style status info object; returns its `code`.
    pub async fn read_status_code(&mut self) -> String {
        let cmd = self.read_command().await;
        cmd.arguments
            .iter()
            .find_map(|v| v.get_property("code").and_then(|c| c.as_string()))
            .map(|s| s.to_string())
            .unwrap_or_else(|| panic!("command {} carried no status code", cmd.name))
    }
}

/// Create a test video packet with specified timestamp
pub fn create_test_video_packet(timestamp: u32, is_keyframe: bool) -> RtmpPacket {
    let message_type = 9; // Video message type
    let stream_id = 1;
    let chunk_stream_id = 6; // Video chunk stream

    let mut payload = Vec::new();
    if is_keyframe {
        payload.push(0x17); // keyframe + AVC
    } else {
        payload.push(0x27); // inter-frame + AVC
    }
    payload.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);

    let header = RtmpHeader::new(timestamp, payload.len() as u32, message_type, stream_id, chunk_stream_id);
    RtmpPacket::new(header, payload)
}

/// Create a test audio packet with specified timestamp
pub fn create_test_audio_packet(timestamp: u32) -> RtmpPacket {
    let message_type = 8; // Audio message type
    let stream_id = 1;
    let chunk_stream_id = 4; // Audio chunk stream

    let payload = vec![0xAF, 0x01]; // AAC, raw packet

    let header = RtmpHeader::new(timestamp, payload.len() as u32, message_type, stream_id, chunk_stream_id);
    RtmpPacket::new(header, payload)
}

/// Compare two RTMP packets for equality
pub fn assert_packet_equal(a: &RtmpPacket, b: &RtmpPacket) {
    assert_eq!(a.header.timestamp, b.header.timestamp, "Timestamps don't match");
    assert_eq!(a.header.message_type, b.header.message_type, "Message types don't match");
    assert_eq!(a.header.message_stream_id, b.header.message_stream_id, "Stream IDs don't match");
    assert_eq!(a.payload, b.payload, "Payloads don't match");
}

/// Generate test video frame data (keyframe / AVC sequence header marker)
pub fn generate_h264_keyframe() -> Vec<u8> {
    vec![
        0x17, // Frame type (1=keyframe) + codec (7=AVC)
        0x01, // AVC packet type (1=NALU)
        0x00, 0x00, 0x00, // Composition time
        0x00, 0x00, 0x00, 0x01, // Start code
        0x67, // SPS NAL unit type
    ]
}

/// Generate test video frame data (inter-frame)
pub fn generate_h264_interframe() -> Vec<u8> {
    vec![
        0x27, // Frame type (2=inter) + codec (7=AVC)
        0x01, // AVC packet type (1=NALU)
        0x00, 0x00, 0x00, // Composition time
        0x00, 0x00, 0x00, 0x01, // Start code
        0x41, // Coded slice NAL unit type
    ]
}

/// Generate a minimal AVC sequence header (AVCDecoderConfigurationRecord)
pub fn generate_avc_sequence_header() -> Vec<u8> {
    vec![
        0x17, // keyframe + AVC
        0x00, // AVC packet type 0 = sequence header
        0x00, 0x00, 0x00,
        0x01, 0x42, 0x00, 0x1e, // configurationVersion, AVCProfileIndication, profile_compat, level
        0xff, 0xe1, 0x00, 0x00, // lengthSizeMinusOne | reserved, numOfSPS | reserved, sps length
    ]
}

/// Generate a minimal AAC sequence header (AudioSpecificConfig)
pub fn generate_aac_sequence_header() -> Vec<u8> {
    vec![0xAF, 0x00, 0x12, 0x10]
}

/// Generate test AAC audio data
pub fn generate_aac_audio() -> Vec<u8> {
    vec![0xAF, 0x01, 0x00, 0x00]
}

/// Create a simple test server configuration for testing
pub fn test_server_config(port: u16) -> rtmp::ServerConfig {
    rtmp::ServerConfig::builder()
        .host("127.0.0.1")
        .port(port)
        .max_connections(10)
        .chunk_size(4096)
        .build()
        .expect("Failed to create test server config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_video_packet() {
        let packet = create_test_video_packet(1000, true);
        assert_eq!(packet.header.timestamp, 1000);
        assert_eq!(packet.header.message_type, 9);
        assert!(!packet.payload.is_empty());
        assert_eq!(packet.payload[0], 0x17);
    }

    #[test]
    fn test_create_audio_packet() {
        let packet = create_test_audio_packet(2000);
        assert_eq!(packet.header.timestamp, 2000);
        assert_eq!(packet.header.message_type, 8);
        assert_eq!(packet.payload[0], 0xAF);
    }

    #[test]
    fn test_packet_equality() {
        let packet1 = create_test_video_packet(1000, true);
        let packet2 = create_test_video_packet(1000, true);
        assert_packet_equal(&packet1, &packet2);
    }

    #[test]
    fn test_h264_generation() {
        assert_eq!(generate_h264_keyframe()[0], 0x17);
        assert_eq!(generate_h264_interframe()[0], 0x27);
    }

    #[test]
    fn test_aac_generation() {
        assert_eq!(generate_aac_audio()[0], 0xAF);
    }
}
