//! Per-connection state machine: handshake, chunk-stream dispatch, command
//! handling, and media fan-out. One `Session` is spawned per accepted TCP
//! connection; its mutable state is touched only by its own task — the only
//! cross-session communication happens through the `Broker`.

mod commands;
mod media;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use uuid::Uuid;

use crate::broker::{Broker, BrokerEvent, SessionHandle, SessionId};
use crate::chunk::{ChunkReader, ChunkWriter};
use crate::handshake::{generate_s0s1s2_parts, validate_c0c1, validate_c2};
use crate::processing::{AudioProcessor, MetadataProcessor, VideoProcessor};
use crate::protocol::constants::*;
use crate::protocol::RtmpPacket;
use crate::server::ServerConfig;
use crate::{Error, Result};

pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) broker: Broker,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) handle: SessionHandle,

    pub(crate) chunk_reader: ChunkReader,
    pub(crate) chunk_writer: ChunkWriter,
    pub(crate) out_chunk_size: usize,

    /// Peer's requested Window Acknowledgement Size (message type 5), once
    /// received; `None` until then means the session doesn't yet owe the
    /// peer an Acknowledgement.
    pub(crate) ack_window_size: Option<u32>,
    /// Byte position (against `chunk_reader.bytes_read()`) at which the last
    /// Acknowledgement was sent.
    pub(crate) last_ack_pos: u64,

    pub(crate) app: Option<String>,
    pub(crate) is_connected: bool,
    pub(crate) next_stream_id: u32,

    pub(crate) is_publishing: bool,
    pub(crate) is_playing: bool,
    pub(crate) is_idling: bool,
    pub(crate) is_paused: bool,

    pub(crate) publish_path: Option<String>,
    pub(crate) publish_stream_id: u32,
    pub(crate) play_path: Option<String>,
    pub(crate) play_stream_id: u32,

    pub(crate) audio_processor: AudioProcessor,
    pub(crate) video_processor: VideoProcessor,
    pub(crate) metadata_processor: MetadataProcessor,

    pub(crate) started_at: Instant,
}

impl Session {
    /// Runs the full lifecycle of one accepted connection: handshake,
    /// steady-state dispatch loop, and cleanup. Returns once the socket is
    /// closed, errors, idles out, or the broker requests a stop.
    pub async fn run(
        stream: TcpStream,
        remote_addr: SocketAddr,
        config: Arc<ServerConfig>,
        broker: Broker,
    ) -> Result<()> {
        let (mut read_half, mut write_half) = stream.into_split();

        let mut c0c1_buf = vec![0u8; 1537];
        read_half
            .read_exact(&mut c0c1_buf)
            .await
            .map_err(|e| Error::handshake(format!("failed to read C0+C1: {}", e)))?;
        let c0c1 = validate_c0c1(&c0c1_buf)?;

        let s0s1s2 = generate_s0s1s2_parts(&c0c1)?;
        write_half
            .write_all(&s0s1s2.encode())
            .await
            .map_err(|e| Error::handshake(format!("failed to write S0/S1/S2: {}", e)))?;
        write_half.flush().await.map_err(Error::from)?;

        let mut c2_buf = vec![0u8; 1536];
        read_half
            .read_exact(&mut c2_buf)
            .await
            .map_err(|e| Error::handshake(format!("failed to read C2: {}", e)))?;
        validate_c2(&c2_buf, &s0s1s2)?;

        let id = Uuid::new_v4();
        debug!("session {} from {} completed handshake", id, remote_addr);

        let handle = SessionHandle::new(id, write_half);
        broker.register_session(handle.clone()).await;

        let mut session = Session {
            id,
            remote_addr,
            broker: broker.clone(),
            config: config.clone(),
            handle,
            chunk_reader: ChunkReader::new(),
            chunk_writer: ChunkWriter::new(),
            out_chunk_size: config.chunk_size as usize,
            ack_window_size: None,
            last_ack_pos: 0,
            app: None,
            is_connected: false,
            next_stream_id: 0,
            is_publishing: false,
            is_playing: false,
            is_idling: false,
            is_paused: false,
            publish_path: None,
            publish_stream_id: 0,
            play_path: None,
            play_stream_id: 0,
            audio_processor: AudioProcessor::new(),
            video_processor: VideoProcessor::new(),
            metadata_processor: MetadataProcessor::new(),
            started_at: Instant::now(),
        };

        session.chunk_writer.set_chunk_size(session.out_chunk_size);

        let result = session.dispatch_loop(&mut read_half).await;
        session.cleanup().await;
        result
    }

    async fn dispatch_loop(&mut self, read_half: &mut tokio::net::tcp::OwnedReadHalf) -> Result<()> {
        let idle_timeout = self.config.idle_timeout;
        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = self.handle.stop.notified() => {
                    info!("session {} stopped by server", self.id);
                    return Ok(());
                }
                _ = ping_interval.tick() => {
                    self.send_ping().await?;
                }
                packet = read_with_timeout(&mut self.chunk_reader, read_half, idle_timeout) => {
                    match packet? {
                        Some(packet) => self.handle_packet(packet).await?,
                        None => {
                            debug!("session {} connection closed by peer", self.id);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn send_ping(&mut self) -> Result<()> {
        if !self.is_connected {
            return Ok(());
        }
        let millis = self.started_at.elapsed().as_millis() as u32;
        let mut payload = Vec::with_capacity(6);
        payload.extend_from_slice(&6u16.to_be_bytes()); // event type 6 = PingRequest
        payload.extend_from_slice(&millis.to_be_bytes());
        self.write_control(MSG_TYPE_USER_CONTROL, payload).await
    }

    async fn handle_packet(&mut self, packet: RtmpPacket) -> Result<()> {
        match packet.message_type() {
            MSG_TYPE_SET_CHUNK_SIZE => {
                if packet.payload.len() >= 4 {
                    let size = u32::from_be_bytes([
                        packet.payload[0],
                        packet.payload[1],
                        packet.payload[2],
                        packet.payload[3],
                    ]);
                    self.chunk_reader.set_chunk_size(size as usize);
                }
            }
            MSG_TYPE_ABORT | MSG_TYPE_ACK | MSG_TYPE_SET_PEER_BW | MSG_TYPE_USER_CONTROL => {}
            MSG_TYPE_WINDOW_ACK => {
                if packet.payload.len() >= 4 {
                    let size = u32::from_be_bytes([
                        packet.payload[0],
                        packet.payload[1],
                        packet.payload[2],
                        packet.payload[3],
                    ]);
                    self.ack_window_size = Some(size);
                }
            }
            MSG_TYPE_AUDIO => self.handle_audio(packet).await?,
            MSG_TYPE_VIDEO => self.handle_video(packet).await?,
            MSG_TYPE_DATA_AMF0 => self.handle_data(&packet.payload).await?,
            MSG_TYPE_DATA_AMF3 => {
                if !packet.payload.is_empty() {
                    self.handle_data(&packet.payload[1..]).await?;
                }
            }
            MSG_TYPE_COMMAND_AMF0 => self.handle_command(&packet.payload).await?,
            MSG_TYPE_COMMAND_AMF3 => {
                if !packet.payload.is_empty() {
                    self.handle_command(&packet.payload[1..]).await?;
                }
            }
            MSG_TYPE_AGGREGATE => {}
            other => debug!("session {} ignoring unhandled message type {}", self.id, other),
        }
        self.maybe_send_ack().await
    }

    /// Sends a type-3 Acknowledgement once the running count of bytes read
    /// off the wire has advanced past the peer's negotiated Window
    /// Acknowledgement Size since the last Ack. Resets both the reader's
    /// running counter and `last_ack_pos` once the total nears the
    /// `0xF0000000` overflow boundary so the 4-byte wire counter never
    /// actually wraps.
    async fn maybe_send_ack(&mut self) -> Result<()> {
        let Some(window) = self.ack_window_size else {
            return Ok(());
        };
        let total = self.chunk_reader.bytes_read();
        if total.saturating_sub(self.last_ack_pos) < window as u64 {
            return Ok(());
        }

        self.write_control(MSG_TYPE_ACK, (total as u32).to_be_bytes().to_vec()).await?;
        self.last_ack_pos = total;

        if total >= 0xF000_0000 {
            self.chunk_reader.reset_bytes_read();
            self.last_ack_pos = 0;
        }
        Ok(())
    }

    /// Encodes and writes a single control/command message on this
    /// session's own chunk stream id 3, using the per-cid delta state kept
    /// by `ChunkWriter` (not the fan-out fast path, which bypasses delta
    /// encoding entirely).
    pub(crate) async fn write_control(&mut self, message_type: u8, payload: Vec<u8>) -> Result<()> {
        self.write_control_on_stream(message_type, payload, 0).await
    }

    /// Like `write_control`, but targets an explicit message-stream-id
    /// (NetStream status replies must be tagged with the stream id the
    /// client invoked `publish`/`play` on, not stream id 0).
    pub(crate) async fn write_control_on_stream(
        &mut self,
        message_type: u8,
        payload: Vec<u8>,
        stream_id: u32,
    ) -> Result<()> {
        let header = crate::protocol::RtmpHeader::new(
            self.started_at.elapsed().as_millis() as u32,
            payload.len() as u32,
            message_type,
            stream_id,
            if message_type == MSG_TYPE_COMMAND_AMF0 || message_type == MSG_TYPE_COMMAND_AMF3 {
                CHUNK_STREAM_COMMAND
            } else if message_type == MSG_TYPE_DATA_AMF0 || message_type == MSG_TYPE_DATA_AMF3 {
                CHUNK_STREAM_DATA
            } else {
                CHUNK_STREAM_PROTOCOL
            },
        );
        let packet = RtmpPacket::new(header, payload);
        let bytes = self.chunk_writer.create_chunks(&packet)?;
        self.handle
            .write_bytes(&bytes)
            .await
            .map_err(|e| Error::connection(format!("write failed: {}", e)))
    }

    pub(crate) async fn write_command(&mut self, command: &crate::protocol::RtmpCommand) -> Result<()> {
        let payload = command.encode()?;
        self.write_control(MSG_TYPE_COMMAND_AMF0, payload).await
    }

    pub(crate) async fn write_data_message(&mut self, data: crate::protocol::RtmpData) -> Result<()> {
        let payload = data.encode()?;
        self.write_control_on_stream(MSG_TYPE_DATA_AMF0, payload, self.play_stream_id).await
    }

    async fn cleanup(&mut self) {
        self.handle.request_stop();

        if let Some(path) = self.publish_path.take() {
            self.notify_unpublish(&path).await;
            self.broker.emit(BrokerEvent::DonePublish(self.id, path));
        }

        if let Some(path) = self.play_path.take() {
            self.broker.remove_subscriber(&path, self.id).await;
            self.broker.remove_idle(self.id).await;
            self.broker.emit(BrokerEvent::DonePlay(self.id, path));
        }

        self.broker.remove_session(self.id).await;
        if self.is_connected {
            self.broker.emit(BrokerEvent::DoneConnect(self.id));
        }
        info!("session {} from {} closed", self.id, self.remote_addr);
    }
}

/// Reads the next complete message from the socket, bounded by the idle
/// timeout. `Ok(None)` signals a clean EOF.
async fn read_with_timeout(
    reader: &mut ChunkReader,
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    timeout: Duration,
) -> Result<Option<RtmpPacket>> {
    match tokio::time::timeout(timeout, reader.read_chunk(read_half)).await {
        Ok(Ok(packet)) => Ok(packet),
        Ok(Err(e)) => {
            if is_eof(&e) {
                Ok(None)
            } else {
                Err(e)
            }
        }
        Err(_) => Err(Error::timeout("connection idle timeout")),
    }
}

fn is_eof(err: &Error) -> bool {
    match err {
        Error::Chunk(msg) => msg.to_lowercase().contains("eof"),
        Error::Io(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

/// A minimal NetStream.Play.UnpublishNotify + StreamEOF burst sent to a
/// publisher's subscribers on disconnect. Built without going through
/// `ChunkWriter`'s delta-encoding state since it targets another session's
/// fresh chunk stream id 3.
fn unpublish_notify_bytes(stream_id: u32) -> Vec<u8> {
    use crate::protocol::{RtmpCommand, RtmpHeader};

    let cmd = RtmpCommand::on_status(
        "status",
        "NetStream.Play.UnpublishNotify",
        "stream is no longer published",
    );
    let payload = cmd.encode().unwrap_or_default();
    let header = RtmpHeader::command(0, payload.len() as u32, stream_id);
    crate::chunk::encode_type0_message(&header, &payload, 128)
}
