//! Audio/video/data message handling for a publishing or playing session:
//! codec detection, sequence-header caching, GOP-cache maintenance, and
//! fan-out of live frames to subscribers. The publishing session's own task
//! is the only writer of its `PublishedStream` entry in the broker; a
//! subscriber only ever receives bytes through its `SessionHandle`, never by
//! another task reaching into its `Session`.

use std::sync::atomic::Ordering;

use crate::broker::{SessionHandle, SessionId};
use crate::chunk::{encode_type0_message, patch_message_stream_id};
use crate::protocol::constants::*;
use crate::protocol::{RtmpData, RtmpHeader, RtmpPacket};
use crate::session::Session;
use crate::Result;

impl Session {
    pub(crate) async fn handle_audio(&mut self, packet: RtmpPacket) -> Result<()> {
        if !self.is_publishing {
            return Ok(());
        }
        let info = self.audio_processor.process(&packet)?;
        let path = self.publish_path.clone().expect("publishing session always has a path");

        if info.is_sequence_header {
            let payload = packet.payload.clone();
            let _ = self
                .broker
                .mutate_publisher(&path, |p| p.audio_seq_header = Some(payload))
                .await;
        } else {
            let frame = packet.clone();
            let _ = self
                .broker
                .mutate_publisher(&path, |p| {
                    if p.gop_cache_enabled {
                        p.gop_cache.push(frame);
                    }
                })
                .await;
        }

        self.fan_out_media(&path, &packet, true).await
    }

    pub(crate) async fn handle_video(&mut self, packet: RtmpPacket) -> Result<()> {
        if !self.is_publishing {
            return Ok(());
        }
        let info = self.video_processor.process(&packet)?;
        let path = self.publish_path.clone().expect("publishing session always has a path");

        if info.is_sequence_header {
            let payload = packet.payload.clone();
            let _ = self
                .broker
                .mutate_publisher(&path, |p| p.video_seq_header = Some(payload))
                .await;
        } else {
            let frame = packet.clone();
            let is_keyframe = info.is_keyframe;
            let _ = self
                .broker
                .mutate_publisher(&path, |p| {
                    if !p.gop_cache_enabled {
                        return;
                    }
                    if is_keyframe {
                        p.gop_cache.start(frame);
                    } else {
                        p.gop_cache.push(frame);
                    }
                })
                .await;
        }

        self.fan_out_media(&path, &packet, false).await
    }

    pub(crate) async fn handle_data(&mut self, payload: &[u8]) -> Result<()> {
        if !self.is_publishing {
            return Ok(());
        }
        let data = match RtmpData::decode(payload) {
            Ok(d) => d,
            Err(_) => return Ok(()),
        };
        if data.data_type != "onMetaData" && data.data_type != "@setDataFrame" {
            return Ok(());
        }

        let path = self.publish_path.clone().expect("publishing session always has a path");
        let timestamp = self.started_at.elapsed().as_millis() as u32;
        let metadata = self.metadata_processor.process(&data, timestamp)?;

        // Re-encode rather than forward the raw bytes: normalizes a bare
        // `onMetaData` (no `@setDataFrame` wrapper) or one carrying
        // non-standard fields into the same canonical `onMetaData` message.
        let encoded = RtmpData::on_metadata(metadata.to_amf()).encode()?;

        let cached = encoded.clone();
        let _ = self.broker.mutate_publisher(&path, |p| p.metadata = Some(cached)).await;

        self.fan_out_data(&path, &encoded).await
    }

    /// Sends the cached metadata, AAC/AVC sequence headers, and buffered GOP
    /// in order to a newly subscribed player, on this player's own socket.
    /// Called right after `broker.add_subscriber` succeeds.
    pub(crate) async fn start_play(&mut self, path: &str) -> Result<()> {
        let handle = self.handle.clone();
        self.replay_to_handle(path, &handle).await
    }

    /// Sends the cached metadata, sequence headers, and buffered GOP for
    /// `path` to an arbitrary subscriber's socket, patching each chunk's
    /// message-stream-id to that subscriber's own. Used both for the
    /// subscriber's own join (`start_play`, from its own session task) and
    /// for idle players a publish just promoted into the subscriber set
    /// (driven by the *publishing* task, since the idle players have no
    /// task of their own running `start_play` at that moment).
    pub(crate) async fn replay_to_handle(&mut self, path: &str, handle: &SessionHandle) -> Result<()> {
        let snapshot = self
            .broker
            .mutate_publisher(path, |p| {
                (
                    p.metadata.clone(),
                    p.audio_seq_header.clone(),
                    p.video_seq_header.clone(),
                    p.gop_cache.frames().to_vec(),
                )
            })
            .await;
        let Some((metadata, audio_seq, video_seq, frames)) = snapshot else {
            return Ok(());
        };

        let stream_id = handle.play_stream_id.load(Ordering::Relaxed);
        let chunk_size = self.config.chunk_size as usize;

        if let Some(raw) = metadata {
            if let Ok(data) = RtmpData::decode(&raw) {
                let payload = data.encode()?;
                let header = RtmpHeader::data(0, payload.len() as u32, stream_id);
                let buf = encode_type0_message(&header, &payload, chunk_size);
                let _ = handle.write_bytes(&buf).await;
            }
        }
        if let Some(seq) = audio_seq {
            let header = RtmpHeader::audio(0, seq.len() as u32, stream_id);
            let buf = encode_type0_message(&header, &seq, chunk_size);
            let _ = handle.write_bytes(&buf).await;
        }
        if let Some(seq) = video_seq {
            let header = RtmpHeader::video(0, seq.len() as u32, stream_id);
            let buf = encode_type0_message(&header, &seq, chunk_size);
            let _ = handle.write_bytes(&buf).await;
        }
        for frame in frames {
            let header = RtmpHeader::new(
                frame.timestamp(),
                frame.payload.len() as u32,
                frame.header.message_type,
                stream_id,
                frame.header.chunk_stream_id,
            );
            let buf = encode_type0_message(&header, &frame.payload, chunk_size);
            let _ = handle.write_bytes(&buf).await;
        }

        Ok(())
    }

    /// Resends cached metadata and sequence headers without replaying the
    /// GOP, used when a paused player resumes so its decoder can pick back
    /// up on the live stream.
    pub(crate) async fn resend_sequence_headers(&mut self) -> Result<()> {
        let Some(path) = self.play_path.clone() else {
            return Ok(());
        };
        let snapshot = self
            .broker
            .mutate_publisher(&path, |p| {
                (p.metadata.clone(), p.audio_seq_header.clone(), p.video_seq_header.clone())
            })
            .await;
        let Some((metadata, audio_seq, video_seq)) = snapshot else {
            return Ok(());
        };
        self.replay_sequence_headers(metadata, audio_seq, video_seq).await
    }

    async fn replay_sequence_headers(
        &mut self,
        metadata: Option<Vec<u8>>,
        audio_seq: Option<Vec<u8>>,
        video_seq: Option<Vec<u8>>,
    ) -> Result<()> {
        if let Some(raw) = metadata {
            if let Ok(data) = RtmpData::decode(&raw) {
                self.write_data_message(data).await?;
            }
        }
        if let Some(seq) = audio_seq {
            let stream_id = self.play_stream_id;
            self.write_control_on_stream(MSG_TYPE_AUDIO, seq, stream_id).await?;
        }
        if let Some(seq) = video_seq {
            let stream_id = self.play_stream_id;
            self.write_control_on_stream(MSG_TYPE_VIDEO, seq, stream_id).await?;
        }
        Ok(())
    }

    /// Tears down `path`'s publisher entry and notifies every subscriber
    /// that it is no longer published, moving them into the idle set so a
    /// later `publish` on the same path picks them back up automatically
    /// (the new publisher's `on_publish` replays metadata/seq headers/GOP
    /// to each promoted idle player; see `replay_to_handle`).
    pub(crate) async fn notify_unpublish(&mut self, path: &str) {
        let Some(published) = self.broker.unpublish(path).await else {
            return;
        };
        if published.subscribers.is_empty() {
            return;
        }
        let ids: Vec<SessionId> = published.subscribers.into_iter().collect();
        let handles = self.broker.resolve_handles(&ids).await;
        for handle in handles {
            let stream_id = handle.play_stream_id.load(Ordering::Relaxed);
            let bytes = super::unpublish_notify_bytes(stream_id);
            let _ = handle.write_bytes(&bytes).await;
            handle.is_playing.store(false, Ordering::Relaxed);
        }
    }

    /// Fans a single audio/video frame out to every subscriber of `path`
    /// that is currently playing, not paused, and hasn't muted this media
    /// type via receiveAudio/receiveVideo. Bypasses `ChunkWriter`'s delta
    /// state entirely: one buffer is built and each subscriber only gets
    /// its own message-stream-id patched in before the write.
    async fn fan_out_media(&mut self, path: &str, packet: &RtmpPacket, is_audio: bool) -> Result<()> {
        let subscriber_ids = self
            .broker
            .mutate_publisher(path, |p| p.subscribers.iter().copied().collect::<Vec<_>>())
            .await
            .unwrap_or_default();
        if subscriber_ids.is_empty() {
            return Ok(());
        }

        let header = RtmpHeader::new(
            packet.timestamp(),
            packet.payload.len() as u32,
            packet.header.message_type,
            0,
            packet.header.chunk_stream_id,
        );
        let buf = encode_type0_message(&header, &packet.payload, self.config.chunk_size as usize);

        let handles = self.broker.resolve_handles(&subscriber_ids).await;
        for handle in handles {
            if !handle.is_playing.load(Ordering::Relaxed) || handle.is_paused.load(Ordering::Relaxed) {
                continue;
            }
            if is_audio && !handle.receive_audio.load(Ordering::Relaxed) {
                continue;
            }
            if !is_audio && !handle.receive_video.load(Ordering::Relaxed) {
                continue;
            }

            let mut out = buf.clone();
            patch_message_stream_id(&mut out, handle.play_stream_id.load(Ordering::Relaxed));
            let _ = handle.write_bytes(&out).await;
        }

        Ok(())
    }

    /// Fans a data (onMetaData/@setDataFrame) message out to every
    /// currently playing, unpaused subscriber of `path`.
    async fn fan_out_data(&mut self, path: &str, payload: &[u8]) -> Result<()> {
        let subscriber_ids = self
            .broker
            .mutate_publisher(path, |p| p.subscribers.iter().copied().collect::<Vec<_>>())
            .await
            .unwrap_or_default();
        if subscriber_ids.is_empty() {
            return Ok(());
        }

        let timestamp = self.started_at.elapsed().as_millis() as u32;
        let header = RtmpHeader::data(timestamp, payload.len() as u32, 0);
        let buf = encode_type0_message(&header, payload, self.config.chunk_size as usize);

        let handles = self.broker.resolve_handles(&subscriber_ids).await;
        for handle in handles {
            if !handle.is_playing.load(Ordering::Relaxed) || handle.is_paused.load(Ordering::Relaxed) {
                continue;
            }
            let mut out = buf.clone();
            patch_message_stream_id(&mut out, handle.play_stream_id.load(Ordering::Relaxed));
            let _ = handle.write_bytes(&out).await;
        }

        Ok(())
    }
}
