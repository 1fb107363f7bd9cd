//! NetConnection/NetStream command dispatch: `connect`, `createStream`,
//! `publish`, `play`, `pause`, `deleteStream`/`closeStream`, and the
//! receiveAudio/receiveVideo gates.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use log::{debug, warn};

use crate::amf::{Amf0Object, Amf0Value};
use crate::broker::BrokerEvent;
use crate::protocol::constants::*;
use crate::protocol::RtmpCommand;
use crate::session::Session;
use crate::utils::calculate_hmac_sha256;
use crate::Result;

impl Session {
    pub(crate) async fn handle_command(&mut self, payload: &[u8]) -> Result<()> {
        let cmd = match RtmpCommand::decode(payload) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("session {} sent an unparseable command: {}", self.id, e);
                return Ok(());
            }
        };

        debug!("session {} command {}", self.id, cmd.name);

        match cmd.name.as_str() {
            "connect" => self.on_connect(cmd).await,
            "createStream" => self.on_create_stream(cmd).await,
            "publish" => self.on_publish(cmd).await,
            "play" => self.on_play(cmd).await,
            "pause" => self.on_pause(cmd).await,
            "deleteStream" | "closeStream" => self.on_delete_stream(cmd).await,
            "receiveAudio" => {
                let on = cmd.arguments.first().and_then(|v| v.as_boolean()).unwrap_or(true);
                self.handle.receive_audio.store(on, Ordering::Relaxed);
                Ok(())
            }
            "receiveVideo" => {
                let on = cmd.arguments.first().and_then(|v| v.as_boolean()).unwrap_or(true);
                self.handle.receive_video.store(on, Ordering::Relaxed);
                Ok(())
            }
            other => {
                debug!("session {} ignoring unhandled command {}", self.id, other);
                Ok(())
            }
        }
    }

    async fn on_connect(&mut self, cmd: RtmpCommand) -> Result<()> {
        let app = cmd
            .command_object
            .as_ref()
            .and_then(|obj| obj.get_property("app"))
            .and_then(|v| v.as_string())
            .unwrap_or("")
            .trim_start_matches('/')
            .to_string();

        self.app = Some(app.clone());
        self.broker.emit(BrokerEvent::PreConnect(self.id));

        self.write_control(MSG_TYPE_WINDOW_ACK, self.config.window_ack_size.to_be_bytes().to_vec())
            .await?;

        let mut peer_bw = self.config.peer_bandwidth.to_be_bytes().to_vec();
        peer_bw.push(2); // limit type 2 = dynamic
        self.write_control(MSG_TYPE_SET_PEER_BW, peer_bw).await?;

        self.write_control(MSG_TYPE_SET_CHUNK_SIZE, (self.out_chunk_size as u32).to_be_bytes().to_vec())
            .await?;

        let mut props = Amf0Object::new();
        props.insert("fmsVer".to_string(), Amf0Value::String("FMS/3,0,1,123".to_string()));
        props.insert("capabilities".to_string(), Amf0Value::Number(31.0));

        let mut info = Amf0Object::new();
        info.insert("level".to_string(), Amf0Value::String("status".to_string()));
        info.insert(
            "code".to_string(),
            Amf0Value::String("NetConnection.Connect.Success".to_string()),
        );
        info.insert(
            "description".to_string(),
            Amf0Value::String("Connection succeeded.".to_string()),
        );
        info.insert("objectEncoding".to_string(), Amf0Value::Number(0.0));

        let mut result = RtmpCommand::new("_result".to_string(), cmd.transaction_id);
        result.command_object = Some(Amf0Value::Object(props));
        result.arguments.push(Amf0Value::Object(info));
        self.write_command(&result).await?;

        self.is_connected = true;
        self.broker.emit(BrokerEvent::PostConnect(self.id));
        Ok(())
    }

    async fn on_create_stream(&mut self, cmd: RtmpCommand) -> Result<()> {
        self.next_stream_id += 1;
        let result = RtmpCommand::result(cmd.transaction_id, Amf0Value::Number(self.next_stream_id as f64));
        self.write_command(&result).await
    }

    async fn on_publish(&mut self, cmd: RtmpCommand) -> Result<()> {
        let stream_name = match cmd.arguments.first().and_then(|v| v.as_string()) {
            Some(s) => s.to_string(),
            // Known buggy Wirecast behaviour: streamName arrives as something
            // other than a string. Silently ignore rather than error out.
            None => return Ok(()),
        };

        let app = self.app.clone().unwrap_or_default();
        let (name, args) = split_stream_path(&stream_name);
        let path = format!("/{}/{}", app, name);

        self.broker.emit(BrokerEvent::PrePublish(self.id, path.clone()));
        self.publish_stream_id = self.next_stream_id;

        if self.config.auth_publish && !self.is_trusted_peer() && !verify_auth(&args, &path, &self.config.auth_secret)
        {
            self.send_publish_status("error", "NetStream.publish.Unauthorized", "Authentication failed.")
                .await?;
            return Ok(());
        }

        match self
            .broker
            .publish(&path, self.id, self.config.gop_cache_enabled, self.config.gop_cache_size)
            .await
        {
            Ok(waiting) => {
                self.is_publishing = true;
                self.publish_path = Some(path.clone());
                self.send_publish_status("status", "NetStream.Publish.Start", &format!("{} is now published.", path))
                    .await?;

                for waiting_id in waiting {
                    if let Some(handle) = self.broker.get_session(waiting_id).await {
                        self.replay_to_handle(&path, &handle).await?;
                        handle.is_playing.store(true, Ordering::Relaxed);
                    }
                }

                // Delayed so listeners observe the publisher's codec fields
                // once at least one media frame has actually arrived, rather
                // than at the instant publishing starts.
                let broker = self.broker.clone();
                let session_id = self.id;
                tokio::spawn(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    broker.emit(BrokerEvent::PostPublish(session_id, path));
                });
            }
            Err(()) => {
                self.send_publish_status(
                    "error",
                    "NetStream.Publish.BadName",
                    &format!("{} is already published.", path),
                )
                .await?;
            }
        }

        Ok(())
    }

    async fn on_play(&mut self, cmd: RtmpCommand) -> Result<()> {
        let stream_name = match cmd.arguments.first().and_then(|v| v.as_string()) {
            Some(s) => s.to_string(),
            None => return Ok(()),
        };

        if self.is_playing {
            self.send_play_status("error", "NetStream.Play.BadConnection", "Already playing a stream.")
                .await?;
            return Ok(());
        }

        let app = self.app.clone().unwrap_or_default();
        let (name, args) = split_stream_path(&stream_name);
        let path = format!("/{}/{}", app, name);

        self.broker.emit(BrokerEvent::PrePlay(self.id, path.clone()));
        self.play_stream_id = self.next_stream_id;
        self.handle.play_stream_id.store(self.play_stream_id, Ordering::Relaxed);

        if self.config.auth_play && !self.is_trusted_peer() && !verify_auth(&args, &path, &self.config.auth_secret) {
            self.send_play_status("error", "NetStream.play.Unauthorized", "Authentication failed.")
                .await?;
            return Ok(());
        }

        self.write_control(MSG_TYPE_USER_CONTROL, user_control_event(0, self.play_stream_id))
            .await?; // StreamBegin
        self.send_play_status("status", "NetStream.Play.Reset", &format!("Playing and resetting {}.", path))
            .await?;
        self.send_play_status("status", "NetStream.Play.Start", &format!("Started playing {}.", path))
            .await?;
        self.write_data_message(sample_access_message()).await?;

        self.is_playing = true;
        self.handle.is_playing.store(true, Ordering::Relaxed);
        self.play_path = Some(path.clone());

        if self.broker.add_subscriber(&path, self.id).await {
            self.start_play(&path).await?;
        } else {
            self.is_idling = true;
            self.broker.add_idle(self.id, &path).await;
        }

        self.broker.emit(BrokerEvent::PostPlay(self.id, path));
        Ok(())
    }

    async fn on_pause(&mut self, cmd: RtmpCommand) -> Result<()> {
        let pause = cmd.arguments.first().and_then(|v| v.as_boolean()).unwrap_or(false);
        self.is_paused = pause;
        self.handle.is_paused.store(pause, Ordering::Relaxed);

        if pause {
            self.write_control(MSG_TYPE_USER_CONTROL, user_control_event(1, self.play_stream_id))
                .await?; // StreamEOF
            self.send_play_status("status", "NetStream.Pause.Notify", "Paused stream.").await?;
        } else {
            self.write_control(MSG_TYPE_USER_CONTROL, user_control_event(0, self.play_stream_id))
                .await?; // StreamBegin
            self.resend_sequence_headers().await?;
            self.send_play_status("status", "NetStream.Unpause.Notify", "Unpaused stream.").await?;
        }

        Ok(())
    }

    async fn on_delete_stream(&mut self, cmd: RtmpCommand) -> Result<()> {
        let stream_id = cmd.arguments.first().and_then(|v| v.as_number()).unwrap_or(0.0) as u32;

        if stream_id != 0 && stream_id == self.play_stream_id {
            if let Some(path) = self.play_path.take() {
                self.broker.remove_subscriber(&path, self.id).await;
                self.broker.remove_idle(self.id).await;
                self.is_playing = false;
                self.is_idling = false;
                self.handle.is_playing.store(false, Ordering::Relaxed);
                self.broker.emit(BrokerEvent::DonePlay(self.id, path));
            }
            self.send_play_status("status", "NetStream.Play.Stop", "Stopped playing.").await?;
        }

        if stream_id != 0 && stream_id == self.publish_stream_id {
            if let Some(path) = self.publish_path.take() {
                self.notify_unpublish(&path).await;
                self.is_publishing = false;
                self.broker.emit(BrokerEvent::DonePublish(self.id, path));
            }
        }

        Ok(())
    }

    /// Localhost peers (IPv4 127.0.0.1, IPv6 ::1, and the IPv4-mapped IPv6
    /// form ::ffff:127.0.0.1 a dual-stack listener may hand out) are exempt
    /// from auth.
    fn is_trusted_peer(&self) -> bool {
        match self.remote_addr.ip() {
            std::net::IpAddr::V4(v4) => v4.is_loopback(),
            std::net::IpAddr::V6(v6) => {
                v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
            }
        }
    }

    pub(crate) async fn send_publish_status(&mut self, level: &str, code: &str, description: &str) -> Result<()> {
        let cmd = RtmpCommand::on_status(level, code, description);
        let payload = cmd.encode()?;
        self.write_control_on_stream(MSG_TYPE_COMMAND_AMF0, payload, self.publish_stream_id).await
    }

    pub(crate) async fn send_play_status(&mut self, level: &str, code: &str, description: &str) -> Result<()> {
        let cmd = RtmpCommand::on_status(level, code, description);
        let payload = cmd.encode()?;
        self.write_control_on_stream(MSG_TYPE_COMMAND_AMF0, payload, self.play_stream_id).await
    }
}

/// Splits `name?k=v&...` into (name, parsed query args).
fn split_stream_path(raw: &str) -> (String, HashMap<String, String>) {
    match raw.split_once('?') {
        Some((name, query)) => {
            let args = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect::<HashMap<String, String>>();
            (name.to_string(), args)
        }
        None => (raw.to_string(), HashMap::new()),
    }
}

/// `sign = hex(hmac_sha256(secret, path))`. Not part of the wire protocol;
/// a deliberately simple stand-in for whatever external verifier a real
/// deployment would plug in (see DESIGN.md).
fn verify_auth(args: &HashMap<String, String>, path: &str, secret: &str) -> bool {
    if secret.is_empty() {
        return true;
    }
    let Some(sign) = args.get("sign") else {
        return false;
    };
    let expected = calculate_hmac_sha256(secret.as_bytes(), path.as_bytes());
    let expected_hex: String = expected.iter().map(|b| format!("{:02x}", b)).collect();
    expected_hex == *sign
}

fn user_control_event(event_type: u16, stream_id: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(6);
    payload.extend_from_slice(&event_type.to_be_bytes());
    payload.extend_from_slice(&stream_id.to_be_bytes());
    payload
}

fn sample_access_message() -> crate::protocol::RtmpData {
    let mut data = crate::protocol::RtmpData::new("|RtmpSampleAccess".to_string());
    data.values.push(Amf0Value::Boolean(false));
    data.values.push(Amf0Value::Boolean(false));
    data
}
