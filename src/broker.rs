//! Process-wide registries shared across sessions: who is connected, who is
//! publishing which path, who is waiting idle for a publisher to appear,
//! and a lifecycle event bus. Modeled as an explicit value (not a global)
//! so tests can stand up independent brokers, following the `Arc<RwLock<..>>`
//! registry idiom already used by the connection-accounting side of this
//! crate (see `server::config` for the sibling config type).

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use uuid::Uuid;

use crate::stream::GopCache;

pub type SessionId = Uuid;

#[derive(Debug, Clone)]
pub enum BrokerEvent {
    PreConnect(SessionId),
    PostConnect(SessionId),
    DoneConnect(SessionId),
    PrePublish(SessionId, String),
    PostPublish(SessionId, String),
    DonePublish(SessionId, String),
    PrePlay(SessionId, String),
    PostPlay(SessionId, String),
    DonePlay(SessionId, String),
}

/// Per-session state that is read or written from outside the session's
/// own task: the publishing task during fan-out, and the server during
/// shutdown. Everything else about a session lives on the `Session` value
/// itself and is touched only by the session's own task.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    write: Arc<Mutex<OwnedWriteHalf>>,
    pub is_playing: Arc<AtomicBool>,
    pub is_paused: Arc<AtomicBool>,
    pub receive_audio: Arc<AtomicBool>,
    pub receive_video: Arc<AtomicBool>,
    pub play_stream_id: Arc<AtomicU32>,
    pub stop: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(id: SessionId, write: OwnedWriteHalf) -> Self {
        SessionHandle {
            id,
            write: Arc::new(Mutex::new(write)),
            is_playing: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
            receive_audio: Arc::new(AtomicBool::new(true)),
            receive_video: Arc::new(AtomicBool::new(true)),
            play_stream_id: Arc::new(AtomicU32::new(0)),
            stop: Arc::new(Notify::new()),
        }
    }

    /// Writes raw bytes to this session's socket. Serialized by the
    /// per-session mutex so bytes from the fan-out task and bytes from the
    /// session's own control-message replies never interleave.
    pub async fn write_bytes(&self, data: &[u8]) -> std::io::Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut w = self.write.lock().await;
        w.write_all(data).await?;
        w.flush().await
    }

    pub fn request_stop(&self) {
        self.stop.notify_waiters();
    }
}

/// A live publisher's fan-out state. Owned by the broker; mutated only by
/// the publishing session's own task per the concurrency model (the
/// publisher task is the sole writer of its own subscriber set and GOP
/// cache; other sessions only read it indirectly through broker calls).
pub struct PublishedStream {
    pub publisher: SessionId,
    pub subscribers: HashSet<SessionId>,
    pub metadata: Option<Vec<u8>>,
    pub audio_seq_header: Option<Vec<u8>>,
    pub video_seq_header: Option<Vec<u8>>,
    pub gop_cache: GopCache,
    pub gop_cache_enabled: bool,
}

impl PublishedStream {
    fn new(publisher: SessionId, gop_cache_enabled: bool, gop_cache_size: usize) -> Self {
        PublishedStream {
            publisher,
            subscribers: HashSet::new(),
            metadata: None,
            audio_seq_header: None,
            video_seq_header: None,
            gop_cache: GopCache::new(gop_cache_size),
            gop_cache_enabled,
        }
    }
}

struct BrokerInner {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    publishers: RwLock<HashMap<String, PublishedStream>>,
    /// Session id -> path it's waiting to play, for players with no
    /// publisher yet. Path-keyed so `publish` only moves players that were
    /// actually waiting for the path being published.
    idle_players: RwLock<HashMap<SessionId, String>>,
    ip_counts: RwLock<HashMap<IpAddr, usize>>,
    events: broadcast::Sender<BrokerEvent>,
}

#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Broker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Broker {
            inner: Arc::new(BrokerInner {
                sessions: RwLock::new(HashMap::new()),
                publishers: RwLock::new(HashMap::new()),
                idle_players: RwLock::new(HashMap::new()),
                ip_counts: RwLock::new(HashMap::new()),
                events,
            }),
        }
    }

    pub fn on(&self) -> broadcast::Receiver<BrokerEvent> {
        self.inner.events.subscribe()
    }

    pub fn emit(&self, event: BrokerEvent) {
        let _ = self.inner.events.send(event);
    }

    pub async fn register_session(&self, handle: SessionHandle) {
        self.inner.sessions.write().await.insert(handle.id, handle);
    }

    pub async fn get_session(&self, id: SessionId) -> Option<SessionHandle> {
        self.inner.sessions.read().await.get(&id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Removes a session from every registry it might belong to. If it was
    /// a publisher, its path is dropped and its subscribers are re-idled;
    /// the emptied `PublishedStream` is returned so the caller can notify
    /// those subscribers. Idempotent: a second call on an already-removed
    /// id is a no-op.
    pub async fn remove_session(&self, id: SessionId) -> Option<(String, PublishedStream)> {
        self.inner.sessions.write().await.remove(&id);
        self.inner.idle_players.write().await.remove(&id);

        let mut publishers = self.inner.publishers.write().await;
        let owned_path = publishers
            .iter()
            .find(|(_, p)| p.publisher == id)
            .map(|(path, _)| path.clone());

        if let Some(path) = owned_path {
            let published = publishers.remove(&path).expect("path just matched above");
            drop(publishers);
            let mut idle = self.inner.idle_players.write().await;
            for sub in &published.subscribers {
                idle.insert(*sub, path.clone());
            }
            return Some((path, published));
        }

        // If this session was itself a subscriber somewhere, remove it.
        for published in publishers.values_mut() {
            published.subscribers.remove(&id);
        }
        None
    }

    pub async fn track_ip(&self, ip: IpAddr) {
        *self.inner.ip_counts.write().await.entry(ip).or_insert(0) += 1;
    }

    pub async fn untrack_ip(&self, ip: IpAddr) {
        let mut counts = self.inner.ip_counts.write().await;
        if let Some(count) = counts.get_mut(&ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&ip);
            }
        }
    }

    pub async fn can_accept_from_ip(&self, ip: IpAddr, limit: usize) -> bool {
        self.inner.ip_counts.read().await.get(&ip).copied().unwrap_or(0) < limit
    }

    /// Registers `publisher` as the owner of `path`. Returns the set of
    /// idle players waiting on this path, now moved into the new
    /// publisher's subscriber set, or `Err(())` if the path is already
    /// published.
    pub async fn publish(
        &self,
        path: &str,
        publisher: SessionId,
        gop_cache_enabled: bool,
        gop_cache_size: usize,
    ) -> Result<Vec<SessionId>, ()> {
        let mut publishers = self.inner.publishers.write().await;
        if publishers.contains_key(path) {
            return Err(());
        }
        let mut published = PublishedStream::new(publisher, gop_cache_enabled, gop_cache_size);

        let mut idle = self.inner.idle_players.write().await;
        let waiting: Vec<SessionId> = idle
            .iter()
            .filter(|(_, p)| p.as_str() == path)
            .map(|(id, _)| *id)
            .collect();
        for id in &waiting {
            idle.remove(id);
            published.subscribers.insert(*id);
        }
        drop(idle);

        publishers.insert(path.to_string(), published);
        Ok(waiting)
    }

    /// Removes `path`'s publisher entry, returning it so the caller can
    /// notify its subscribers before they're dropped into the idle set by
    /// `remove_session`/`leave_publisher`.
    pub async fn unpublish(&self, path: &str) -> Option<PublishedStream> {
        let mut publishers = self.inner.publishers.write().await;
        let published = publishers.remove(path)?;
        drop(publishers);
        let mut idle = self.inner.idle_players.write().await;
        for sub in &published.subscribers {
            idle.insert(*sub, path.to_string());
        }
        Some(published)
    }

    pub async fn add_idle(&self, id: SessionId, path: &str) {
        self.inner.idle_players.write().await.insert(id, path.to_string());
    }

    pub async fn remove_idle(&self, id: SessionId) {
        self.inner.idle_players.write().await.remove(&id);
    }

    pub async fn add_subscriber(&self, path: &str, subscriber: SessionId) -> bool {
        let mut publishers = self.inner.publishers.write().await;
        match publishers.get_mut(path) {
            Some(p) => {
                p.subscribers.insert(subscriber);
                true
            }
            None => false,
        }
    }

    pub async fn remove_subscriber(&self, path: &str, subscriber: SessionId) {
        if let Some(p) = self.inner.publishers.write().await.get_mut(path) {
            p.subscribers.remove(&subscriber);
        }
    }

    /// Runs `f` against the published stream at `path` under the
    /// publishers write lock, returning its result. Used by the publishing
    /// session to update cached sequence headers / GOP state and read back
    /// a snapshot of current subscriber ids in one atomic step.
    pub async fn mutate_publisher<F, R>(&self, path: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut PublishedStream) -> R,
    {
        let mut publishers = self.inner.publishers.write().await;
        publishers.get_mut(path).map(f)
    }

    /// Resolves a set of subscriber ids into their live handles, dropping
    /// any that have already disconnected.
    pub async fn resolve_handles(&self, ids: &[SessionId]) -> Vec<SessionHandle> {
        let sessions = self.inner.sessions.read().await;
        ids.iter().filter_map(|id| sessions.get(id).cloned()).collect()
    }

    /// Signals every registered session's socket to close and clears the
    /// registries. Idempotent: sessions already removed are skipped.
    pub async fn stop_all_sessions(&self) {
        let sessions = self.inner.sessions.read().await;
        debug!("stopping {} session(s)", sessions.len());
        for handle in sessions.values() {
            handle.request_stop();
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
