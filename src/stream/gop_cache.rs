use crate::protocol::RtmpPacket;

/// Retains the frames of the most recent group-of-pictures so a subscriber
/// joining mid-stream can be fast-forwarded to the last keyframe. Sequence
/// headers (AAC/AVC) are never stored here; the publisher caches those
/// separately and replays them ahead of the GOP.
pub struct GopCache {
    frames: Vec<RtmpPacket>,
    cap: usize,
}

impl GopCache {
    /// `cap` bounds how many frames a single GOP may accumulate (the
    /// `rtmp.gop_cache_size` knob); once reached, further frames are
    /// dropped from the cache until the next keyframe starts a fresh GOP.
    pub fn new(cap: usize) -> Self {
        GopCache { frames: Vec::new(), cap }
    }

    /// Starts a new GOP at a keyframe, discarding whatever was cached before.
    pub fn start(&mut self, keyframe: RtmpPacket) {
        self.frames.clear();
        self.frames.push(keyframe);
    }

    /// Appends a non-keyframe to the GOP in progress. Ignored until a
    /// keyframe has opened a GOP, and once the GOP has reached `cap` frames.
    pub fn push(&mut self, packet: RtmpPacket) {
        if !self.frames.is_empty() && self.frames.len() < self.cap {
            self.frames.push(packet);
        }
    }

    pub fn frames(&self) -> &[RtmpPacket] {
        &self.frames
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyframe(timestamp: u32) -> RtmpPacket {
        crate::protocol::make_video_packet(vec![0x17, 0x00], timestamp, 1)
    }

    fn interframe(timestamp: u32) -> RtmpPacket {
        crate::protocol::make_video_packet(vec![0x27, 0x01], timestamp, 1)
    }

    #[test]
    fn accumulates_one_gop() {
        let mut cache = GopCache::new(100);
        cache.start(keyframe(1000));
        cache.push(interframe(1033));
        cache.push(interframe(1066));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn new_keyframe_replaces_prior_gop() {
        let mut cache = GopCache::new(100);
        cache.start(keyframe(1000));
        cache.push(interframe(1033));
        cache.start(keyframe(2000));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.frames()[0].timestamp(), 2000);
    }

    #[test]
    fn frames_before_any_keyframe_are_dropped() {
        let mut cache = GopCache::new(100);
        cache.push(interframe(500));
        assert!(cache.is_empty());
    }

    #[test]
    fn push_stops_at_cap() {
        let mut cache = GopCache::new(2);
        cache.start(keyframe(1000));
        cache.push(interframe(1033));
        cache.push(interframe(1066));
        assert_eq!(cache.len(), 2);
    }
}
