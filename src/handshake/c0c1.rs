use crate::{ByteBuffer, Error, Result};
use crate::handshake::state::HandshakeFormat;
use crate::handshake::digest;
use crate::utils::{generate_random_bytes, current_timestamp};

/// RTMP version
pub const RTMP_VERSION: u8 = 3;

/// Handshake packet size (C1/S1/C2/S2)
pub const HANDSHAKE_SIZE: usize = 1536;

/// FMS version for complex handshake
pub const FMS_VERSION: [u8; 4] = [0x05, 0x00, 0x01, 0x01];

/// Client handshake (C0 + C1)
#[derive(Debug, Clone)]
pub struct C0C1 {
    /// RTMP version (C0)
    pub version: u8,

    /// Timestamp (C1)
    pub timestamp: u32,

    /// Zero (C1) - should be 0
    pub zero: u32,

    /// Random data (C1)
    pub random_data: Vec<u8>,
}

impl C0C1 {
    /// Parse C0+C1 from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 1537 {
            return Err(Error::handshake(format!(
                "C0+C1 too short: {} bytes, expected 1537",
                data.len()
            )));
        }

        // Parse C0
        let version = data[0];
        if version != RTMP_VERSION {
            return Err(Error::handshake(format!(
                "Unsupported RTMP version: {}, expected {}",
                version, RTMP_VERSION
            )));
        }

        // Parse C1
        let c1_data = &data[1..1537];
        let mut buffer = ByteBuffer::new(c1_data.to_vec());

        let timestamp = buffer.read_u32_be()
            .map_err(|e| Error::handshake(format!("Failed to read timestamp: {}", e)))?;

        let zero = buffer.read_u32_be()
            .map_err(|e| Error::handshake(format!("Failed to read zero: {}", e)))?;

        let random_data = buffer.read_bytes(HANDSHAKE_SIZE - 8)
            .map_err(|e| Error::handshake(format!("Failed to read random data: {}", e)))?;

        Ok(C0C1 {
            version,
            timestamp,
            zero,
            random_data,
        })
    }

    /// Create C0+C1 for client
    pub fn create_client() -> Self {
        C0C1 {
            version: RTMP_VERSION,
            timestamp: current_timestamp(),
            zero: 0,
            random_data: generate_random_bytes(HANDSHAKE_SIZE - 8),
        }
    }

    /// Encode to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(1537);

        // C0
        result.push(self.version);

        // C1
        let mut c1_buffer = ByteBuffer::with_capacity(HANDSHAKE_SIZE);
        c1_buffer.write_u32_be(self.timestamp).unwrap();
        c1_buffer.write_u32_be(self.zero).unwrap();
        c1_buffer.write_bytes(&self.random_data).unwrap();

        result.extend_from_slice(&c1_buffer.to_vec());
        result
    }

    /// Reconstruct the raw 1536-byte handshake body (timestamp + zero +
    /// random), as it appeared on the wire.
    fn body_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HANDSHAKE_SIZE);
        body.extend_from_slice(&self.timestamp.to_be_bytes());
        body.extend_from_slice(&self.zero.to_be_bytes());
        body.extend_from_slice(&self.random_data);
        body
    }

    /// Detect the handshake schema and, for complex handshakes, verify the
    /// embedded HMAC-SHA256 digest. Falls back to `Simple` when no digest
    /// verifies, which covers old (pre-digest) clients.
    pub fn detect_and_verify(&self) -> (HandshakeFormat, Option<[u8; 32]>) {
        let body = self.body_bytes();
        match digest::detect_and_verify_client_digest(&body) {
            Some((format, digest)) => (format, Some(digest)),
            None => (HandshakeFormat::Simple, None),
        }
    }

    /// Detect handshake format (schema detection only, no verification).
    pub fn detect_format(&self) -> HandshakeFormat {
        self.detect_and_verify().0
    }

    /// Validate C1 digest for complex handshake. `format` must come from
    /// `detect_and_verify` on this same instance.
    pub fn validate_digest(&self, format: HandshakeFormat) -> Result<()> {
        match format {
            HandshakeFormat::Simple => Ok(()),
            HandshakeFormat::Format1 | HandshakeFormat::Format2 => {
                if self.detect_and_verify().1.is_some() {
                    Ok(())
                } else {
                    Err(Error::handshake("C1 digest verification failed"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c0c1_creation() {
        let c0c1 = C0C1::create_client();
        assert_eq!(c0c1.version, RTMP_VERSION);
        assert_eq!(c0c1.zero, 0);
        assert_eq!(c0c1.random_data.len(), HANDSHAKE_SIZE - 8);
    }

    #[test]
    fn test_c0c1_round_trip() {
        let original = C0C1::create_client();
        let bytes = original.encode();
        assert_eq!(bytes.len(), 1537);

        let parsed = C0C1::parse(&bytes).unwrap();
        assert_eq!(parsed.version, original.version);
        assert_eq!(parsed.timestamp, original.timestamp);
        assert_eq!(parsed.zero, original.zero);
    }
}