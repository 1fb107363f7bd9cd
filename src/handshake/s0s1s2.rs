use crate::{ByteBuffer, Error, Result};
use crate::handshake::c0c1::{C0C1, RTMP_VERSION, HANDSHAKE_SIZE, FMS_VERSION};
use crate::handshake::state::HandshakeFormat;
use crate::handshake::digest;
use crate::utils::{generate_random_bytes, current_timestamp};

/// Server handshake (S0 + S1 + S2)
#[derive(Debug, Clone)]
pub struct S0S1S2 {
    /// RTMP version (S0)
    pub version: u8,

    /// S1 timestamp
    pub s1_timestamp: u32,

    /// S1 version field (zero for the simple handshake, a server version
    /// number for the digest-verified complex handshake)
    pub s1_zero: u32,

    /// S1 random data
    pub s1_random: Vec<u8>,

    /// S2 timestamp (echo of C1 timestamp)
    pub s2_timestamp: u32,

    /// S2 timestamp2 (current server time)
    pub s2_timestamp2: u32,

    /// S2 random echo (echo of C1 random, or S2's own digest-bearing
    /// random body for a complex handshake)
    pub s2_random_echo: Vec<u8>,

    /// Digest extracted from C1, present only for a verified complex
    /// handshake. Needed to validate the client's C2 digest.
    pub c1_digest: Option<[u8; 32]>,
}

impl S0S1S2 {
    /// Generate S0+S1+S2 response for C0+C1 (simple, non-digest handshake)
    pub fn generate(c0c1: &C0C1) -> Result<Self> {
        // Validate client version
        if c0c1.version != RTMP_VERSION {
            return Err(Error::handshake(format!(
                "Unsupported client version: {}",
                c0c1.version
            )));
        }

        // Generate S1 random data
        let s1_random = generate_random_bytes(HANDSHAKE_SIZE - 8);

        Ok(S0S1S2 {
            version: RTMP_VERSION,
            s1_timestamp: current_timestamp(),
            s1_zero: 0,
            s1_random,
            s2_timestamp: c0c1.timestamp,
            s2_timestamp2: current_timestamp(),
            s2_random_echo: c0c1.random_data.clone(),
            c1_digest: None,
        })
    }

    /// Generate with the digest-verified complex handshake. `format` and
    /// `c1_digest` must come from `C0C1::detect_and_verify` on the same C1.
    pub fn generate_complex(c0c1: &C0C1, format: HandshakeFormat, c1_digest: [u8; 32]) -> Result<Self> {
        if c0c1.version != RTMP_VERSION {
            return Err(Error::handshake(format!(
                "Unsupported client version: {}",
                c0c1.version
            )));
        }

        let server_version = u32::from_be_bytes(FMS_VERSION);
        let s1_timestamp = current_timestamp();
        let s1_body = digest::generate_s1_body(
            format,
            s1_timestamp,
            server_version,
            generate_random_bytes(HANDSHAKE_SIZE - 8),
        );
        let s1_random = s1_body[8..].to_vec();

        // encode() writes s2_timestamp then s2_timestamp2 then s2_random_echo,
        // so the digest must cover the body in that exact order.
        let s2_timestamp2 = current_timestamp();
        let s2_body = digest::generate_s2_body(
            &c1_digest,
            c0c1.timestamp,
            s2_timestamp2,
            generate_random_bytes(HANDSHAKE_SIZE - 8 - 32),
        );
        let s2_random_echo = s2_body[8..].to_vec();

        Ok(S0S1S2 {
            version: RTMP_VERSION,
            s1_timestamp,
            s1_zero: server_version,
            s1_random,
            s2_timestamp: c0c1.timestamp,
            s2_timestamp2,
            s2_random_echo,
            c1_digest: Some(c1_digest),
        })
    }

    /// Encode to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(1 + HANDSHAKE_SIZE * 2);

        // S0
        result.push(self.version);

        // S1
        let mut s1_buffer = ByteBuffer::with_capacity(HANDSHAKE_SIZE);
        s1_buffer.write_u32_be(self.s1_timestamp).unwrap();
        s1_buffer.write_u32_be(self.s1_zero).unwrap();
        s1_buffer.write_bytes(&self.s1_random).unwrap();
        result.extend_from_slice(&s1_buffer.to_vec());

        // S2
        let mut s2_buffer = ByteBuffer::with_capacity(HANDSHAKE_SIZE);
        s2_buffer.write_u32_be(self.s2_timestamp).unwrap();
        s2_buffer.write_u32_be(self.s2_timestamp2).unwrap();
        s2_buffer.write_bytes(&self.s2_random_echo).unwrap();
        result.extend_from_slice(&s2_buffer.to_vec());

        result
    }

    /// Parse S0+S1+S2 from bytes (for client side)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 1 + HANDSHAKE_SIZE * 2 {
            return Err(Error::handshake(format!(
                "S0+S1+S2 too short: {} bytes",
                data.len()
            )));
        }

        // Parse S0
        let version = data[0];

        // Parse S1
        let s1_data = &data[1..1537];
        let mut s1_buffer = ByteBuffer::new(s1_data.to_vec());
        let s1_timestamp = s1_buffer.read_u32_be()?;
        let s1_zero = s1_buffer.read_u32_be()?;
        let s1_random = s1_buffer.read_bytes(HANDSHAKE_SIZE - 8)?;

        // Parse S2
        let s2_data = &data[1537..3073];
        let mut s2_buffer = ByteBuffer::new(s2_data.to_vec());
        let s2_timestamp = s2_buffer.read_u32_be()?;
        let s2_timestamp2 = s2_buffer.read_u32_be()?;
        let s2_random_echo = s2_buffer.read_bytes(HANDSHAKE_SIZE - 8)?;

        Ok(S0S1S2 {
            version,
            s1_timestamp,
            s1_zero,
            s1_random,
            s2_timestamp,
            s2_timestamp2,
            s2_random_echo,
            c1_digest: None,
        })
    }
}

/// C2 packet for completing handshake
#[derive(Debug, Clone)]
pub struct C2 {
    pub timestamp: u32,
    pub timestamp2: u32,
    pub random_echo: Vec<u8>,
}

impl C2 {
    /// Create C2 from S0+S1+S2 (simple handshake only: echoes S1 verbatim).
    /// A complex handshake's C2 instead carries a fresh digest and is built
    /// by the peer directly from `digest::generate_s2_body`-equivalent logic.
    pub fn create_from_s1(s0s1s2: &S0S1S2) -> Self {
        C2 {
            timestamp: s0s1s2.s1_timestamp,
            timestamp2: current_timestamp(),
            random_echo: s0s1s2.s1_random.clone(),
        }
    }

    /// Parse C2 from bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HANDSHAKE_SIZE {
            return Err(Error::handshake(format!(
                "C2 too short: {} bytes",
                data.len()
            )));
        }

        let mut buffer = ByteBuffer::new(data.to_vec());
        let timestamp = buffer.read_u32_be()?;
        let timestamp2 = buffer.read_u32_be()?;
        let random_echo = buffer.read_bytes(HANDSHAKE_SIZE - 8)?;

        Ok(C2 {
            timestamp,
            timestamp2,
            random_echo,
        })
    }

    /// Validate C2 against S1 (or, for a complex handshake, against the
    /// digest carried over from C1).
    pub fn validate(&self, s0s1s2: &S0S1S2) -> Result<()> {
        if let Some(c1_digest) = s0s1s2.c1_digest {
            let mut body = Vec::with_capacity(HANDSHAKE_SIZE);
            body.extend_from_slice(&self.timestamp.to_be_bytes());
            body.extend_from_slice(&self.timestamp2.to_be_bytes());
            body.extend_from_slice(&self.random_echo);
            return if digest::verify_c2_digest(&body, &c1_digest) {
                Ok(())
            } else {
                Err(Error::handshake("C2 digest verification failed"))
            };
        }

        // Simple handshake: client echoes our S1 untouched.
        if self.timestamp != s0s1s2.s1_timestamp {
            return Err(Error::handshake("C2 timestamp mismatch"));
        }
        if self.random_echo != s0s1s2.s1_random {
            return Err(Error::handshake("C2 random echo mismatch"));
        }

        Ok(())
    }

    /// Encode to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = ByteBuffer::with_capacity(HANDSHAKE_SIZE);
        buffer.write_u32_be(self.timestamp).unwrap();
        buffer.write_u32_be(self.timestamp2).unwrap();
        buffer.write_bytes(&self.random_echo).unwrap();
        buffer.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_flow() {
        // Client creates C0+C1
        let c0c1 = C0C1::create_client();

        // Server generates S0+S1+S2
        let s0s1s2 = S0S1S2::generate(&c0c1).unwrap();
        assert_eq!(s0s1s2.version, RTMP_VERSION);
        assert_eq!(s0s1s2.s2_timestamp, c0c1.timestamp);

        // Client creates C2
        let c2 = C2::create_from_s1(&s0s1s2);

        // Server validates C2
        c2.validate(&s0s1s2).unwrap();
    }

    #[test]
    fn test_complex_handshake_c2_validates() {
        let c1_digest = [7u8; 32];
        let s0s1s2 = S0S1S2::generate_complex(&C0C1::create_client(), HandshakeFormat::Format1, c1_digest)
            .unwrap();

        let s2_body = digest::generate_s2_body(&c1_digest, 1, 2, generate_random_bytes(HANDSHAKE_SIZE - 8 - 32));
        let c2 = C2::parse(&s2_body).unwrap();

        c2.validate(&s0s1s2).unwrap();
    }

    #[test]
    fn test_complex_handshake_c2_rejects_wrong_digest() {
        let c1_digest = [7u8; 32];
        let s0s1s2 = S0S1S2::generate_complex(&C0C1::create_client(), HandshakeFormat::Format1, c1_digest)
            .unwrap();

        let wrong_digest = [9u8; 32];
        let s2_body = digest::generate_s2_body(&wrong_digest, 1, 2, generate_random_bytes(HANDSHAKE_SIZE - 8 - 32));
        let c2 = C2::parse(&s2_body).unwrap();

        assert!(c2.validate(&s0s1s2).is_err());
    }
}