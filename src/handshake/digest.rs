//! HMAC-SHA256 digest handling for the "complex" (digest-verified) RTMP handshake.
//!
//! Adobe's complex handshake embeds a 32-byte digest inside the 1528 bytes
//! of random data that follow C1/S1's time+version header. Where exactly the
//! digest sits depends on which of two layouts ("schemas") the client chose;
//! the server mirrors whichever schema the client used.
use crate::handshake::state::HandshakeFormat;
use crate::utils::calculate_hmac_sha256;

/// First half of the client key, used directly as the HMAC key when
/// verifying a C1 digest.
pub const RTMP_CLIENT_KEY_FIRST_HALF: &[u8] = b"Genuine Adobe Flash Player 001";

/// First half of the server key, used directly as the HMAC key when
/// generating an S1 digest.
pub const RTMP_SERVER_KEY_FIRST_HALF: &[u8] = b"Genuine Adobe Flash Media Server 001";

/// Full server/client key, used as the HMAC key when deriving the
/// per-session key for S2/C2 digests.
pub const RTMP_SERVER_KEY: [u8; 68] = [
    0x47, 0x65, 0x6e, 0x75, 0x69, 0x6e, 0x65, 0x20, 0x41, 0x64, 0x6f, 0x62, 0x65, 0x20, 0x46, 0x6c,
    0x61, 0x73, 0x68, 0x20, 0x4d, 0x65, 0x64, 0x69, 0x61, 0x20, 0x53, 0x65, 0x72, 0x76, 0x65, 0x72,
    0x20, 0x30, 0x30, 0x31, 0xf0, 0xee, 0xc2, 0x4a, 0x80, 0x68, 0xbe, 0xe8, 0x2e, 0x00, 0xd0, 0xd1,
    0x02, 0x9e, 0x7e, 0x57, 0x6e, 0xec, 0x5d, 0x2d, 0x29, 0x80, 0x6f, 0xab, 0x93, 0xb8, 0xe6, 0x36,
    0xcf, 0xeb, 0x31, 0xae,
];

const DIGEST_LEN: usize = 32;
const HANDSHAKE_BODY_LEN: usize = 1536;

/// Absolute byte offset of the digest within a 1536-byte handshake body
/// (time+version+random), for the given schema. `Simple` has no digest.
fn digest_offset(body: &[u8], format: HandshakeFormat) -> Option<usize> {
    let (offset_field_at, digest_base) = match format {
        // Schema 0: key block (764 bytes) first, digest block second.
        HandshakeFormat::Format1 => (772usize, 776usize),
        // Schema 1: digest block first, key block second.
        HandshakeFormat::Format2 => (8usize, 12usize),
        HandshakeFormat::Simple => return None,
    };

    if body.len() < offset_field_at + 4 {
        return None;
    }
    let sum: u32 = body[offset_field_at..offset_field_at + 4]
        .iter()
        .map(|&b| b as u32)
        .sum();
    let offset = digest_base + (sum % 728) as usize;
    if offset + DIGEST_LEN > body.len() {
        return None;
    }
    Some(offset)
}

/// Splits a handshake body into (digest, message-without-digest), where
/// the message is every byte except the 32-byte digest itself.
fn split_digest(body: &[u8], offset: usize) -> ([u8; DIGEST_LEN], Vec<u8>) {
    let mut digest = [0u8; DIGEST_LEN];
    digest.copy_from_slice(&body[offset..offset + DIGEST_LEN]);

    let mut message = Vec::with_capacity(body.len() - DIGEST_LEN);
    message.extend_from_slice(&body[..offset]);
    message.extend_from_slice(&body[offset + DIGEST_LEN..]);
    (digest, message)
}

/// Tries schema 0 then schema 1 against a client's C1 body (the 1536 bytes
/// following the single C0 version byte). Returns the matching schema and
/// the verified 32-byte digest, or `None` if this is an old-style simple
/// handshake (or a schema we can't verify).
pub fn detect_and_verify_client_digest(c1_body: &[u8]) -> Option<(HandshakeFormat, [u8; DIGEST_LEN])> {
    if c1_body.len() < HANDSHAKE_BODY_LEN {
        return None;
    }
    for format in [HandshakeFormat::Format1, HandshakeFormat::Format2] {
        if let Some(offset) = digest_offset(c1_body, format) {
            let (digest, message) = split_digest(c1_body, offset);
            let expected = calculate_hmac_sha256(RTMP_CLIENT_KEY_FIRST_HALF, &message);
            if expected == digest {
                return Some((format, digest));
            }
        }
    }
    None
}

/// Builds a complete 1536-byte S1 body (time+version+random) with a valid
/// digest embedded at the schema-appropriate offset, mirroring the
/// client's chosen schema.
pub fn generate_s1_body(format: HandshakeFormat, timestamp: u32, server_version: u32, random: Vec<u8>) -> Vec<u8> {
    let mut body = Vec::with_capacity(HANDSHAKE_BODY_LEN);
    body.extend_from_slice(&timestamp.to_be_bytes());
    body.extend_from_slice(&server_version.to_be_bytes());
    body.extend_from_slice(&random);
    debug_assert_eq!(body.len(), HANDSHAKE_BODY_LEN);

    if let Some(offset) = digest_offset(&body, format) {
        let (_, message) = split_digest(&body, offset);
        let digest = calculate_hmac_sha256(RTMP_SERVER_KEY_FIRST_HALF, &message);
        body[offset..offset + DIGEST_LEN].copy_from_slice(&digest);
    }
    body
}

/// Derives the per-session key used for S2/C2 digests from the verified
/// C1 digest.
fn derive_session_key(c1_digest: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    calculate_hmac_sha256(&RTMP_SERVER_KEY, c1_digest)
}

/// Builds a complete 1536-byte S2 body: 1504 bytes of timestamp fields
/// and random data (in the same order the caller will put them on the
/// wire) followed by a 32-byte digest computed with the session key
/// derived from C1's digest.
pub fn generate_s2_body(c1_digest: &[u8; DIGEST_LEN], timestamp_field_a: u32, timestamp_field_b: u32, random: Vec<u8>) -> Vec<u8> {
    let mut body = Vec::with_capacity(HANDSHAKE_BODY_LEN);
    body.extend_from_slice(&timestamp_field_a.to_be_bytes());
    body.extend_from_slice(&timestamp_field_b.to_be_bytes());
    body.extend_from_slice(&random);
    debug_assert_eq!(body.len(), HANDSHAKE_BODY_LEN - DIGEST_LEN);

    let session_key = derive_session_key(c1_digest);
    let digest = calculate_hmac_sha256(&session_key, &body);
    body.extend_from_slice(&digest);
    body
}

/// Verifies a client's C2 against the digest embedded in C1, using the
/// same session-key derivation as `generate_s2_body`.
pub fn verify_c2_digest(c2_body: &[u8], c1_digest: &[u8; DIGEST_LEN]) -> bool {
    if c2_body.len() < HANDSHAKE_BODY_LEN {
        return false;
    }
    let session_key = derive_session_key(c1_digest);
    let expected = calculate_hmac_sha256(&session_key, &c2_body[..HANDSHAKE_BODY_LEN - DIGEST_LEN]);
    expected == c2_body[HANDSHAKE_BODY_LEN - DIGEST_LEN..HANDSHAKE_BODY_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::generate_random_bytes;

    fn make_client_body_with_digest(format: HandshakeFormat) -> Vec<u8> {
        let mut body = Vec::with_capacity(HANDSHAKE_BODY_LEN);
        body.extend_from_slice(&1u32.to_be_bytes());
        body.extend_from_slice(&0x80000702u32.to_be_bytes());
        body.extend_from_slice(&generate_random_bytes(HANDSHAKE_BODY_LEN - 8));

        let offset = digest_offset(&body, format).unwrap();
        let (_, message) = split_digest(&body, offset);
        let digest = calculate_hmac_sha256(RTMP_CLIENT_KEY_FIRST_HALF, &message);
        body[offset..offset + DIGEST_LEN].copy_from_slice(&digest);
        body
    }

    #[test]
    fn verifies_schema0_digest() {
        let body = make_client_body_with_digest(HandshakeFormat::Format1);
        let (format, _) = detect_and_verify_client_digest(&body).expect("digest should verify");
        assert_eq!(format, HandshakeFormat::Format1);
    }

    #[test]
    fn verifies_schema1_digest() {
        let body = make_client_body_with_digest(HandshakeFormat::Format2);
        let (format, _) = detect_and_verify_client_digest(&body).expect("digest should verify");
        assert_eq!(format, HandshakeFormat::Format2);
    }

    #[test]
    fn rejects_corrupted_digest() {
        let mut body = make_client_body_with_digest(HandshakeFormat::Format1);
        body[900] ^= 0xFF;
        assert!(detect_and_verify_client_digest(&body).is_none());
    }

    #[test]
    fn s1_digest_round_trips_and_session_key_matches() {
        let c1 = make_client_body_with_digest(HandshakeFormat::Format1);
        let (format, c1_digest) = detect_and_verify_client_digest(&c1).unwrap();

        let s1 = generate_s1_body(format, 0, 0x04050001, generate_random_bytes(HANDSHAKE_BODY_LEN - 8));
        let offset = digest_offset(&s1, format).unwrap();
        let (digest, message) = split_digest(&s1, offset);
        let expected = calculate_hmac_sha256(RTMP_SERVER_KEY_FIRST_HALF, &message);
        assert_eq!(digest, expected);

        let s2 = generate_s2_body(&c1_digest, 1, 2, generate_random_bytes(HANDSHAKE_BODY_LEN - 8 - DIGEST_LEN));
        assert!(verify_c2_digest(&s2, &c1_digest));
    }
}
