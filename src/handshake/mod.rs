mod state;
mod c0c1;
mod s0s1s2;
mod digest;

pub use state::*;
pub use c0c1::*;
pub use s0s1s2::*;
pub use digest::{RTMP_CLIENT_KEY_FIRST_HALF, RTMP_SERVER_KEY_FIRST_HALF, RTMP_SERVER_KEY};

use crate::{Error, Result};

pub fn validate_c0c1(data: &[u8]) -> Result<C0C1> {
    // Parse C0+C1
    let c0c1 = C0C1::parse(data)?;

    // Detect format
    let format = c0c1.detect_format();

    // Validate based on format
    c0c1.validate_digest(format)?;

    Ok(c0c1)
}

/// Builds the S0/S1/S2 response, picking the simple or complex (HMAC
/// digest) variant based on what the client's C0/C1 actually used.
pub fn generate_s0s1s2_parts(c0c1: &C0C1) -> Result<S0S1S2> {
    let (format, digest) = c0c1.detect_and_verify();

    match (format, digest) {
        (HandshakeFormat::Simple, _) | (_, None) => S0S1S2::generate(c0c1),
        (format, Some(c1_digest)) => S0S1S2::generate_complex(c0c1, format, c1_digest),
    }
}

pub fn generate_s0s1s2(c0c1: &C0C1) -> Result<Vec<u8>> {
    Ok(generate_s0s1s2_parts(c0c1)?.encode())
}

pub fn validate_c2(c2_data: &[u8], s0s1s2: &S0S1S2) -> Result<()> {
    // Parse C2
    let c2 = C2::parse(c2_data)?;

    // Validate against S1
    c2.validate(s0s1s2)?;

    Ok(())
}