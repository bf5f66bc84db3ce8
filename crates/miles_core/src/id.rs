//! Short, URL-safe random identifiers for goals, milestones, conversations
//! and motivations.

use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// 64 symbols, so a random byte masked to 6 bits maps uniformly.
pub const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

pub const DEFAULT_ID_LEN: usize = 21;

#[derive(Debug, Error)]
#[error("secure random source unavailable: {0}")]
pub struct IdError(#[from] rand::Error);

/// Generate a 21-character identifier.
pub fn generate_id() -> Result<String, IdError> {
    generate_id_with_len(DEFAULT_ID_LEN)
}

/// Generate an identifier of `len` characters from the OS CSPRNG.
///
/// Fails closed: if the OS source errors, no identifier is produced and
/// there is no fallback to a weaker generator.
pub fn generate_id_with_len(len: usize) -> Result<String, IdError> {
    let mut bytes = vec![0u8; len];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes
        .iter()
        .map(|b| ID_ALPHABET[(b & 63) as usize] as char)
        .collect())
}
