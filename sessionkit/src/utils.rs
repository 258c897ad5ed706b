use ring::rand::SecureRandom;
use sha2::{Digest, Sha256};

const SID_ALPHABET_4: &[u8] = b"0123456789abcdef";
const SID_ALPHABET_5: &[u8] = b"0123456789abcdefghijklmnopqrstuv";
const SID_ALPHABET_6: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ-,";

pub(crate) fn gen_random_bytes(len: usize) -> Result<Vec<u8>, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut bytes = vec![0u8; len];
    rng.fill(&mut bytes)
        .map_err(|_| UtilError::Crypto("Failed to generate random bytes".to_string()))?;
    Ok(bytes)
}

/// Hex encoded random token of `len` bytes (`2 * len` characters).
pub(crate) fn gen_random_token(len: usize) -> Result<String, UtilError> {
    Ok(hex::encode(gen_random_bytes(len)?))
}

pub(crate) fn gen_random_u32() -> Result<u32, UtilError> {
    let bytes = gen_random_bytes(4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn sid_alphabet(bits_per_character: u8) -> Result<&'static [u8], UtilError> {
    match bits_per_character {
        4 => Ok(SID_ALPHABET_4),
        5 => Ok(SID_ALPHABET_5),
        6 => Ok(SID_ALPHABET_6),
        other => Err(UtilError::Format(format!(
            "Unsupported bits per character: {other} (expected 4, 5 or 6)"
        ))),
    }
}

/// Generates a session identifier of `length` characters, each carrying
/// `bits_per_character` bits drawn from the system CSPRNG.
pub(crate) fn gen_session_id(length: usize, bits_per_character: u8) -> Result<String, UtilError> {
    let alphabet = sid_alphabet(bits_per_character)?;
    let bits = bits_per_character as usize;
    let bytes = gen_random_bytes((length * bits).div_ceil(8))?;
    let mask = (1u16 << bits) - 1;

    let mut id = String::with_capacity(length);
    let mut acc: u16 = 0;
    let mut acc_bits = 0usize;
    let mut source = bytes.iter();
    for _ in 0..length {
        if acc_bits < bits {
            let byte = source.next().copied().unwrap_or_default();
            acc |= u16::from(byte) << acc_bits;
            acc_bits += 8;
        }
        id.push(char::from(alphabet[usize::from(acc & mask)]));
        acc >>= bits;
        acc_bits -= bits;
    }
    Ok(id)
}

pub(crate) fn is_valid_session_id(id: &str, length: usize, bits_per_character: u8) -> bool {
    let Ok(alphabet) = sid_alphabet(bits_per_character) else {
        return false;
    };
    id.len() == length && id.bytes().all(|b| alphabet.contains(&b))
}

pub(crate) fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid format: {0}")]
    Format(String),
}
