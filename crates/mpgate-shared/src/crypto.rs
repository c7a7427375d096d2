//! Webhook signatures and payload encryption.
//!
//! Signatures are SHA-1 over the lexicographically sorted, concatenated
//! inputs, lowercase hex. Payloads use AES-256-CBC with the IV taken from
//! the first 16 bytes of the key, and the plaintext framed as
//! `[16 random][u32 BE length][content][receiver id]`.

use aes::Aes256;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD, STANDARD};
use base64::Engine;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::constants::{
    AES_BLOCK_SIZE, AES_KEY_SIZE, LENGTH_FIELD_SIZE, MAX_PAD, RANDOM_PREFIX_SIZE,
};
use crate::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub type EncodingKey = [u8; AES_KEY_SIZE];

// The platform's 43-char keys carry non-zero trailing bits in the last char.
const KEY_ENGINE: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, PAD.with_decode_allow_trailing_bits(true));

/// Sort, concatenate, SHA-1, lowercase hex.
pub fn compute_signature(parts: &[&str]) -> String {
    let mut sorted = parts.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha1::new();
    for part in sorted {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Exact string comparison against a freshly computed signature.
pub fn verify_signature(signature: &str, parts: &[&str]) -> bool {
    compute_signature(parts) == signature
}

/// Decode a configured encoding key. The configured form omits the single
/// trailing `=` pad character.
pub fn decode_key(encoding_key: &str) -> Result<EncodingKey, CryptoError> {
    let padded = format!("{}=", encoding_key.trim());
    let bytes = KEY_ENGINE
        .decode(padded)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    if bytes.len() != AES_KEY_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "expected {} bytes, got {}",
            AES_KEY_SIZE,
            bytes.len()
        )));
    }

    let mut key = [0u8; AES_KEY_SIZE];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Decrypt a base64 webhook payload and return only the content section.
pub fn decrypt(encoding_key: &str, ciphertext_b64: &str) -> Result<Vec<u8>, CryptoError> {
    let key = decode_key(encoding_key)?;

    let mut buf = STANDARD
        .decode(ciphertext_b64.trim())
        .map_err(|e| CryptoError::InvalidCiphertext(e.to_string()))?;

    if buf.is_empty() || buf.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidCiphertext(format!(
            "length {} is not a positive multiple of {}",
            buf.len(),
            AES_BLOCK_SIZE
        )));
    }

    let plain = Aes256CbcDec::new_from_slices(&key, &key[..AES_BLOCK_SIZE])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| CryptoError::InvalidCiphertext("block decryption failed".into()))?;

    let unpadded = pkcs7_unpad(plain)?;
    extract_content(unpadded).map(<[u8]>::to_vec)
}

/// Frame, pad and encrypt `plaintext`, returning base64 ciphertext that
/// [`decrypt`] turns back into `plaintext`.
pub fn encrypt(
    plaintext: &[u8],
    encoding_key: &str,
    receiver_id: &str,
) -> Result<String, CryptoError> {
    let key = decode_key(encoding_key)?;

    let content_len = u32::try_from(plaintext.len())
        .map_err(|_| CryptoError::InvalidCiphertext("plaintext too large".into()))?;

    let mut prefix = [0u8; RANDOM_PREFIX_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut prefix);

    let mut framed = Vec::with_capacity(
        RANDOM_PREFIX_SIZE + LENGTH_FIELD_SIZE + plaintext.len() + receiver_id.len() + AES_BLOCK_SIZE,
    );
    framed.extend_from_slice(&prefix);
    framed.extend_from_slice(&content_len.to_be_bytes());
    framed.extend_from_slice(plaintext);
    framed.extend_from_slice(receiver_id.as_bytes());
    pkcs7_pad(&mut framed, AES_BLOCK_SIZE);

    let msg_len = framed.len();
    let ciphertext = Aes256CbcEnc::new_from_slices(&key, &key[..AES_BLOCK_SIZE])
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .encrypt_padded_mut::<NoPadding>(&mut framed, msg_len)
        .map_err(|_| CryptoError::InvalidCiphertext("block encryption failed".into()))?;

    Ok(STANDARD.encode(ciphertext))
}

fn pkcs7_pad(data: &mut Vec<u8>, block_size: usize) {
    let pad = block_size - data.len() % block_size;
    data.resize(data.len() + pad, pad as u8);
}

fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CryptoError> {
    let pad = *data.last().ok_or(CryptoError::BadPadding)? as usize;
    if pad == 0 || pad > MAX_PAD || pad > data.len() {
        return Err(CryptoError::BadPadding);
    }

    let (body, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(CryptoError::BadPadding);
    }
    Ok(body)
}

fn extract_content(data: &[u8]) -> Result<&[u8], CryptoError> {
    let header = RANDOM_PREFIX_SIZE + LENGTH_FIELD_SIZE;
    if data.len() < header {
        return Err(CryptoError::Truncated {
            needed: header,
            actual: data.len(),
        });
    }

    let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
    len_bytes.copy_from_slice(&data[RANDOM_PREFIX_SIZE..header]);
    let content_len = u32::from_be_bytes(len_bytes) as usize;

    let end = header + content_len;
    if end > data.len() {
        return Err(CryptoError::Truncated {
            needed: end,
            actual: data.len(),
        });
    }
    Ok(&data[header..end])
}
