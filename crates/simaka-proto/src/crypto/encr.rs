//! AT_ENCR_DATA Protection (RFC 4186#10.12)
//!
//! Secured attributes (AT_COUNTER, AT_NONCE_S, AT_NEXT_REAUTH_ID, ...) are
//! carried inside AT_ENCR_DATA, encrypted with AES-128-CBC under K_encr
//! using the IV from the accompanying AT_IV attribute. The interior is a
//! plain attribute sequence padded to the block size with AT_PADDING, so no
//! cipher-level padding scheme is applied here.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;

use crate::attributes::IV_LEN;
use crate::keys::K_ENCR_LEN;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size; AT_ENCR_DATA payloads are a multiple of this
pub const BLOCK_LEN: usize = 16;

/// Secured-attribute encryption errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncrError {
    #[error("AT_ENCR_DATA payload length {0} is not a multiple of {BLOCK_LEN}")]
    UnalignedPayload(usize),
}

/// Decrypt an AT_ENCR_DATA payload.
pub fn decrypt_encr_data(
    k_encr: &[u8; K_ENCR_LEN],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EncrError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(EncrError::UnalignedPayload(ciphertext.len()));
    }

    let mut buffer = ciphertext.to_vec();
    Aes128CbcDec::new(k_encr.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| EncrError::UnalignedPayload(ciphertext.len()))?;
    Ok(buffer)
}

/// Encrypt a padded attribute sequence into an AT_ENCR_DATA payload.
///
/// The caller is responsible for AT_PADDING alignment; an unaligned
/// plaintext is rejected rather than silently padded.
pub fn encrypt_encr_data(
    k_encr: &[u8; K_ENCR_LEN],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
) -> Result<Vec<u8>, EncrError> {
    if plaintext.is_empty() || plaintext.len() % BLOCK_LEN != 0 {
        return Err(EncrError::UnalignedPayload(plaintext.len()));
    }

    let mut buffer = plaintext.to_vec();
    let len = buffer.len();
    Aes128CbcEnc::new(k_encr.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
        .map_err(|_| EncrError::UnalignedPayload(len))?;
    Ok(buffer)
}
