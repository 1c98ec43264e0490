//! AES-128-CBC for V4 crypt filters.
//!
//! Ciphertext carries its 16-byte IV in front; padding is PKCS#7. The IV
//! for encryption is derived from the object key and plaintext so a full
//! rewrite of an unchanged document is byte-identical across runs.

use crate::error::{PdfError, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

pub const BLOCK_SIZE: usize = 16;

pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != BLOCK_SIZE {
        return Err(PdfError::UnsupportedEncryption(format!(
            "AES-128 key must be 16 bytes, got {}",
            key.len()
        )));
    }
    if data.len() < BLOCK_SIZE || (data.len() - BLOCK_SIZE) % BLOCK_SIZE != 0 {
        return Err(PdfError::StreamDecodeError(format!(
            "AES ciphertext length {} is not IV plus whole blocks",
            data.len()
        )));
    }
    let (iv, ciphertext) = data.split_at(BLOCK_SIZE);

    let decryptor = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| PdfError::UnsupportedEncryption(format!("AES init: {e}")))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| PdfError::StreamDecodeError("AES padding invalid".to_string()))
}

pub fn encrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    if key.len() != BLOCK_SIZE {
        return Err(PdfError::UnsupportedEncryption(format!(
            "AES-128 key must be 16 bytes, got {}",
            key.len()
        )));
    }
    let iv = derive_iv(key, data);

    let encryptor = Aes128CbcEnc::new_from_slices(key, &iv)
        .map_err(|e| PdfError::UnsupportedEncryption(format!("AES init: {e}")))?;
    let ciphertext = encryptor.encrypt_padded_vec_mut::<Pkcs7>(data);

    let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn derive_iv(key: &[u8], data: &[u8]) -> [u8; BLOCK_SIZE] {
    let mut input = Vec::with_capacity(key.len() + data.len());
    input.extend_from_slice(key);
    input.extend_from_slice(data);
    md5::compute(&input).0
}
