//! Standard security handler: password authentication and key derivation
//! (ISO 32000-1 Section 7.6.3, algorithms 2-7).

use super::rc4::rc4;
use crate::error::{PdfError, Result};

/// Canonical 32-byte password padding string (Table 21 note).
pub const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

const AES_SALT: [u8; 4] = [0x73, 0x41, 0x6C, 0x54]; // "sAlT"

/// Outcome of password authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Owner,
    User,
    Denied,
}

/// Parameters of the standard security handler, as read from (or written
/// to) the encryption dictionary.
#[derive(Debug, Clone)]
pub struct StandardSecurityHandler {
    pub revision: u8,
    /// File key length in bytes (L/8); 5 for R2.
    pub key_length: usize,
    pub owner_hash: Vec<u8>,
    pub user_hash: Vec<u8>,
    /// Raw signed P word.
    pub permissions: i64,
    /// First element of the trailer `ID`.
    pub file_id: Vec<u8>,
    pub encrypt_metadata: bool,
}

impl StandardSecurityHandler {
    /// Pad or truncate a candidate password to 32 bytes.
    pub fn pad_password(password: &[u8]) -> [u8; 32] {
        let mut padded = [0u8; 32];
        let len = password.len().min(32);
        padded[..len].copy_from_slice(&password[..len]);
        padded[len..].copy_from_slice(&PASSWORD_PAD[..32 - len]);
        padded
    }

    /// Algorithm 2: file encryption key from a (user) password.
    pub fn compute_file_key(&self, password: &[u8]) -> Vec<u8> {
        let mut input = Vec::with_capacity(96);
        input.extend_from_slice(&Self::pad_password(password));
        input.extend_from_slice(&self.owner_hash);
        input.extend_from_slice(&(self.permissions as i32).to_le_bytes());
        input.extend_from_slice(&self.file_id);
        if self.revision >= 4 && !self.encrypt_metadata {
            input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        }

        let mut hash = md5::compute(&input).0.to_vec();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash[..self.key_length]).0.to_vec();
            }
        }
        hash.truncate(if self.revision == 2 { 5 } else { self.key_length });
        hash
    }

    /// Algorithms 4/5: the U entry for a given file key.
    pub fn compute_user_hash(&self, file_key: &[u8]) -> Vec<u8> {
        if self.revision == 2 {
            return rc4(file_key, &PASSWORD_PAD);
        }

        let mut input = Vec::with_capacity(32 + self.file_id.len());
        input.extend_from_slice(&PASSWORD_PAD);
        input.extend_from_slice(&self.file_id);
        let digest = md5::compute(&input).0;

        let mut out = rc4(file_key, &digest);
        for round in 1..=19u8 {
            let round_key: Vec<u8> = file_key.iter().map(|b| b ^ round).collect();
            out = rc4(&round_key, &out);
        }
        out
    }

    /// Algorithm 3: the O entry from owner and user passwords (write path).
    pub fn compute_owner_hash(owner_password: &[u8], user_password: &[u8], revision: u8, key_length: usize) -> Vec<u8> {
        let key = Self::owner_key(owner_password, revision, key_length);

        let mut out = rc4(&key, &Self::pad_password(user_password));
        if revision >= 3 {
            for round in 1..=19u8 {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
                out = rc4(&round_key, &out);
            }
        }
        out
    }

    fn owner_key(owner_password: &[u8], revision: u8, key_length: usize) -> Vec<u8> {
        let mut hash = md5::compute(Self::pad_password(owner_password)).0.to_vec();
        if revision >= 3 {
            for _ in 0..50 {
                hash = md5::compute(&hash).0.to_vec();
            }
        }
        hash.truncate(if revision == 2 { 5 } else { key_length });
        hash
    }

    /// Algorithm 6: does `password` pass the user check? Returns the file
    /// key on success.
    pub fn authenticate_user(&self, password: &[u8]) -> Option<Vec<u8>> {
        let file_key = self.compute_file_key(password);
        let candidate = self.compute_user_hash(&file_key);
        let matches = if self.revision == 2 {
            candidate == self.user_hash
        } else {
            // Only the first 16 bytes of U are significant for R≥3.
            candidate.len() >= 16
                && self.user_hash.len() >= 16
                && candidate[..16] == self.user_hash[..16]
        };
        matches.then_some(file_key)
    }

    /// Algorithm 7: does `password` pass the owner check? Recovers the
    /// user password from O, then runs the user check on it.
    pub fn authenticate_owner(&self, password: &[u8]) -> Option<Vec<u8>> {
        let key = Self::owner_key(password, self.revision, self.key_length);

        let mut user_password = self.owner_hash.clone();
        if self.revision == 2 {
            user_password = rc4(&key, &user_password);
        } else {
            for round in (0..=19u8).rev() {
                let round_key: Vec<u8> = key.iter().map(|b| b ^ round).collect();
                user_password = rc4(&round_key, &user_password);
            }
        }
        self.authenticate_user(&user_password)
    }

    /// Try a candidate password as owner first, then as user.
    pub fn authenticate(&self, password: &[u8]) -> (AuthMode, Option<Vec<u8>>) {
        if let Some(key) = self.authenticate_owner(password) {
            return (AuthMode::Owner, Some(key));
        }
        if let Some(key) = self.authenticate_user(password) {
            return (AuthMode::User, Some(key));
        }
        (AuthMode::Denied, None)
    }

    /// Per-object key: MD5 over file key, low 3 bytes of the object
    /// number, low 2 bytes of the generation, and `sAlT` for AES;
    /// truncated to `min(L/8 + 5, 16)`.
    pub fn object_key(&self, file_key: &[u8], obj_num: u32, gen: u16, aes: bool) -> Vec<u8> {
        let mut input = Vec::with_capacity(file_key.len() + 9);
        input.extend_from_slice(file_key);
        input.extend_from_slice(&obj_num.to_le_bytes()[..3]);
        input.extend_from_slice(&gen.to_le_bytes()[..2]);
        if aes {
            input.extend_from_slice(&AES_SALT);
        }
        let digest = md5::compute(&input).0;
        let len = (file_key.len() + 5).min(16);
        digest[..len].to_vec()
    }

    /// Reject revisions this handler does not implement.
    pub fn check_supported(revision: u8, version: i64) -> Result<()> {
        if !matches!(version, 1 | 2 | 4) {
            return Err(PdfError::UnsupportedEncryption(format!("V={version}")));
        }
        if !matches!(revision, 2..=4) {
            return Err(PdfError::UnsupportedEncryption(format!("R={revision}")));
        }
        Ok(())
    }
}
