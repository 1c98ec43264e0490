//! Document-level crypt state: encryption-dictionary parsing and
//! just-in-time application of string/stream crypt.

use super::standard_security::{AuthMode, StandardSecurityHandler};
use super::{aes128, rc4::rc4};
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};

/// Algorithm selected for a crypt scope (streams or strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    Identity,
    Rc4,
    Aes128,
}

/// Authenticated encryption context for one document.
#[derive(Debug, Clone)]
pub struct EncryptionState {
    pub handler: StandardSecurityHandler,
    file_key: Vec<u8>,
    mode: AuthMode,
    stream_method: CryptMethod,
    string_method: CryptMethod,
}

impl EncryptionState {
    /// Parse the trailer `Encrypt` dictionary and authenticate.
    ///
    /// The candidate passwords are tried owner-check-first, so the result
    /// mode does not depend on the order the caller supplies them in.
    pub fn from_dict(
        encrypt: &Dictionary,
        file_id: &[u8],
        user_password: &[u8],
        owner_password: &[u8],
    ) -> Result<Self> {
        match encrypt.get_name(b"Filter") {
            Some(b"Standard") => {}
            Some(other) => {
                return Err(PdfError::UnsupportedEncryption(format!(
                    "security handler /{}",
                    String::from_utf8_lossy(other)
                )))
            }
            None => return Err(PdfError::MissingKey("Filter".to_string())),
        }

        let version = encrypt.get_integer(b"V").unwrap_or(0);
        let revision = encrypt.get_integer(b"R").unwrap_or(0) as u8;
        StandardSecurityHandler::check_supported(revision, version)?;

        let length_bits = encrypt.get_integer(b"Length").unwrap_or(40);
        if length_bits % 8 != 0 || !(40..=128).contains(&length_bits) {
            return Err(PdfError::UnsupportedEncryption(format!(
                "key length {length_bits}"
            )));
        }

        let owner_hash = encrypt
            .get_required(b"O")?
            .expect_string()?
            .to_vec();
        let user_hash = encrypt
            .get_required(b"U")?
            .expect_string()?
            .to_vec();
        let permissions = encrypt
            .get_required(b"P")?
            .expect_integer()?;
        let encrypt_metadata = encrypt
            .get(b"EncryptMetadata")
            .and_then(Object::as_bool)
            .unwrap_or(true);

        let handler = StandardSecurityHandler {
            revision,
            key_length: (length_bits / 8) as usize,
            owner_hash,
            user_hash,
            permissions,
            file_id: file_id.to_vec(),
            encrypt_metadata,
        };

        let (stream_method, string_method) = if version == 4 {
            crypt_filter_methods(encrypt)?
        } else {
            (CryptMethod::Rc4, CryptMethod::Rc4)
        };

        // Passwords are byte strings of at most 32 bytes.
        let user_password = &user_password[..user_password.len().min(32)];
        let owner_password = &owner_password[..owner_password.len().min(32)];

        let mut best = (AuthMode::Denied, None);
        for candidate in [owner_password, user_password] {
            let (mode, key) = handler.authenticate(candidate);
            match (mode, best.0) {
                (AuthMode::Owner, _) => {
                    best = (mode, key);
                    break;
                }
                (AuthMode::User, AuthMode::Denied) => best = (mode, key),
                _ => {}
            }
        }

        let (mode, file_key) = best;
        let file_key = file_key.ok_or(PdfError::PasswordRequired)?;

        Ok(Self {
            handler,
            file_key,
            mode,
            stream_method,
            string_method,
        })
    }

    /// State for encrypting a document this library is about to write;
    /// the caller chose the passwords, so the mode is Owner.
    pub fn for_write(
        handler: StandardSecurityHandler,
        file_key: Vec<u8>,
        stream_method: CryptMethod,
        string_method: CryptMethod,
    ) -> Self {
        Self {
            handler,
            file_key,
            mode: AuthMode::Owner,
            stream_method,
            string_method,
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.mode
    }

    pub fn file_key(&self) -> &[u8] {
        &self.file_key
    }

    /// Fail unless the authenticated mode grants `required` permission
    /// bits. Owner authentication grants everything.
    pub fn require_permissions(&self, required: super::Permissions) -> Result<()> {
        if self.mode == AuthMode::Owner {
            return Ok(());
        }
        let granted = super::Permissions::from_p(self.handler.permissions);
        if granted.contains(required) {
            Ok(())
        } else {
            Err(PdfError::InsufficientPermissions)
        }
    }

    fn apply(&self, method: CryptMethod, id: ObjectId, data: &[u8], decrypt: bool) -> Result<Vec<u8>> {
        match method {
            CryptMethod::Identity => Ok(data.to_vec()),
            CryptMethod::Rc4 => {
                let key =
                    self.handler
                        .object_key(&self.file_key, id.number(), id.generation(), false);
                Ok(rc4(&key, data))
            }
            CryptMethod::Aes128 => {
                let key =
                    self.handler
                        .object_key(&self.file_key, id.number(), id.generation(), true);
                if decrypt {
                    aes128::decrypt(&key, data)
                } else {
                    aes128::encrypt(&key, data)
                }
            }
        }
    }

    pub fn decrypt_string(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.string_method, id, data, true)
    }

    pub fn encrypt_string(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.string_method, id, data, false)
    }

    pub fn decrypt_stream_data(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.stream_method, id, data, true)
    }

    pub fn encrypt_stream_data(&self, id: ObjectId, data: &[u8]) -> Result<Vec<u8>> {
        self.apply(self.stream_method, id, data, false)
    }

    /// Decrypt every string in the object, and the stream body when one is
    /// loaded. Used on first materialization of an indirect object; the
    /// caller skips xref streams and the encryption dictionary itself.
    pub fn decrypt_object(&self, id: ObjectId, object: &mut Object) -> Result<()> {
        match object {
            Object::String(bytes, _) => {
                *bytes = self.decrypt_string(id, bytes)?;
            }
            Object::Array(items) => {
                for item in items {
                    self.decrypt_object(id, item)?;
                }
            }
            Object::Dictionary(dict) => {
                for (_, value) in dict.iter_mut() {
                    self.decrypt_object(id, value)?;
                }
            }
            Object::Stream(stream) => {
                if let Some(encoded) = stream.encoded_data() {
                    let plain = self.decrypt_stream_data(id, encoded)?;
                    stream.set_encoded_data(plain);
                }
                let mut dict_obj = Object::Dictionary(std::mem::take(&mut stream.dict));
                self.decrypt_object(id, &mut dict_obj)?;
                if let Object::Dictionary(dict) = dict_obj {
                    stream.dict = dict;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Resolve `StmF`/`StrF` through the `CF` map for V4 dictionaries.
fn crypt_filter_methods(encrypt: &Dictionary) -> Result<(CryptMethod, CryptMethod)> {
    let cf = encrypt.get_dict(b"CF");

    let resolve = |name: Option<&[u8]>| -> Result<CryptMethod> {
        let name = name.unwrap_or(b"Identity");
        if name == b"Identity" {
            return Ok(CryptMethod::Identity);
        }
        let filter = cf
            .and_then(|cf| cf.get_dict(name))
            .ok_or_else(|| {
                PdfError::UnsupportedEncryption(format!(
                    "crypt filter /{} not in CF",
                    String::from_utf8_lossy(name)
                ))
            })?;
        match filter.get_name(b"CFM") {
            Some(b"V2") => Ok(CryptMethod::Rc4),
            Some(b"AESV2") => Ok(CryptMethod::Aes128),
            Some(b"None") | None => Ok(CryptMethod::Identity),
            Some(other) => Err(PdfError::UnsupportedEncryption(format!(
                "CFM /{}",
                String::from_utf8_lossy(other)
            ))),
        }
    };

    Ok((
        resolve(encrypt.get_name(b"StmF"))?,
        resolve(encrypt.get_name(b"StrF"))?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::Permissions;
    use crate::objects::{Stream, StringFormat};

    /// Build an RC4-40 encryption dictionary for the given passwords.
    pub(crate) fn rc4_40_dict(user_pw: &[u8], owner_pw: &[u8], p: i64, file_id: &[u8]) -> Dictionary {
        let owner_hash = StandardSecurityHandler::compute_owner_hash(owner_pw, user_pw, 2, 5);
        let mut handler = StandardSecurityHandler {
            revision: 2,
            key_length: 5,
            owner_hash: owner_hash.clone(),
            user_hash: Vec::new(),
            permissions: p,
            file_id: file_id.to_vec(),
            encrypt_metadata: true,
        };
        let file_key = handler.compute_file_key(user_pw);
        handler.user_hash = handler.compute_user_hash(&file_key);

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("V", 1);
        dict.set("R", 2);
        dict.set("Length", 40);
        dict.set("O", Object::String(handler.owner_hash, StringFormat::Hexadecimal));
        dict.set("U", Object::String(handler.user_hash, StringFormat::Hexadecimal));
        dict.set("P", p);
        dict
    }

    /// Build an AES-128 (V4/R4) encryption dictionary.
    pub(crate) fn aes_dict(user_pw: &[u8], owner_pw: &[u8], p: i64, file_id: &[u8]) -> Dictionary {
        let owner_hash = StandardSecurityHandler::compute_owner_hash(owner_pw, user_pw, 4, 16);
        let mut handler = StandardSecurityHandler {
            revision: 4,
            key_length: 16,
            owner_hash: owner_hash.clone(),
            user_hash: Vec::new(),
            permissions: p,
            file_id: file_id.to_vec(),
            encrypt_metadata: true,
        };
        let file_key = handler.compute_file_key(user_pw);
        let mut user_hash = handler.compute_user_hash(&file_key);
        user_hash.resize(32, 0);
        handler.user_hash = user_hash;

        let mut stdcf = Dictionary::new();
        stdcf.set("Type", Object::name("CryptFilter"));
        stdcf.set("CFM", Object::name("AESV2"));
        stdcf.set("Length", 16);
        let mut cf = Dictionary::new();
        cf.set("StdCF", stdcf);

        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("Standard"));
        dict.set("V", 4);
        dict.set("R", 4);
        dict.set("Length", 128);
        dict.set("CF", cf);
        dict.set("StmF", Object::name("StdCF"));
        dict.set("StrF", Object::name("StdCF"));
        dict.set("O", Object::String(handler.owner_hash, StringFormat::Hexadecimal));
        dict.set("U", Object::String(handler.user_hash, StringFormat::Hexadecimal));
        dict.set("P", p);
        dict
    }

    #[test]
    fn test_rc4_auth_modes() {
        let dict = rc4_40_dict(b"user", b"owner", -4, b"id-bytes");

        assert!(matches!(
            EncryptionState::from_dict(&dict, b"id-bytes", b"", b""),
            Err(PdfError::PasswordRequired)
        ));

        let state = EncryptionState::from_dict(&dict, b"id-bytes", b"user", b"").unwrap();
        assert_eq!(state.auth_mode(), AuthMode::User);

        let state = EncryptionState::from_dict(&dict, b"id-bytes", b"", b"owner").unwrap();
        assert_eq!(state.auth_mode(), AuthMode::Owner);
    }

    #[test]
    fn test_auth_order_insensitive() {
        let dict = rc4_40_dict(b"user", b"owner", -4, b"id");
        let a = EncryptionState::from_dict(&dict, b"id", b"user", b"owner").unwrap();
        let b = EncryptionState::from_dict(&dict, b"id", b"owner", b"user").unwrap();
        assert_eq!(a.auth_mode(), AuthMode::Owner);
        assert_eq!(b.auth_mode(), AuthMode::Owner);
    }

    #[test]
    fn test_string_roundtrip_rc4() {
        let dict = rc4_40_dict(b"user", b"owner", -4, b"id");
        let state = EncryptionState::from_dict(&dict, b"id", b"user", b"").unwrap();
        let id = ObjectId::new(7, 0);

        let ciphertext = state.encrypt_string(id, b"secret").unwrap();
        assert_ne!(ciphertext.as_slice(), b"secret");
        assert_eq!(state.decrypt_string(id, &ciphertext).unwrap(), b"secret");
    }

    #[test]
    fn test_string_roundtrip_aes() {
        let dict = aes_dict(b"user", b"owner", -4, b"id");
        let state = EncryptionState::from_dict(&dict, b"id", b"user", b"").unwrap();
        let id = ObjectId::new(7, 0);

        let key = state.handler.object_key(state.file_key(), 7, 0, true);
        assert_eq!(key.len(), 16);

        let ciphertext = state.encrypt_string(id, b"secret").unwrap();
        assert_eq!(state.decrypt_string(id, &ciphertext).unwrap(), b"secret");
    }

    #[test]
    fn test_decrypt_object_walks_graph() {
        let dict = rc4_40_dict(b"", b"owner", -4, b"id");
        let state = EncryptionState::from_dict(&dict, b"id", b"", b"").unwrap();
        let id = ObjectId::new(3, 0);

        let secret = state.encrypt_string(id, b"inner").unwrap();
        let mut container = Dictionary::new();
        container.set(
            "Nested",
            vec![Object::String(secret, StringFormat::Literal)],
        );
        let mut object = Object::Dictionary(container);

        state.decrypt_object(id, &mut object).unwrap();
        let decrypted = object.as_dict().unwrap().get_array(b"Nested").unwrap();
        assert_eq!(decrypted[0].as_string(), Some(b"inner".as_ref()));
    }

    #[test]
    fn test_decrypt_object_stream_body() {
        let dict = rc4_40_dict(b"", b"o", -4, b"id");
        let state = EncryptionState::from_dict(&dict, b"id", b"", b"").unwrap();
        let id = ObjectId::new(4, 0);

        let body = state.encrypt_stream_data(id, b"stream body").unwrap();
        let mut object = Object::Stream(Stream::with_data(Dictionary::new(), body));
        state.decrypt_object(id, &mut object).unwrap();
        assert_eq!(
            object.as_stream().unwrap().encoded_data(),
            Some(b"stream body".as_ref())
        );
    }

    #[test]
    fn test_permission_enforcement() {
        let p = Permissions::PRINT.to_p() as i64;
        let dict = rc4_40_dict(b"user", b"owner", p, b"id");

        let user = EncryptionState::from_dict(&dict, b"id", b"user", b"").unwrap();
        assert!(user.require_permissions(Permissions::PRINT).is_ok());
        assert!(matches!(
            user.require_permissions(Permissions::MODIFY),
            Err(PdfError::InsufficientPermissions)
        ));

        // Owner authentication is never limited by P.
        let owner = EncryptionState::from_dict(&dict, b"id", b"", b"owner").unwrap();
        assert!(owner.require_permissions(Permissions::MODIFY).is_ok());
    }

    #[test]
    fn test_aes256_rejected() {
        let mut dict = rc4_40_dict(b"u", b"o", -4, b"id");
        dict.set("V", 5);
        dict.set("R", 5);
        assert!(matches!(
            EncryptionState::from_dict(&dict, b"id", b"u", b""),
            Err(PdfError::UnsupportedEncryption(_))
        ));
    }

    #[test]
    fn test_identity_crypt_filter() {
        let mut dict = aes_dict(b"", b"o", -4, b"id");
        dict.set("StrF", Object::name("Identity"));
        let state = EncryptionState::from_dict(&dict, b"id", b"", b"").unwrap();

        // Strings bypass crypt; streams still use AES.
        let id = ObjectId::new(2, 0);
        assert_eq!(state.encrypt_string(id, b"plain").unwrap(), b"plain");
        assert_ne!(state.encrypt_stream_data(id, b"plain").unwrap(), b"plain");
    }
}
