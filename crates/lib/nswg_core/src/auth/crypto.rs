//! AES-256-CBC encryption for refresh tokens at rest.
//!
//! Each call draws a random 16-byte IV. Output is `ivHex:cipherHex`, which
//! fits a TEXT column.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use super::AuthError;
use super::config::EncryptionKey;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// IV size for AES-CBC (one block, 16 bytes).
const IV_SIZE: usize = 16;

/// Symmetric cipher bound to the configured key.
#[derive(Debug, Clone)]
pub struct TokenCipher {
    key: EncryptionKey,
}

impl TokenCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypt plaintext, returning `ivHex:cipherHex`.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut iv = [0u8; IV_SIZE];
        rand::rng().fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(self.key.as_bytes(), &iv)
            .map_err(|e| AuthError::Internal(format!("cipher init failed: {e}")))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    /// Decrypt an `ivHex:cipherHex` value.
    pub fn decrypt(&self, encoded: &str) -> Result<String, AuthError> {
        let parts: Vec<&str> = encoded.split(':').collect();
        let [iv_hex, cipher_hex] = parts.as_slice() else {
            return Err(AuthError::InvalidTokenFormat(format!(
                "expected 2 ':'-separated parts, got {}",
                parts.len()
            )));
        };

        let iv = hex::decode(iv_hex)
            .map_err(|e| AuthError::InvalidTokenFormat(format!("iv is not hex: {e}")))?;
        if iv.len() != IV_SIZE {
            return Err(AuthError::InvalidTokenFormat(format!(
                "iv must be {IV_SIZE} bytes, got {}",
                iv.len()
            )));
        }
        let ciphertext = hex::decode(cipher_hex)
            .map_err(|e| AuthError::InvalidTokenFormat(format!("ciphertext is not hex: {e}")))?;

        let cipher = Aes256CbcDec::new_from_slices(self.key.as_bytes(), &iv)
            .map_err(|e| AuthError::Internal(format!("cipher init failed: {e}")))?;
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|e| AuthError::Decryption(format!("bad padding: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| AuthError::Decryption(format!("UTF-8 decode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(EncryptionKey::from_hex(&"ab".repeat(32)).unwrap())
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let c = cipher();
        let long = "long".repeat(100);
        for plaintext in ["x", "discord-refresh-token-abc123", "ünïcødé 🔑", long.as_str()] {
            let encrypted = c.encrypt(plaintext).unwrap();
            assert_ne!(encrypted, plaintext);
            assert_eq!(c.decrypt(&encrypted).unwrap(), plaintext);
        }
    }

    #[test]
    fn same_plaintext_gets_fresh_iv() {
        let c = cipher();
        let a = c.encrypt("refresh").unwrap();
        let b = c.encrypt("refresh").unwrap();
        assert_ne!(a, b);
        assert_eq!(c.decrypt(&a).unwrap(), "refresh");
        assert_eq!(c.decrypt(&b).unwrap(), "refresh");
    }

    #[test]
    fn output_is_iv_hex_colon_cipher_hex() {
        let encrypted = cipher().encrypt("refresh").unwrap();
        let (iv, body) = encrypted.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_SIZE * 2);
        assert!(iv.chars().all(|c| c.is_ascii_hexdigit()));
        // One padded block.
        assert_eq!(body.len(), 32);
    }

    #[test]
    fn wrong_delimiter_count_is_invalid_format() {
        let c = cipher();
        let encrypted = c.encrypt("refresh").unwrap();
        let no_colon = encrypted.replace(':', "");
        let extra_colon = format!("{encrypted}:00");
        for bad in [no_colon.as_str(), extra_colon.as_str(), "", "a:b:c"] {
            assert!(
                matches!(c.decrypt(bad), Err(AuthError::InvalidTokenFormat(_))),
                "expected InvalidTokenFormat for {bad:?}"
            );
        }
    }

    #[test]
    fn non_hex_parts_are_invalid_format() {
        let c = cipher();
        assert!(matches!(c.decrypt("nothex:00"), Err(AuthError::InvalidTokenFormat(_))));
        assert!(matches!(c.decrypt("0011:00"), Err(AuthError::InvalidTokenFormat(_))));
    }

    #[test]
    fn wrong_key_fails() {
        let encrypted = cipher().encrypt("refresh-token-value").unwrap();
        let other = TokenCipher::new(EncryptionKey::from_hex(&"cd".repeat(32)).unwrap());
        // A wrong key almost always breaks the padding; if it happens to
        // parse, the result must still differ from the plaintext.
        match other.decrypt(&encrypted) {
            Err(AuthError::Decryption(_)) => {}
            Ok(s) => assert_ne!(s, "refresh-token-value"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
