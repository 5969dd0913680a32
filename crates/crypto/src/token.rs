//! DES-CBC authentication token

use base64::{Engine, engine::general_purpose::STANDARD};
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use std::fmt;
use thiserror::Error;

type DesCbcEnc = cbc::Encryptor<des::Des>;

/// DES key shared by every printer ("a85e9d68")
pub const ENCRYPTION_KEY: [u8; 8] = [0x61, 0x38, 0x35, 0x65, 0x39, 0x64, 0x36, 0x38];

/// CBC initialization vector
pub const IV: [u8; 8] = [0u8; 8];

/// Suffix the firmware expects after the ciphertext of passwords longer than
/// [`LOWER_KEY_THRESHOLD`] characters
pub const LOWER_KEY: [u8; 8] = [0xAC, 0x47, 0xB0, 0x02, 0x88, 0x15, 0x6E, 0x5C];

/// Longest password that still yields a token the printer accepts
pub const MAX_PASSWORD_LEN: usize = 8;

/// Passwords longer than this get [`LOWER_KEY`] appended
pub const LOWER_KEY_THRESHOLD: usize = 4;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Password must not be empty")]
    EmptyPassword,

    #[error(
        "Password must be at most {max} characters, got {len} \
         (longer passwords are accepted by the printer but produce token errors)"
    )]
    PasswordTooLong { len: usize, max: usize },

    #[error("Password must be ASCII")]
    NonAsciiPassword,
}

/// Base64 authentication token attached to outbound commands
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Raw bytes behind the base64 text (8 or 16 bytes)
    pub fn to_bytes(&self) -> Vec<u8> {
        // Built from STANDARD encoding in `derive_token`, so decoding cannot fail.
        STANDARD.decode(&self.0).unwrap_or_default()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

impl AsRef<str> for Token {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check a password against the firmware constraints without deriving anything
pub fn validate_password(password: &str) -> Result<(), TokenError> {
    if password.is_empty() {
        return Err(TokenError::EmptyPassword);
    }

    let len = password.chars().count();
    if len > MAX_PASSWORD_LEN {
        return Err(TokenError::PasswordTooLong {
            len,
            max: MAX_PASSWORD_LEN,
        });
    }

    if !password.is_ascii() {
        return Err(TokenError::NonAsciiPassword);
    }

    Ok(())
}

/// Derive the authentication token for `password`
pub fn derive_token(password: &str) -> Result<Token, TokenError> {
    validate_password(password)?;

    let ciphertext = DesCbcEnc::new(&ENCRYPTION_KEY.into(), &IV.into())
        .encrypt_padded_vec_mut::<Pkcs7>(password.as_bytes());

    // Only the first block is used; an 8-character password also produces a
    // full padding block which is dropped here.
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&ciphertext[..8]);

    if password.len() > LOWER_KEY_THRESHOLD {
        data.extend_from_slice(&LOWER_KEY);
    }

    Ok(Token(STANDARD.encode(&data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        let cases = [
            ("a", "yDsTd3KDH50="),
            ("abc", "E/8A0f6OHM4="),
            ("1234", "lTAPwGi4umM="),
            ("12345", "dh0hxY3ELpKsR7ACiBVuXA=="),
            ("12345678", "uUR3lPKfxcGsR7ACiBVuXA=="),
            ("password", "SxXl0ERBH9msR7ACiBVuXA=="),
        ];

        for (password, expected) in cases {
            let token = derive_token(password).unwrap();
            assert_eq!(token.as_str(), expected, "password {password:?}");
        }
    }

    #[test]
    fn test_short_passwords_yield_one_block() {
        for password in ["x", "ab", "xyz", "1234"] {
            let token = derive_token(password).unwrap();
            assert_eq!(token.to_bytes().len(), 8, "password {password:?}");
        }
    }

    #[test]
    fn test_long_passwords_carry_lower_key() {
        for password in ["12345", "abcdef", "abcdefg", "abcdefgh"] {
            let bytes = derive_token(password).unwrap().to_bytes();
            assert_eq!(bytes.len(), 16, "password {password:?}");
            assert_eq!(&bytes[8..], &LOWER_KEY);
        }
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert_eq!(derive_token(""), Err(TokenError::EmptyPassword));
        assert_eq!(
            derive_token("123456789"),
            Err(TokenError::PasswordTooLong { len: 9, max: 8 })
        );
        assert_eq!(derive_token("pässwd"), Err(TokenError::NonAsciiPassword));
    }

    #[test]
    fn test_deterministic() {
        let a = derive_token("secret").unwrap();
        let b = derive_token("secret").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, derive_token("secreT").unwrap());
    }

    #[test]
    fn test_concurrent_derivation() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| derive_token("1234").unwrap()))
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str(), "lTAPwGi4umM=");
        }
    }

    #[test]
    fn test_debug_redacts() {
        let token = derive_token("1234").unwrap();
        assert!(!format!("{token:?}").contains("lTAP"));
    }
}
