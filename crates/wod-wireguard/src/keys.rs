//! WireGuard Key Management
//!
//! Provides X25519 key pair generation for both ends of the tunnel.
//!
//! Keys are raw 32-byte values internally and only become base64 text
//! at serialization boundaries (rendered configs, engine outputs).

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use std::fmt;
use x25519_dalek::{X25519_BASEPOINT_BYTES, x25519};

/// Length of a raw X25519 key
pub const KEY_LEN: usize = 32;

/// Apply the X25519 scalar clamp
pub fn clamp(mut bytes: [u8; KEY_LEN]) -> [u8; KEY_LEN] {
    bytes[0] &= 0xF8;
    bytes[31] &= 0x7F;
    bytes[31] |= 0x40;
    bytes
}

/// WireGuard private key (clamped Curve25519 scalar)
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    bytes: [u8; KEY_LEN],
}

impl PrivateKey {
    /// Create from raw bytes, clamping them
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: clamp(bytes),
        }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        decode_key(s).map(Self::from_bytes)
    }

    /// Derive the public key by scalar multiplication with the base point
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: x25519(self.bytes, X25519_BASEPOINT_BYTES),
        }
    }

    /// Get raw bytes
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([redacted])")
    }
}

/// WireGuard public key (Curve25519 point)
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; KEY_LEN],
}

impl PublicKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Create from base64 string
    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        decode_key(s).map(Self::from_bytes)
    }

    /// Get raw bytes
    pub fn to_bytes(&self) -> [u8; KEY_LEN] {
        self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_base64()[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

fn decode_key(s: &str) -> Result<[u8; KEY_LEN], KeyError> {
    let bytes = BASE64.decode(s).map_err(|_| KeyError::InvalidBase64)?;
    bytes.try_into().map_err(|_| KeyError::InvalidLength)
}

/// A key pair (private + public), always produced together
#[derive(Clone)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair from the OS entropy source
    pub fn generate() -> Result<Self, KeyError> {
        Self::generate_from(&mut OsRng)
    }

    /// Generate a key pair from the given CSPRNG.
    ///
    /// A failing source is fatal: there is no retry.
    pub fn generate_from<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyError> {
        let mut bytes = [0u8; KEY_LEN];
        rng.try_fill_bytes(&mut bytes)
            .map_err(|e| KeyError::Entropy(e.to_string()))?;
        Ok(Self::from_private(PrivateKey::from_bytes(bytes)))
    }

    /// Create from a private key
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish()
    }
}

/// Source of fresh tunnel identities
pub trait KeySource {
    /// Produce a new key pair
    fn generate(&mut self) -> Result<KeyPair, KeyError>;
}

/// Key source backed by the operating system's CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeySource;

impl KeySource for OsKeySource {
    fn generate(&mut self) -> Result<KeyPair, KeyError> {
        KeyPair::generate()
    }
}

/// Key errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyError {
    #[error("Entropy source failed: {0}")]
    Entropy(String),

    #[error("Invalid base64 encoding")]
    InvalidBase64,

    #[error("Invalid key length (expected 32 bytes)")]
    InvalidLength,
}
