//! WireGuard identities and configuration text
//!
//! Generates X25519 key pairs for both ends of an on-demand tunnel and
//! renders `wg-quick` configuration files for either side.
//!
//! # Example
//!
//! ```rust
//! use wod_wireguard::{Interface, KeyPair, Peer, TunnelConfig};
//!
//! let server = KeyPair::generate()?;
//! let client = KeyPair::generate()?;
//!
//! let config = TunnelConfig::new(Interface::from_key(&server.private).with_listen_port(51820))
//!     .with_peer(Peer::from_key(&client.public).allow("10.0.0.2/24"));
//!
//! assert!(config.render().starts_with("[Interface]\n"));
//! # Ok::<(), wod_wireguard::KeyError>(())
//! ```

mod config;
mod keys;

pub use config::{Endpoint, Interface, Peer, TunnelConfig};
pub use keys::{KEY_LEN, KeyError, KeyPair, KeySource, OsKeySource, PrivateKey, PublicKey, clamp};
