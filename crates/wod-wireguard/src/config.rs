//! Tunnel Configuration
//!
//! In-memory model of one endpoint's WireGuard configuration (its own
//! identity plus the peers it trusts) and its canonical `wg-quick` text.
//!
//! The server and client sides are two independent `TunnelConfig` values;
//! neither references the other.
//!
//! Rendering never validates: keys and addresses are opaque text here and
//! are checked (if at all) by whoever produced them.

use crate::keys::{PrivateKey, PublicKey};
use std::fmt;

/// Remote endpoint (host + UDP port)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address
    pub host: String,
    /// UDP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The `[Interface]` side of a config: this endpoint's own identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interface {
    /// Private key (base64)
    pub private_key: String,
    /// UDP listen port; `None` or `Some(0)` is not rendered
    pub listen_port: Option<u16>,
    /// Tunnel address in CIDR form
    pub address: Option<String>,
    /// DNS server used inside the tunnel
    pub dns: Option<String>,
}

impl Interface {
    /// Create an interface from a private key
    pub fn new(private_key: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            ..Self::default()
        }
    }

    /// Create an interface for a generated private key
    pub fn from_key(private_key: &PrivateKey) -> Self {
        Self::new(private_key.to_base64())
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_dns(mut self, dns: impl Into<String>) -> Self {
        self.dns = Some(dns.into());
        self
    }
}

/// A `[Peer]` block: the public description of a remote party
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peer {
    /// Peer's public key (base64)
    pub public_key: String,
    /// Where to reach the peer, `host:port`
    pub endpoint: Option<String>,
    /// Allowed IPs in CIDR notation, in insertion order
    pub allowed_ips: Vec<String>,
}

impl Peer {
    /// Create a peer from a public key
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Self::default()
        }
    }

    /// Create a peer for a generated public key
    pub fn from_key(public_key: &PublicKey) -> Self {
        Self::new(public_key.to_base64())
    }

    pub fn with_endpoint(mut self, endpoint: &Endpoint) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    /// Append an allowed CIDR, keeping the first occurrence of duplicates
    pub fn allow(mut self, cidr: impl Into<String>) -> Self {
        let cidr = cidr.into();
        if !self.allowed_ips.contains(&cidr) {
            self.allowed_ips.push(cidr);
        }
        self
    }
}

/// Complete configuration of one tunnel endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelConfig {
    pub interface: Interface,
    pub peers: Vec<Peer>,
}

impl TunnelConfig {
    /// Create a configuration with no peers
    pub fn new(interface: Interface) -> Self {
        Self {
            interface,
            peers: Vec::new(),
        }
    }

    /// Add a peer after the existing ones
    pub fn with_peer(mut self, peer: Peer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Render to the canonical `wg-quick` text
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Interface]")?;
        writeln!(f, "PrivateKey = {}", self.private_key)?;
        if let Some(port) = self.listen_port.filter(|p| *p != 0) {
            writeln!(f, "ListenPort = {}", port)?;
        }
        if let Some(address) = non_empty(&self.address) {
            writeln!(f, "Address = {}", address)?;
        }
        if let Some(dns) = non_empty(&self.dns) {
            writeln!(f, "DNS = {}", dns)?;
        }
        Ok(())
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", self.public_key)?;
        if let Some(endpoint) = non_empty(&self.endpoint) {
            writeln!(f, "Endpoint = {}", endpoint)?;
        }
        // An empty list still yields the key with no value
        writeln!(f, "AllowedIPs = {}", self.allowed_ips.join(","))
    }
}

impl fmt::Display for TunnelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.interface)?;
        for peer in &self.peers {
            writeln!(f)?;
            write!(f, "{}", peer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    const PRIV: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
    const PUB: &str = "BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBA=";

    #[test]
    fn test_endpoint_display() {
        let ep = Endpoint::new("1.2.3.4", 51820);
        assert_eq!(ep.to_string(), "1.2.3.4:51820");
    }

    #[test]
    fn test_interface_minimal() {
        let iface = Interface {
            private_key: PRIV.to_string(),
            listen_port: Some(0),
            address: Some(String::new()),
            dns: Some(String::new()),
        };

        assert_eq!(
            iface.to_string(),
            format!("[Interface]\nPrivateKey = {PRIV}\n")
        );
    }

    #[test]
    fn test_interface_full_order() {
        let iface = Interface::new(PRIV)
            .with_listen_port(51820)
            .with_address("10.0.0.2/24")
            .with_dns("1.1.1.1");

        assert_eq!(
            iface.to_string(),
            format!(
                "[Interface]\nPrivateKey = {PRIV}\nListenPort = 51820\nAddress = 10.0.0.2/24\nDNS = 1.1.1.1\n"
            )
        );
    }

    #[test]
    fn test_peer_without_endpoint() {
        let peer = Peer::new(PUB).allow("0.0.0.0/0");
        let text = peer.to_string();

        assert!(!text.contains("Endpoint"));
        assert_eq!(text, format!("[Peer]\nPublicKey = {PUB}\nAllowedIPs = 0.0.0.0/0\n"));
    }

    #[test]
    fn test_peer_empty_allowed_ips() {
        let text = Peer::new(PUB).to_string();
        assert!(text.ends_with("AllowedIPs = \n"));
    }

    #[test]
    fn test_peer_allowed_ips_order() {
        let peer = Peer::new(PUB)
            .with_endpoint(&Endpoint::new("vpn.example.net", 51820))
            .allow("10.0.0.0/24")
            .allow("192.168.0.0/16")
            .allow("10.0.0.0/24");

        assert_eq!(peer.allowed_ips.len(), 2);
        assert!(peer.to_string().contains("Endpoint = vpn.example.net:51820\n"));
        assert!(peer.to_string().contains("AllowedIPs = 10.0.0.0/24,192.168.0.0/16\n"));
    }

    #[test]
    fn test_config_blocks_separated() {
        let config = TunnelConfig::new(Interface::new(PRIV).with_listen_port(51820))
            .with_peer(Peer::new("first").allow("10.0.0.2/32"))
            .with_peer(Peer::new("second").allow("10.0.0.3/32"));

        let expected = format!(
            "[Interface]\nPrivateKey = {PRIV}\nListenPort = 51820\n\
             \n[Peer]\nPublicKey = first\nAllowedIPs = 10.0.0.2/32\n\
             \n[Peer]\nPublicKey = second\nAllowedIPs = 10.0.0.3/32\n"
        );
        assert_eq!(config.render(), expected);
    }

    #[test]
    fn test_render_deterministic() {
        let keys = KeyPair::generate().unwrap();
        let config = TunnelConfig::new(Interface::from_key(&keys.private))
            .with_peer(Peer::from_key(&keys.public).allow("0.0.0.0/0"));

        assert_eq!(config.render(), config.render());
        assert!(config.render().contains(&keys.public.to_base64()));
    }

    #[test]
    fn test_opaque_key_text() {
        let config = TunnelConfig::new(Interface::new("not base64 at all"));
        assert!(config.render().contains("PrivateKey = not base64 at all\n"));
    }
}
