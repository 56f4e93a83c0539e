//! Deployment outputs
//!
//! The engine reports outputs as an untyped JSON object. `DeploymentOutputs`
//! is the typed view this tool relies on; decoding fails loudly instead of
//! letting a half-populated map reach the client config.

use serde_json::{Map, Value};

/// Output keys exported by the deployment
pub mod keys {
    pub const SERVER_ENDPOINT: &str = "server-endpoint";
    pub const SERVER_LISTEN_PORT: &str = "server-listen-port";
    pub const SERVER_PUBLIC_KEY: &str = "server-public-key";
    pub const CLIENT_PRIVATE_KEY: &str = "client-private-key";
    pub const CLIENT_PUBLIC_KEY: &str = "client-public-key";
    pub const CLIENT_ADDRESS: &str = "client-address";
}

/// Raw outputs as returned by an engine
pub type EngineOutputs = Map<String, Value>;

/// Typed outputs of a successful apply
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentOutputs {
    /// Public address of the server
    pub server_endpoint: String,
    /// UDP port the server listens on
    pub server_listen_port: u16,
    /// Server public key (base64)
    pub server_public_key: String,
    /// Client private key (base64)
    pub client_private_key: String,
    /// Client public key (base64), informational
    pub client_public_key: Option<String>,
    /// Client tunnel address (CIDR)
    pub client_address: String,
}

impl DeploymentOutputs {
    /// Decode the required outputs from an engine's output map
    pub fn decode(outputs: &EngineOutputs) -> Result<Self, OutputError> {
        Ok(Self {
            server_endpoint: required_str(outputs, keys::SERVER_ENDPOINT)?,
            server_listen_port: required_port(outputs, keys::SERVER_LISTEN_PORT)?,
            server_public_key: required_str(outputs, keys::SERVER_PUBLIC_KEY)?,
            client_private_key: required_str(outputs, keys::CLIENT_PRIVATE_KEY)?,
            client_public_key: optional_str(outputs, keys::CLIENT_PUBLIC_KEY)?,
            client_address: required_str(outputs, keys::CLIENT_ADDRESS)?,
        })
    }
}

impl std::fmt::Debug for DeploymentOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOutputs")
            .field("server_endpoint", &self.server_endpoint)
            .field("server_listen_port", &self.server_listen_port)
            .field("server_public_key", &self.server_public_key)
            .field("client_private_key", &"[redacted]")
            .field("client_public_key", &self.client_public_key)
            .field("client_address", &self.client_address)
            .finish()
    }
}

fn optional_str(outputs: &EngineOutputs, key: &'static str) -> Result<Option<String>, OutputError> {
    match outputs.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(OutputError::WrongType {
            key,
            expected: "string",
            found: type_name(other),
        }),
    }
}

fn required_str(outputs: &EngineOutputs, key: &'static str) -> Result<String, OutputError> {
    optional_str(outputs, key)?.ok_or(OutputError::Missing(key))
}

fn required_port(outputs: &EngineOutputs, key: &'static str) -> Result<u16, OutputError> {
    let value = match outputs.get(key) {
        None | Some(Value::Null) => return Err(OutputError::Missing(key)),
        Some(value) => value,
    };

    let Value::Number(number) = value else {
        return Err(OutputError::WrongType {
            key,
            expected: "number",
            found: type_name(value),
        });
    };

    // Engines commonly report numbers as doubles
    let port = match number.as_u64() {
        Some(n) => Some(n),
        None => number
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0)
            .map(|f| f as u64),
    };

    port.and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0)
        .ok_or_else(|| OutputError::OutOfRange {
            key,
            value: number.to_string(),
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Output contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("Missing required output '{0}'")]
    Missing(&'static str),

    #[error("Output '{key}' has type {found}, expected {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Output '{key}' is not a valid port: {value}")]
    OutOfRange { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> EngineOutputs {
        let value = json!({
            "server-endpoint": "1.2.3.4",
            "server-listen-port": 51820,
            "server-public-key": "SPUB",
            "client-private-key": "CPRIV",
            "client-address": "10.0.0.2/24",
        });
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_decode_complete() {
        let outputs = DeploymentOutputs::decode(&sample()).unwrap();

        assert_eq!(outputs.server_endpoint, "1.2.3.4");
        assert_eq!(outputs.server_listen_port, 51820);
        assert_eq!(outputs.server_public_key, "SPUB");
        assert_eq!(outputs.client_private_key, "CPRIV");
        assert_eq!(outputs.client_address, "10.0.0.2/24");
        assert!(outputs.client_public_key.is_none());
    }

    #[test]
    fn test_decode_float_port() {
        let mut map = sample();
        map.insert(keys::SERVER_LISTEN_PORT.into(), json!(51820.0));
        assert_eq!(DeploymentOutputs::decode(&map).unwrap().server_listen_port, 51820);
    }

    #[test]
    fn test_decode_missing_key() {
        let mut map = sample();
        map.remove(keys::SERVER_PUBLIC_KEY);
        assert_eq!(
            DeploymentOutputs::decode(&map).unwrap_err(),
            OutputError::Missing(keys::SERVER_PUBLIC_KEY)
        );
    }

    #[test]
    fn test_decode_wrong_type() {
        let mut map = sample();
        map.insert(keys::SERVER_ENDPOINT.into(), json!(1234));
        assert!(matches!(
            DeploymentOutputs::decode(&map),
            Err(OutputError::WrongType { key: keys::SERVER_ENDPOINT, .. })
        ));

        let mut map = sample();
        map.insert(keys::SERVER_LISTEN_PORT.into(), json!("51820"));
        assert!(matches!(
            DeploymentOutputs::decode(&map),
            Err(OutputError::WrongType { key: keys::SERVER_LISTEN_PORT, .. })
        ));
    }

    #[test]
    fn test_decode_bad_port() {
        for bad in [json!(70000), json!(-1), json!(0), json!(51820.5)] {
            let mut map = sample();
            map.insert(keys::SERVER_LISTEN_PORT.into(), bad);
            assert!(matches!(
                DeploymentOutputs::decode(&map),
                Err(OutputError::OutOfRange { .. })
            ));
        }
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let outputs = DeploymentOutputs::decode(&sample()).unwrap();
        assert!(!format!("{:?}", outputs).contains("CPRIV"));
    }
}
