//! Server address for direct Bolt connections.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::io;

/// Default Bolt port.
pub const DEFAULT_BOLT_PORT: u16 = 7687;

/// A resolved host/port pair identifying one Bolt server.
///
/// URI parsing is handled by higher layers; this type only carries the
/// address the socket layer connects to and the pool keys its queues by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoltServerAddress {
    /// Host name or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl BoltServerAddress {
    /// Create an address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Resolve to socket addresses for connecting.
    pub fn to_socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

impl Default for BoltServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_BOLT_PORT)
    }
}

impl fmt::Display for BoltServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = BoltServerAddress::new("db.example.com", 7687);
        assert_eq!(addr.to_string(), "db.example.com:7687");
    }

    #[test]
    fn test_default() {
        let addr = BoltServerAddress::default();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, DEFAULT_BOLT_PORT);
    }

    #[test]
    fn test_equality_and_hash_key() {
        use std::collections::HashMap;

        let a = BoltServerAddress::new("localhost", 7687);
        let b = BoltServerAddress::new("localhost", 7687);
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get(&b), Some(&1));
    }
}
