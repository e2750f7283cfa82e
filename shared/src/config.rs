//! Network configuration shared by both binaries and the test harness

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_MAX_CLIENTS: u8 = 8;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetConfig {
    pub server_address: IpAddr,
    pub server_port: u16,
    /// 0 lets the OS pick an ephemeral port
    pub client_port: u16,
    pub max_clients: u8,
    /// A session with no accepted message for longer than this is dropped
    pub timeout: Duration,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            server_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            server_port: DEFAULT_SERVER_PORT,
            client_port: 0,
            max_clients: DEFAULT_MAX_CLIENTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl NetConfig {
    /// Where clients send to
    pub fn server_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    /// Server listens on the configured address and port
    pub fn server_bind_addr(&self) -> SocketAddr {
        self.server_endpoint()
    }

    /// Clients bind the unspecified address of the server's family
    pub fn client_bind_addr(&self) -> SocketAddr {
        let ip = match self.server_address {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        };
        SocketAddr::new(ip, self.client_port)
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.server_port = port;
        self
    }

    pub fn with_max_clients(mut self, max_clients: u8) -> Self {
        self.max_clients = max_clients;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
