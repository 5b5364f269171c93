use std::time::Duration;

use clap::Parser;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3333;

#[derive(Parser, Debug, Clone)]
#[command(name = "jsonrelay", version, about = "Relay JSON envelopes between TCP clients")]
pub struct ServerConfig {
    /// Port the server listens on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Give up on a write to a peer after this many milliseconds. Unset means
    /// writes may block for as long as the peer does.
    #[arg(long)]
    pub write_timeout_ms: Option<u64>,
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            write_timeout_ms: None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "jsonrelay-client", version, about = "Talk to a jsonrelay server from stdin")]
pub struct ClientConfig {
    #[arg(long, default_value = DEFAULT_HOST)]
    pub server_host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub server_port: u16,
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Installs the fmt subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsonrelay=debug,jsonrelay_client=debug".into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let cfg = ServerConfig::parse_from(["jsonrelay"]);
        assert_eq!(cfg.listen_addr(), "localhost:3333");
        assert_eq!(cfg.write_timeout(), None);
    }

    #[test]
    fn server_flags() {
        let cfg = ServerConfig::parse_from(["jsonrelay", "--port", "4000", "--write-timeout-ms", "250"]);
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.write_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn client_flags() {
        let cfg = ClientConfig::parse_from(["jsonrelay-client"]);
        assert_eq!(cfg.server_addr(), "localhost:3333");

        let cfg = ClientConfig::parse_from([
            "jsonrelay-client",
            "--server-host",
            "10.1.2.3",
            "--server-port",
            "7000",
        ]);
        assert_eq!(cfg.server_addr(), "10.1.2.3:7000");
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(ServerConfig::try_parse_from(["jsonrelay", "--port", "huge"]).is_err());
    }
}
