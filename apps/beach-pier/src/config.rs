use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 3000;
const DEFAULT_OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Parser)]
#[command(
    name = "beach-pier",
    author,
    version,
    about = "Beach Pier rendezvous and signaling relay"
)]
pub struct Cli {
    /// Interface to bind the listener to.
    #[arg(long, env = "BEACH_PIER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to accept signaling connections on.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Messages queued per connection before further deliveries are dropped.
    #[arg(
        long,
        env = "BEACH_PIER_OUTBOUND_BUFFER",
        default_value_t = DEFAULT_OUTBOUND_BUFFER
    )]
    pub outbound_buffer: usize,

    /// Seconds to wait after the listener stops before exiting.
    #[arg(long, env = "BEACH_PIER_SHUTDOWN_GRACE_SECS", default_value_t = 0)]
    pub shutdown_grace_secs: u64,

    /// tracing filter directive, e.g. `info` or `beach_pier=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_filter: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub outbound_buffer: usize,
    pub shutdown_grace: Duration,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            shutdown_grace: Duration::ZERO,
            log_filter: "info".to_string(),
        }
    }
}

impl TryFrom<Cli> for ServerConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let host: IpAddr = cli
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidListenAddr {
                addr: cli.host.clone(),
                source,
            })?;
        if cli.outbound_buffer == 0 {
            return Err(ConfigError::ZeroOutboundBuffer);
        }
        Ok(ServerConfig {
            listen_addr: SocketAddr::new(host, cli.port),
            outbound_buffer: cli.outbound_buffer,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
            log_filter: cli.log_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("beach-pier").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn builds_listen_address_from_host_and_port() {
        let config =
            ServerConfig::try_from(parse(&["--host", "0.0.0.0", "--port", "3000"])).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.outbound_buffer, 64);
        assert_eq!(config.shutdown_grace, Duration::ZERO);
    }

    #[test]
    fn accepts_ipv6_hosts() {
        let config = ServerConfig::try_from(parse(&["--host", "::1", "--port", "9000"])).unwrap();
        assert_eq!(config.listen_addr, "[::1]:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn rejects_bad_host() {
        let err = ServerConfig::try_from(parse(&["--host", "not-an-ip"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidListenAddr { .. }));
    }

    #[test]
    fn rejects_zero_outbound_buffer() {
        let err = ServerConfig::try_from(parse(&["--host", "127.0.0.1", "--outbound-buffer", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroOutboundBuffer));
    }
}
