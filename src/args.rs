use std::net::{AddrParseError, IpAddr, SocketAddr};

use clap::Parser;

use crate::token::{self, ConfigError, TokenConfig};

#[derive(Parser)]
#[command(version, about)]
pub struct Args {
    /// The address to listen on. By default only the
    /// IPv4 loopback is used.
    #[arg(short, long)]
    address: Option<String>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Where users are stored, as a SQLite url.
    /// The database is created if it doesn't exist.
    #[arg(long, env = "ACCOUNTD_DATABASE", default_value = "sqlite://accountd.db")]
    database: String,

    /// Secret used to sign and verify session tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Token signing algorithm: HS256, HS384 or HS512.
    #[arg(long, env = "JWT_ALGORITHM", default_value = "HS256")]
    algorithm: String,

    /// How long a session token stays valid, in seconds.
    #[arg(long, env = "TOKEN_TTL", default_value_t = token::DEFAULT_TTL_SECS)]
    token_ttl: u64,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn token_config(&self) -> Result<TokenConfig, ConfigError> {
        TokenConfig::new(&self.secret, &self.algorithm, self.token_ttl)
    }
}
