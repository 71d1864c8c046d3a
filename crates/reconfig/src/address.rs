//! Server address - `host[:port]`

use std::fmt;
use std::str::FromStr;

use contracts::ContractError;

/// Port used when the address names none
pub const DEFAULT_PORT: u16 = 3000;

/// Parsed server address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    host: String,
    port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host[:port]`, falling back to `default_port`
    ///
    /// IPv6 hosts take a port only in bracket form (`[::1]:3000`); a bare
    /// IPv6 literal is read as a host without port.
    pub fn parse_with_default(s: &str, default_port: u16) -> Result<Self, ContractError> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| ContractError::parse(format!("unterminated '[' in address '{s}'")))?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(ContractError::parse(format!("unexpected '{tail}' in address '{s}'"))),
                },
            }
        } else {
            match s.split_once(':') {
                Some((host, port)) if !port.contains(':') => (host, Some(port)),
                _ => (s, None),
            }
        };

        if host.is_empty() {
            return Err(ContractError::parse(format!("missing host in address '{s}'")));
        }
        let port = match port {
            None | Some("") => default_port,
            Some(p) => p
                .parse::<u16>()
                .map_err(|e| ContractError::parse_with_source(format!("invalid port '{p}'"), e))?,
        };
        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ServerAddress {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default(s, DEFAULT_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
