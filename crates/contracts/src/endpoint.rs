//! Endpoint descriptor parsing
//!
//! Accepted forms:
//! - `tcp://host:port`
//! - `stomp://host:port`
//! - `failover:(tcp://h1:p1,tcp://h2:p2)?options`
//!
//! Query options are accepted and ignored.

use std::fmt;
use std::str::FromStr;

use crate::ContractError;

/// One broker address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parsed connection endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    addresses: Vec<BrokerAddress>,
    failover: bool,
}

impl Endpoint {
    /// Parse an endpoint descriptor
    pub fn parse(uri: &str) -> Result<Self, ContractError> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(ContractError::endpoint(uri, "endpoint is empty"));
        }

        if let Some(rest) = trimmed.strip_prefix("failover:") {
            let list = strip_group(rest).ok_or_else(|| {
                ContractError::endpoint(uri, "unbalanced parentheses in failover list")
            })?;
            let addresses = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_address(uri, s))
                .collect::<Result<Vec<_>, _>>()?;
            if addresses.is_empty() {
                return Err(ContractError::endpoint(uri, "failover list is empty"));
            }
            return Ok(Self {
                addresses,
                failover: true,
            });
        }

        Ok(Self {
            addresses: vec![parse_address(uri, trimmed)?],
            failover: false,
        })
    }

    /// Addresses in the order they should be tried
    pub fn addresses(&self) -> &[BrokerAddress] {
        &self.addresses
    }

    pub fn is_failover(&self) -> bool {
        self.failover
    }
}

impl FromStr for Endpoint {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = self
            .addresses
            .iter()
            .map(|a| format!("tcp://{a}"))
            .collect::<Vec<_>>()
            .join(",");
        if self.failover {
            write!(f, "failover:({list})")
        } else {
            f.write_str(&list)
        }
    }
}

/// `(a,b)?opts` -> `a,b`; bare `a,b?opts` -> `a,b`
fn strip_group(rest: &str) -> Option<&str> {
    match rest.strip_prefix('(') {
        Some(inner) => inner.rfind(')').map(|end| &inner[..end]),
        None if rest.contains(')') => None,
        None => Some(strip_query(rest)),
    }
}

fn strip_query(s: &str) -> &str {
    s.split_once('?').map_or(s, |(head, _)| head)
}

fn parse_address(uri: &str, raw: &str) -> Result<BrokerAddress, ContractError> {
    let raw = strip_query(raw);
    let authority = match raw.split_once("://") {
        Some(("tcp" | "stomp", authority)) => authority,
        Some((scheme, _)) => {
            return Err(ContractError::endpoint(
                uri,
                format!("unsupported scheme '{scheme}'"),
            ))
        }
        None => return Err(ContractError::endpoint(uri, format!("missing scheme in '{raw}'"))),
    };
    let authority = authority.trim_end_matches('/');

    let (host, port) = authority
        .rsplit_once(':')
        .ok_or_else(|| ContractError::endpoint(uri, format!("missing port in '{raw}'")))?;
    if host.is_empty() {
        return Err(ContractError::endpoint(uri, format!("missing host in '{raw}'")));
    }
    let port: u16 = port
        .parse()
        .map_err(|e| ContractError::endpoint(uri, format!("invalid port '{port}': {e}")))?;

    Ok(BrokerAddress {
        host: host.to_string(),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let ep = Endpoint::parse("tcp://localhost:61613").unwrap();
        assert!(!ep.is_failover());
        assert_eq!(ep.addresses()[0].host, "localhost");
        assert_eq!(ep.addresses()[0].port, 61613);
    }

    #[test]
    fn test_parse_failover_with_options() {
        let ep = Endpoint::parse(
            "failover:(tcp://mq01:61613,tcp://mq02:61614)?randomize=false",
        )
        .unwrap();
        assert!(ep.is_failover());
        assert_eq!(ep.addresses().len(), 2);
        assert_eq!(ep.addresses()[1].to_string(), "mq02:61614");
    }

    #[test]
    fn test_port_out_of_range() {
        let err = Endpoint::parse("failover:(tcp://localhost:616161)").unwrap_err();
        assert!(err.to_string().contains("invalid port"), "got: {err}");
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let err = Endpoint::parse("amqp://localhost:5672").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"), "got: {err}");
    }

    #[test]
    fn test_rejects_unbalanced_group() {
        assert!(Endpoint::parse("failover:(tcp://a:1").is_err());
        assert!(Endpoint::parse("failover:()").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let ep = Endpoint::parse("failover:(tcp://a:1,stomp://b:2)").unwrap();
        let again = Endpoint::parse(&ep.to_string()).unwrap();
        assert_eq!(ep, again);
    }
}
