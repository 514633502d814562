//! Run configuration

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Port for DNS communication
pub const DNS_PORT: u16 = 53;

/// Default number of concurrent workers
pub const DEFAULT_WORKER_COUNT: usize = 100;

/// Default time allowed for each query, in seconds
pub const DEFAULT_TIMEOUT: u64 = 2;

/// Default bound on the number of CNAME hops followed per candidate
pub const DEFAULT_MAX_CHASE_DEPTH: usize = 10;

/// Public resolvers used when none are given
pub const DEFAULT_RESOLVERS: &str = "8.8.8.8,1.1.1.1,8.8.4.4,9.9.9.9,149.112.112.112,\
    208.67.222.222,1.0.0.1,76.76.19.19,76.223.122.150";

/// Parameters of one resolution run.
#[derive(Clone, Debug)]
pub struct Config {
    /// Suffix appended to every candidate word
    pub domain: String,
    /// Number of concurrent workers; must be at least 1
    pub worker_count: usize,
    /// Name servers, assigned to workers round-robin; must not be empty
    pub resolvers: Vec<SocketAddr>,
    /// Duration before an unanswered query fails
    pub timeout: Duration,
    /// Maximum number of CNAME hops followed before giving up on a candidate
    pub max_chase_depth: usize,
    /// Overall time budget; once spent, workers drain the queue without
    /// querying
    pub deadline: Option<Duration>,
}

impl Config {
    /// Returns a configuration for `domain` using the default resolvers and
    /// limits.
    pub fn new(domain: &str) -> Config {
        Config {
            domain: domain.trim().trim_end_matches('.').to_owned(),
            worker_count: DEFAULT_WORKER_COUNT,
            resolvers: default_resolvers(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            max_chase_depth: DEFAULT_MAX_CHASE_DEPTH,
            deadline: None,
        }
    }

    /// Checks the invariants the resolution pool relies upon.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.resolvers.is_empty() {
            return Err(ConfigError::NoResolvers);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_chase_depth == 0 {
            return Err(ConfigError::NoChaseDepth);
        }
        Ok(())
    }
}

/// Represents an invalid configuration value.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// No target domain was given
    #[error("a target domain is required")]
    EmptyDomain,
    /// Worker count of zero
    #[error("at least one worker is required")]
    NoWorkers,
    /// Resolver list empty
    #[error("at least one resolver is required")]
    NoResolvers,
    /// Query timeout of zero
    #[error("query timeout must be greater than zero")]
    ZeroTimeout,
    /// Chase depth of zero
    #[error("maximum CNAME chase depth must be at least 1")]
    NoChaseDepth,
    /// A resolver entry could not be turned into a socket address
    #[error("invalid resolver address {addr:?}: {reason}")]
    InvalidResolver {
        /// The offending entry
        addr: String,
        /// Why it was rejected
        reason: String,
    },
}

/// Returns the built-in public resolvers on port 53.
pub fn default_resolvers() -> Vec<SocketAddr> {
    DEFAULT_RESOLVERS
        .split(',')
        .filter_map(|ip| ip.parse::<IpAddr>().ok())
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .collect()
}

/// Parses a comma-separated resolver list. Entries may be `ip`, `ip:port`,
/// `[ipv6]:port`, `host` or `host:port`; port 53 is used when none is given.
/// Blank entries are skipped.
pub fn parse_resolvers(list: &str) -> Result<Vec<SocketAddr>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_resolver)
        .collect()
}

/// Parses a single resolver entry; see `parse_resolvers`.
pub fn parse_resolver(entry: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = entry.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = entry.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DNS_PORT));
    }

    let invalid = |reason: String| ConfigError::InvalidResolver {
        addr: entry.to_owned(),
        reason,
    };

    let found = match entry.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| invalid(e.to_string()))?;
            (host, port).to_socket_addrs()
        }
        None => (entry, DNS_PORT).to_socket_addrs(),
    };

    found
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("host has no addresses".to_owned()))
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::{default_resolvers, parse_resolver, parse_resolvers, Config, ConfigError};

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_default_resolvers() {
        let list = default_resolvers();

        assert_eq!(list.len(), 9);
        assert_eq!(list[0], addr("8.8.8.8:53"));
        assert_eq!(list[8], addr("76.223.122.150:53"));
        assert!(list.iter().all(|a| a.port() == 53));
    }

    #[test]
    fn test_parse_resolvers() {
        let list = parse_resolvers("8.8.8.8, 1.1.1.1:5353,,[2001:db8::1]:53,2001:db8::2").unwrap();

        assert_eq!(list, [
            addr("8.8.8.8:53"),
            addr("1.1.1.1:5353"),
            addr("[2001:db8::1]:53"),
            addr("[2001:db8::2]:53"),
        ]);
        assert!(parse_resolvers("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_resolver_host() {
        assert_eq!(parse_resolver("localhost:5300").unwrap().port(), 5300);
        assert_eq!(parse_resolver("localhost").unwrap().port(), 53);
    }

    #[test]
    fn test_parse_resolver_invalid() {
        match parse_resolver("8.8.8.8:notaport") {
            Err(ConfigError::InvalidResolver { addr, .. }) => assert_eq!(addr, "8.8.8.8:notaport"),
            r => panic!("unexpected result {:?}", r),
        }
    }

    #[test]
    fn test_validate() {
        let cfg = Config::new("example.com.");
        assert_eq!(cfg.domain, "example.com");
        assert_eq!(cfg.worker_count, 100);
        assert_eq!(cfg.max_chase_depth, 10);
        assert!(cfg.validate().is_ok());

        assert_eq!(Config::new("  ").validate(), Err(ConfigError::EmptyDomain));
        assert_eq!(Config { worker_count: 0, ..cfg.clone() }.validate(), Err(ConfigError::NoWorkers));
        assert_eq!(Config { resolvers: Vec::new(), ..cfg.clone() }.validate(),
            Err(ConfigError::NoResolvers));
        assert_eq!(Config { timeout: Duration::ZERO, ..cfg.clone() }.validate(),
            Err(ConfigError::ZeroTimeout));
        assert_eq!(Config { max_chase_depth: 0, ..cfg }.validate(), Err(ConfigError::NoChaseDepth));
    }
}
