//! Partial Unix `resolv.conf(5)` parser, used to borrow the system's
//! name servers instead of the built-in public list.

use std::cmp::min;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use log::warn;

use crate::config::DNS_PORT;

/// Maximum allowed value of `"options timeout:n"`
pub const MAX_TIMEOUT: u64 = 30;

/// Path to system `resolv.conf`
pub const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

/// Name server settings read from `resolv.conf`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SystemResolvers {
    /// Name servers, in file order
    pub name_servers: Vec<SocketAddr>,
    /// Query timeout from `"options timeout:n"`, if present
    pub timeout: Option<Duration>,
}

/// Examines system `resolv.conf` and returns its name servers. If the file
/// cannot be read or lists no name servers, an error is returned.
pub fn load() -> io::Result<SystemResolvers> {
    load_from(RESOLV_CONF_PATH)
}

/// Like `load`, reading the file at `path`.
pub fn load_from<P: AsRef<Path>>(path: P) -> io::Result<SystemResolvers> {
    parse(BufReader::new(File::open(path)?))
}

fn parse<R: BufRead>(r: R) -> io::Result<SystemResolvers> {
    let mut cfg = SystemResolvers::default();

    for line in r.lines() {
        let line = line?;

        if line.is_empty() || line.starts_with(|c| c == '#' || c == ';') {
            continue;
        }

        let mut words = line.split_whitespace();

        match words.next() {
            Some("nameserver") => {
                if let Some(ip) = words.next() {
                    // Strip a zone index, e.g. "fe80::1%eth0"
                    let ip = ip.split('%').next().unwrap_or(ip);
                    match ip.parse::<IpAddr>() {
                        Ok(ip) => cfg.name_servers.push(SocketAddr::new(ip, DNS_PORT)),
                        Err(_) => warn!("ignoring unparsable nameserver {:?}", ip),
                    }
                }
            }
            Some("options") => {
                for opt in words {
                    if let Some(value) = opt.strip_prefix("timeout:") {
                        if let Ok(n) = value.parse() {
                            cfg.timeout = Some(Duration::from_secs(min(n, MAX_TIMEOUT)));
                        }
                    }
                }
            }
            _ => (),
        }
    }

    if cfg.name_servers.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            "no nameserver directives in resolv.conf",
        ));
    }

    Ok(cfg)
}
