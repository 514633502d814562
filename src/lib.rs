//! Concurrent resolution of candidate subdomains over DNS.
//!
//! Candidate names are spread over a fixed pool of workers, each querying one
//! of the configured name servers. Each worker follows CNAME records to their
//! end before asking for A records, and every address found is reported under
//! the name originally queried.

#![deny(missing_docs)]

pub use config::{parse_resolvers, Config, ConfigError};
pub use message::{DecodeError, EncodeError, Message, Question, Resource, MESSAGE_LIMIT};
pub use name::{candidate_name, to_ascii, to_unicode};
pub use output::write_table;
pub use pool::{resolve_all, run, Outcome};
pub use record::{Class, Record, RecordType};
pub use resolver::{LookupError, LookupResult, NameResolver};
pub use socket::{DnsSocket, Error, Exchange, UdpExchange};
pub use wordlist::Candidates;

pub mod assign;
pub mod config;
pub mod message;
pub mod name;
pub mod output;
pub mod pool;
pub mod record;
pub mod resolv_conf;
pub mod resolver;
pub mod socket;
pub mod wordlist;
