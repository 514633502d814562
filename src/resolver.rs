//! CNAME-chasing resolution of one candidate against one name server

use std::collections::HashSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use log::{debug, trace};

use crate::message::{Message, RCode};
use crate::name::name_key;
use crate::record::{CName, Record, RecordType, A};
use crate::socket::{Error, Exchange};

/// An address found for a candidate name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct LookupResult {
    /// The candidate as it was queried, never an intermediate alias
    pub hostname: String,
    /// One address the candidate resolved to
    pub address: Ipv4Addr,
}

impl LookupResult {
    /// Constructs a new `LookupResult`.
    pub fn new(hostname: &str, address: Ipv4Addr) -> LookupResult {
        LookupResult { hostname: hostname.to_owned(), address }
    }
}

impl fmt::Display for LookupResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.hostname, self.address)
    }
}

/// Reasons a candidate produced no addresses.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The query could not be completed or the server reported a failure
    #[error("{r_type} query for {name} failed: {source}")]
    QueryFailure {
        /// Name being queried
        name: String,
        /// Record type requested
        r_type: RecordType,
        /// Underlying failure
        #[source]
        source: QueryError,
    },
    /// The server answered without any record of the requested type
    #[error("no {r_type} records for {name}")]
    EmptyAnswer {
        /// Name being queried
        name: String,
        /// Record type requested
        r_type: RecordType,
    },
    /// More CNAME hops than allowed
    #[error("CNAME chase from {name} exceeded {depth} hops")]
    ChaseDepthExceeded {
        /// The candidate being resolved
        name: String,
        /// Configured bound
        depth: usize,
    },
    /// A CNAME target was seen earlier in the same chase
    #[error("CNAME cycle from {name} back to {target}")]
    CnameCycle {
        /// The candidate being resolved
        name: String,
        /// The repeated name
        target: String,
    },
}

impl LookupError {
    /// Returns whether the failure says nothing about the name's existence,
    /// i.e. a different server or a later attempt might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(*self, LookupError::QueryFailure { .. })
    }
}

/// Failure of a single query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Transport or codec failure
    #[error(transparent)]
    Exchange(#[from] Error),
    /// The server answered with an error code other than NXDOMAIN
    #[error("server responded with error: {}", .0.get_error())]
    Server(RCode),
    /// A matching record had malformed data
    #[error("malformed record data: {0}")]
    Record(#[from] crate::message::DecodeError),
}

/// Steps of the resolution of one candidate.
#[derive(Debug)]
enum Chase {
    /// Following aliases; `current` is the next name to ask a CNAME for
    Cname { current: String, hops: usize },
    /// No further alias; asking for addresses of `current`
    Address { current: String },
    Resolved(Vec<Ipv4Addr>),
    Failed(LookupError),
}

/// Resolves candidates against a single name server.
pub struct NameResolver<'a, E: ?Sized> {
    exchange: &'a E,
    server: SocketAddr,
    max_chase_depth: usize,
}

impl<'a, E: Exchange + ?Sized> NameResolver<'a, E> {
    /// Constructs a `NameResolver` sending queries to `server` through
    /// `exchange`, following at most `max_chase_depth` aliases.
    pub fn new(exchange: &'a E, server: SocketAddr, max_chase_depth: usize) -> NameResolver<'a, E> {
        NameResolver { exchange, server, max_chase_depth }
    }

    /// Returns the name server queries are sent to.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Resolves `candidate`, returning one result per address. Failures are
    /// logged and yield an empty set.
    pub fn lookup(&self, candidate: &str) -> Vec<LookupResult> {
        match self.resolve(candidate) {
            Ok(results) => results,
            Err(e) => {
                debug!("{} via {}: {}{}", candidate, self.server, e,
                    if e.is_transient() { " (transient)" } else { "" });
                Vec::new()
            }
        }
    }

    /// Resolves `candidate`, following CNAME records until a name without an
    /// alias is reached, then asking for its A records.
    pub fn resolve(&self, candidate: &str) -> Result<Vec<LookupResult>, LookupError> {
        let mut visited = HashSet::new();
        visited.insert(name_key(candidate));

        let mut state = Chase::Cname { current: candidate.to_owned(), hops: 0 };

        loop {
            state = match state {
                Chase::Cname { current, hops } => match self.query::<CName>(&current) {
                    Ok(targets) => {
                        // Only the first alias is followed
                        let target = targets.into_iter().next().map(|c| c.name).unwrap_or_default();
                        trace!("{} is an alias for {}", current, target);

                        if hops + 1 > self.max_chase_depth {
                            Chase::Failed(LookupError::ChaseDepthExceeded {
                                name: candidate.to_owned(),
                                depth: self.max_chase_depth,
                            })
                        } else if !visited.insert(name_key(&target)) {
                            Chase::Failed(LookupError::CnameCycle {
                                name: candidate.to_owned(),
                                target,
                            })
                        } else {
                            Chase::Cname { current: target, hops: hops + 1 }
                        }
                    }
                    Err(e) => {
                        trace!("{} has no alias: {}", current, e);
                        Chase::Address { current }
                    }
                },
                Chase::Address { current } => match self.query::<A>(&current) {
                    Ok(addrs) => Chase::Resolved(addrs.into_iter().map(|a| a.address).collect()),
                    Err(e) => Chase::Failed(e),
                },
                Chase::Resolved(addrs) => {
                    return Ok(addrs.into_iter()
                        .map(|ip| LookupResult::new(candidate, ip))
                        .collect());
                }
                Chase::Failed(e) => return Err(e),
            };
        }
    }

    /// Asks the server for `R` records of `name`. Succeeds only with at least
    /// one record of that type in the answer section.
    fn query<R: Record>(&self, name: &str) -> Result<Vec<R>, LookupError> {
        let r_type = R::record_type();
        let failure = |source: QueryError| LookupError::QueryFailure {
            name: name.to_owned(),
            r_type,
            source,
        };
        let empty = || LookupError::EmptyAnswer { name: name.to_owned(), r_type };

        let query = Message::query(name, r_type);
        trace!("sending {} query for {} to {}", r_type, name, self.server);

        let reply = self.exchange.exchange(&query, &self.server)
            .map_err(|e| failure(e.into()))?;

        match reply.header.rcode {
            RCode::NoError => (),
            RCode::NameError => return Err(empty()),
            rcode => return Err(failure(QueryError::Server(rcode))),
        }

        let records = reply.answers::<R>().map_err(|e| failure(e.into()))?;
        if records.is_empty() {
            return Err(empty());
        }
        Ok(records)
    }
}
