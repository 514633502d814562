//! Mapping of workers onto name servers

use std::net::SocketAddr;

/// Returns the name server for worker `index`: servers are handed out
/// round-robin, so worker `i` gets `servers[i % servers.len()]`.
///
/// # Panics
///
/// Panics if `servers` is empty; `Config::validate` rules that out.
pub fn resolver_for(index: usize, servers: &[SocketAddr]) -> SocketAddr {
    servers[index % servers.len()]
}

/// Returns the name server of each of `workers` workers, in worker order.
pub fn assign(workers: usize, servers: &[SocketAddr]) -> Vec<SocketAddr> {
    (0..workers).map(|i| resolver_for(i, servers)).collect()
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use super::{assign, resolver_for};

    fn servers(n: usize) -> Vec<SocketAddr> {
        (0..n).map(|i| SocketAddr::from(([192, 0, 2, i as u8], 53))).collect()
    }

    #[test]
    fn test_round_robin() {
        let list = servers(3);

        assert_eq!(assign(7, &list), [
            list[0], list[1], list[2],
            list[0], list[1], list[2],
            list[0],
        ]);
    }

    #[test]
    fn test_fewer_workers_than_servers() {
        let list = servers(9);
        assert_eq!(assign(2, &list), [list[0], list[1]]);
    }

    #[test]
    fn test_single_server() {
        let list = servers(1);

        assert!(assign(50, &list).iter().all(|&s| s == list[0]));
        assert_eq!(resolver_for(123_456, &list), list[0]);
    }
}
