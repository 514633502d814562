//! Worker pool resolving a stream of candidates.
//!
//! Candidates flow through a bounded queue to `worker_count` workers, each
//! bound to one name server. Non-empty result sets are handed one at a time
//! over a rendezvous channel to a single aggregator, which alone owns the
//! result list. Every worker and the aggregator report completion with a
//! token; the coordinating thread closes each channel only after the tokens
//! of everything that could still use it have arrived.

use std::panic;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::assign::assign;
use crate::config::Config;
use crate::resolver::{LookupResult, NameResolver};
use crate::socket::{Exchange, UdpExchange};

/// Signal that one worker or the aggregator has finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Done;

/// Reports `Done` when dropped, so a unit that unwinds still reports.
struct CompletionToken(Sender<Done>);

impl Drop for CompletionToken {
    fn drop(&mut self) {
        // The channel has room for every token; this never blocks.
        let _ = self.0.send(Done);
    }
}

/// What a finished run produced.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Outcome {
    /// Every result, in the order the aggregator received them
    pub results: Vec<LookupResult>,
    /// Number of candidates handed to the workers
    pub candidates: usize,
    /// Completion tokens observed before the results were released
    pub completions: usize,
}

/// Resolves `candidates` over UDP with the settings in `config`.
pub fn resolve_all<I>(config: &Config, candidates: I) -> Outcome
        where I: IntoIterator<Item = String> {
    run(config, &UdpExchange::new(config.timeout), candidates)
}

/// Resolves `candidates` through `exchange` with `config.worker_count`
/// workers and returns once every worker and the aggregator have finished.
///
/// `config` is expected to have passed `Config::validate`.
pub fn run<E, I>(config: &Config, exchange: &E, candidates: I) -> Outcome
        where E: Exchange + Sync + ?Sized, I: IntoIterator<Item = String> {
    let workers = config.worker_count;
    let deadline = config.deadline.map(|d| Instant::now() + d);

    let (queue_tx, queue_rx) = bounded::<String>(workers);
    let (sink_tx, sink_rx) = bounded::<Vec<LookupResult>>(0);
    let (done_tx, done_rx) = bounded::<Done>(workers + 1);

    info!("starting {} workers over {} resolvers", workers, config.resolvers.len());

    thread::scope(|s| {
        for (index, server) in assign(workers, &config.resolvers).into_iter().enumerate() {
            let resolver = NameResolver::new(exchange, server, config.max_chase_depth);
            let queue = queue_rx.clone();
            let sink = sink_tx.clone();
            let token = CompletionToken(done_tx.clone());
            s.spawn(move || worker(index, resolver, queue, sink, token, deadline));
        }
        drop(queue_rx);

        let aggregator = {
            let token = CompletionToken(done_tx.clone());
            s.spawn(move || aggregate(sink_rx, token))
        };
        drop(done_tx);

        let mut enqueued = 0;
        for candidate in candidates {
            if queue_tx.send(candidate).is_err() {
                warn!("no worker left to take candidates; stopping after {}", enqueued);
                break;
            }
            enqueued += 1;
        }
        // No more work
        drop(queue_tx);
        debug!("{} candidates enqueued", enqueued);

        let mut completions = await_tokens(&done_rx, workers);

        // Every worker is done with the sink
        drop(sink_tx);
        completions += await_tokens(&done_rx, 1);

        let results = aggregator.join().unwrap_or_else(|e| panic::resume_unwind(e));

        info!("{} results for {} candidates", results.len(), enqueued);

        Outcome { results, candidates: enqueued, completions }
    })
}

/// Blocks until `n` tokens have arrived, or every token sender is gone.
fn await_tokens(done: &Receiver<Done>, n: usize) -> usize {
    let mut seen = 0;
    while seen < n {
        match done.recv() {
            Ok(Done) => seen += 1,
            Err(_) => break,
        }
    }
    seen
}

fn worker<E>(index: usize, resolver: NameResolver<'_, E>, queue: Receiver<String>,
        sink: Sender<Vec<LookupResult>>, token: CompletionToken, deadline: Option<Instant>)
        where E: Exchange + ?Sized {
    debug!("worker {} querying {}", index, resolver.server());

    let mut resolved = 0;
    let mut skipped = 0;

    for candidate in queue.iter() {
        if deadline.map_or(false, |d| Instant::now() >= d) {
            skipped += 1;
            continue;
        }

        let results = resolver.lookup(&candidate);
        if results.is_empty() {
            continue;
        }
        resolved += 1;

        if sink.send(results).is_err() {
            // Only possible if the aggregator died; keep draining the queue
            warn!("worker {}: result for {} dropped", index, candidate);
        }
    }

    if skipped > 0 {
        warn!("worker {}: deadline passed, {} candidates not queried", index, skipped);
    }
    debug!("worker {} finished, {} candidates resolved", index, resolved);

    drop(sink);
    drop(token);
}

fn aggregate(sink: Receiver<Vec<LookupResult>>, token: CompletionToken) -> Vec<LookupResult> {
    let mut results = Vec::new();

    for group in sink.iter() {
        results.extend(group);
    }

    drop(token);
    results
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use super::{run, Outcome};
    use crate::config::Config;
    use crate::message::Message;
    use crate::name::{candidate_name, name_key};
    use crate::record::RecordType;
    use crate::resolver::test::Fixture;
    use crate::resolver::LookupResult;
    use crate::socket::{Error, Exchange};

    fn config(workers: usize, resolvers: usize) -> Config {
        Config {
            worker_count: workers,
            resolvers: (0..resolvers)
                .map(|i| SocketAddr::from(([192, 0, 2, i as u8 + 1], 53)))
                .collect(),
            ..Config::new("example.com")
        }
    }

    fn words(domain: &str, words: &[&str]) -> Vec<String> {
        words.iter().filter_map(|w| candidate_name(w, domain)).collect()
    }

    fn sorted(mut outcome: Outcome) -> Vec<LookupResult> {
        outcome.results.sort();
        outcome.results
    }

    /// Zone of 200 hosts: every third has an address, every fifth an alias
    /// to a shared address, the rest do not exist.
    fn large_zone() -> (Fixture, Vec<String>) {
        let mut zone = Fixture::new().addresses("edge.example.net", &["198.51.100.7", "198.51.100.8"]);
        let mut names = Vec::new();

        for i in 0..200 {
            let name = format!("host{}.example.com", i);
            if i % 5 == 0 {
                zone = zone.alias(&name, "edge.example.net.");
            } else if i % 3 == 0 {
                let addr = format!("203.0.113.{}", i);
                zone = zone.addresses(&name, &[addr.as_str()]);
            }
            names.push(name);
        }
        (zone, names)
    }

    /// Records which servers were asked about which names.
    struct Recorder<'a> {
        inner: &'a Fixture,
        seen: Mutex<HashMap<(String, RecordType), Vec<SocketAddr>>>,
    }

    impl Exchange for Recorder<'_> {
        fn exchange(&self, query: &Message, server: &SocketAddr) -> Result<Message, Error> {
            let q = &query.question[0];
            self.seen.lock().unwrap()
                .entry((q.name.clone(), q.q_type))
                .or_default()
                .push(*server);
            self.inner.exchange(query, server)
        }
    }

    #[test]
    fn test_example_domain() {
        let zone = Fixture::example();
        let cfg = config(3, 2);
        let outcome = run(&cfg, &zone, words("example.com", &["www", "mail", "ghost"]));

        assert_eq!(outcome.candidates, 3);
        assert_eq!(sorted(outcome), [
            LookupResult::new("mail.example.com", "10.0.0.1".parse().unwrap()),
            LookupResult::new("www.example.com", "93.184.216.34".parse().unwrap()),
        ]);
    }

    #[test]
    fn test_completion_tokens() {
        let zone = Fixture::example();

        for &workers in &[1, 2, 7, 100] {
            let outcome = run(&config(workers, 3), &zone, words("example.com", &["www", "mail"]));
            assert_eq!(outcome.completions, workers + 1);
        }

        // Nothing to do still shuts down cleanly
        let outcome = run(&config(4, 1), &zone, Vec::new());
        assert_eq!(outcome, Outcome { results: Vec::new(), candidates: 0, completions: 5 });
    }

    #[test]
    fn test_invariant_under_pool_shape() {
        let (zone, names) = large_zone();
        let expected = sorted(run(&config(1, 1), &zone, names.clone()));

        // 40 aliased hosts with two addresses, 53 with one of their own
        assert_eq!(expected.len(), 40 * 2 + 53);

        for &(workers, resolvers) in &[(2, 1), (5, 9), (50, 3), (250, 9)] {
            let outcome = run(&config(workers, resolvers), &zone, names.clone());
            assert_eq!(outcome.candidates, names.len());
            assert_eq!(sorted(outcome), expected, "{} workers, {} resolvers", workers, resolvers);
        }
    }

    #[test]
    fn test_each_candidate_taken_once() {
        let (zone, names) = large_zone();
        let recorder = Recorder { inner: &zone, seen: Mutex::new(HashMap::new()) };

        run(&config(16, 4), &recorder, names.clone());

        let seen = recorder.seen.into_inner().unwrap();
        for name in &names {
            let asked = &seen[&(name.clone(), RecordType::CName)];
            assert_eq!(asked.len(), 1, "{} queried {} times", name, asked.len());
        }
    }

    #[test]
    fn test_single_worker_uses_first_resolver() {
        let (zone, names) = large_zone();
        let recorder = Recorder { inner: &zone, seen: Mutex::new(HashMap::new()) };
        let cfg = config(1, 3);

        run(&cfg, &recorder, names);

        let seen = recorder.seen.into_inner().unwrap();
        assert!(seen.values().flatten().all(|s| *s == cfg.resolvers[0]));
    }

    /// Panics when asked about `name`, or about anything if `name` is `None`.
    struct Panicking {
        inner: Fixture,
        name: Option<&'static str>,
    }

    impl Exchange for Panicking {
        fn exchange(&self, query: &Message, server: &SocketAddr) -> Result<Message, Error> {
            let asked = name_key(&query.question[0].name);
            if self.name.map_or(true, |name| name == asked) {
                panic!("exchange failed for {}", asked);
            }
            self.inner.exchange(query, server)
        }
    }

    /// Runs the pool in the background and reports whether it panicked,
    /// failing the test if it has not finished within a few seconds.
    fn run_panicking(workers: usize, name: Option<&'static str>) -> bool {
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let (inner, names) = large_zone();
            let exchange = Panicking { inner, name };
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run(&config(workers, 2), &exchange, names)
            }));
            let _ = tx.send(result.is_err());
        });
        rx.recv_timeout(Duration::from_secs(10)).expect("pool did not shut down")
    }

    #[test]
    fn test_worker_panic_is_reraised() {
        assert!(run_panicking(4, Some("host7.example.com")));
        assert!(run_panicking(1, Some("host0.example.com")));
        // Every worker dies; enqueueing stops instead of blocking
        assert!(run_panicking(3, None));
    }

    #[test]
    fn test_deadline_drains_without_querying() {
        let (zone, names) = large_zone();
        let cfg = Config { deadline: Some(Duration::from_secs(0)), ..config(8, 2) };

        let outcome = run(&cfg, &zone, names.clone());

        assert_eq!(outcome.candidates, names.len());
        assert_eq!(outcome.completions, 9);
        assert!(outcome.results.is_empty());
        assert_eq!(zone.queries.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
