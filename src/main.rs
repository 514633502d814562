use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use subresolve::config::{DEFAULT_MAX_CHASE_DEPTH, DEFAULT_RESOLVERS, DEFAULT_TIMEOUT,
    DEFAULT_WORKER_COUNT};
use subresolve::{parse_resolvers, resolv_conf, resolve_all, wordlist, write_table, Config};

/// Guess subdomains of a domain from a wordlist and print the ones that
/// resolve.
#[derive(Debug, Parser)]
#[command(name = "subresolve", version, about)]
struct Args {
    /// The domain to perform guessing against
    #[arg(short, long)]
    domain: String,

    /// The wordlist to use for guessing, one word per line
    #[arg(short, long)]
    wordlist: PathBuf,

    /// The amount of workers to use
    #[arg(short = 'c', long = "workers", default_value_t = DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Comma-separated resolvers, as host or host:port
    #[arg(short, long, default_value = DEFAULT_RESOLVERS)]
    resolver: String,

    /// Use the name servers of /etc/resolv.conf instead of --resolver
    #[arg(long, conflicts_with = "resolver")]
    system_resolvers: bool,

    /// Seconds to wait for each DNS response
    #[arg(long, default_value_t = DEFAULT_TIMEOUT)]
    timeout: u64,

    /// Maximum number of CNAME records followed per name
    #[arg(long, default_value_t = DEFAULT_MAX_CHASE_DEPTH)]
    max_depth: usize,

    /// Stop querying after this many seconds; remaining names are skipped
    #[arg(long)]
    deadline: Option<u64>,
}

impl Args {
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = Config::new(&self.domain);
        config.worker_count = self.workers;
        config.timeout = Duration::from_secs(self.timeout);
        config.max_chase_depth = self.max_depth;
        config.deadline = self.deadline.map(Duration::from_secs);

        if self.system_resolvers {
            let system = resolv_conf::load()
                .with_context(|| format!("failed to read {}", resolv_conf::RESOLV_CONF_PATH))?;
            config.resolvers = system.name_servers;
            if let Some(timeout) = system.timeout {
                config.timeout = timeout;
            }
        } else {
            config.resolvers = parse_resolvers(&self.resolver)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = args.config()?;

    let candidates = wordlist::open(&args.wordlist, &config.domain)
        .with_context(|| format!("failed to open wordlist {}", args.wordlist.display()))?;

    let outcome = resolve_all(&config, candidates);
    let found: HashSet<_> = outcome.results.iter().map(|r| &r.hostname).collect();
    info!("{} of {} candidates resolved to {} addresses",
        found.len(), outcome.candidates, outcome.results.len());

    write_table(io::stdout().lock(), &outcome.results)?;
    Ok(())
}
