//! Candidate names read from a wordlist

use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use log::warn;

use crate::name::candidate_name;

/// Yields `"<word>.<domain>"` for each word of a line-oriented wordlist.
///
/// Blank lines and lines starting with `#` are skipped. A read error ends the
/// sequence after being logged.
pub struct Candidates<R> {
    lines: Lines<R>,
    domain: String,
    line_no: usize,
}

impl<R: BufRead> Candidates<R> {
    /// Returns candidates for `domain` built from the lines of `reader`.
    pub fn new(reader: R, domain: &str) -> Candidates<R> {
        Candidates {
            lines: reader.lines(),
            domain: domain.to_owned(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for Candidates<R> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    warn!("wordlist unreadable after line {}: {}", self.line_no, e);
                    return None;
                }
            };
            self.line_no += 1;

            if line.trim_start().starts_with('#') {
                continue;
            }
            if let Some(name) = candidate_name(&line, &self.domain) {
                return Some(name);
            }
        }
    }
}

/// Opens the wordlist at `path`. Failing here aborts a run before any
/// worker starts.
pub fn open<P: AsRef<Path>>(path: P, domain: &str) -> io::Result<Candidates<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(Candidates::new(BufReader::new(file), domain))
}
