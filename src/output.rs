//! Two-column rendering of results

use std::io::{self, Write};

use crate::resolver::LookupResult;

/// Spaces between the hostname column and the address column
pub const PADDING: usize = 4;

/// Writes one `hostname  address` line per result, in the given order,
/// with addresses aligned on a common column.
pub fn write_table<W: Write>(mut w: W, results: &[LookupResult]) -> io::Result<()> {
    let width = results.iter()
        .map(|r| r.hostname.chars().count())
        .max()
        .unwrap_or(0);

    for r in results {
        writeln!(w, "{:<width$}{}", r.hostname, r.address, width = width + PADDING)?;
    }
    w.flush()
}

#[cfg(test)]
mod test {
    use super::write_table;
    use crate::resolver::LookupResult;

    #[test]
    fn test_write_table() {
        let results = [
            LookupResult::new("www.example.com", "93.184.216.34".parse().unwrap()),
            LookupResult::new("mail.example.com", "10.0.0.1".parse().unwrap()),
            LookupResult::new("mail.example.com", "10.0.0.2".parse().unwrap()),
        ];
        let mut out = Vec::new();
        write_table(&mut out, &results).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "\
            www.example.com     93.184.216.34\n\
            mail.example.com    10.0.0.1\n\
            mail.example.com    10.0.0.2\n");
    }

    #[test]
    fn test_empty_table() {
        let mut out = Vec::new();
        write_table(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }
}
