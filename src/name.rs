//! Domain name helpers: IDNA conversion of labels, candidate construction
//! and the comparison key used when tracking visited names.

use std::borrow::Cow::{self, Borrowed, Owned};

/// Indicates an error in encoding or decoding Punycode data
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("invalid internationalized domain name")]
pub struct IdnaError;

/// Converts a label or host to its ASCII format. If the string is already ASCII,
/// it will be returned unmodified. If an error is encountered in encoding,
/// `Err` will be returned.
pub fn to_ascii(s: &str) -> Result<Cow<str>, IdnaError> {
    if s.is_ascii() {
        Ok(Borrowed(s))
    } else {
        idna::domain_to_ascii(s)
            .map(Owned)
            .map_err(|_| IdnaError)
    }
}

/// Converts a label or host to its Unicode format. If the string is not an
/// internationalized domain name, it will be returned unmodified.
pub fn to_unicode(s: &str) -> Result<Cow<str>, IdnaError> {
    let is_unicode = s.split('.').any(|s| s.starts_with("xn--"));

    if is_unicode {
        match idna::domain_to_unicode(s) {
            (s, Ok(())) => Ok(Owned(s)),
            (_, Err(_)) => Err(IdnaError),
        }
    } else {
        Ok(Borrowed(s))
    }
}

/// Builds the fully-qualified candidate `"<word>.<domain>"`.
///
/// Surrounding whitespace is ignored on both parts and a trailing `.` on
/// `domain` is dropped. Returns `None` for a blank word.
pub fn candidate_name(word: &str, domain: &str) -> Option<String> {
    let word = word.trim();
    if word.is_empty() {
        return None;
    }
    let domain = domain.trim().trim_end_matches('.');
    Some(format!("{}.{}", word, domain))
}

/// Returns the key under which two spellings of the same name compare equal:
/// ASCII-lowercased with any trailing `.` removed.
pub fn name_key(name: &str) -> String {
    let name = name.strip_suffix('.').unwrap_or(name);
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod test {
    use super::{candidate_name, name_key, to_ascii, to_unicode};

    static SAMPLE_HOSTS: &[(&str, &str)] = &[
        ("bücher.de.", "xn--bcher-kva.de."),
        ("ουτοπία.δπθ.gr.", "xn--kxae4bafwg.xn--pxaix.gr."),
        // We want to preserve a lack of trailing '.', too.
        ("bücher.de", "xn--bcher-kva.de"),
        ("ουτοπία.δπθ.gr", "xn--kxae4bafwg.xn--pxaix.gr"),
    ];

    #[test]
    fn test_hosts() {
        for &(uni, ascii) in SAMPLE_HOSTS {
            assert_eq!(to_ascii(uni).unwrap(), ascii);
            assert_eq!(to_unicode(ascii).unwrap(), uni);

            // Ensure the functions are idempotent
            assert_eq!(to_ascii(ascii).unwrap(), ascii);
            assert_eq!(to_unicode(uni).unwrap(), uni);
        }
    }

    #[test]
    fn test_candidate_name() {
        assert_eq!(candidate_name("www", "example.com").as_deref(), Some("www.example.com"));
        assert_eq!(candidate_name("  mail\t", "example.com.").as_deref(), Some("mail.example.com"));
        assert_eq!(candidate_name("a.b", "example.com").as_deref(), Some("a.b.example.com"));
        assert_eq!(candidate_name("", "example.com"), None);
        assert_eq!(candidate_name("   ", "example.com"), None);
    }

    #[test]
    fn test_name_key() {
        assert_eq!(name_key("CDN.Example.NET."), "cdn.example.net");
        assert_eq!(name_key("cdn.example.net"), "cdn.example.net");
        assert_eq!(name_key("."), "");
    }
}
