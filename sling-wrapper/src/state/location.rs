//! Parsing of state location URIs.
//!
//! Accepted shapes: `file:///abs/path`, `file:rel/path`, `file://host/path`,
//! bare paths such as `./state` or `/var/lib/sling`, and any other
//! `scheme://...` URI, which parses but is not actionable for a reset.

use percent_encoding::percent_decode_str;
use std::path::PathBuf;
use url::Url;

use crate::errors::StateResetError;

/// A parsed state location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation {
    raw: String,
    scheme: Option<String>,
    path: String,
}

impl StateLocation {
    /// Parses a state location.
    pub fn parse(raw: &str) -> Result<Self, StateResetError> {
        let invalid = |reason: &str| StateResetError::InvalidLocation {
            location: raw.to_string(),
            reason: reason.to_string(),
        };

        // The URL parser silently drops tabs and newlines; reject them instead.
        if raw.bytes().any(|b| b < 0x20 || b == 0x7f) {
            return Err(invalid("invalid control character in URL"));
        }

        let (scheme, path) = match Url::parse(raw) {
            Ok(url) => {
                // The URL parser trims leading spaces; a raw value that does
                // not start with its scheme is a path with a colon in it.
                let Some(after_scheme) = raw
                    .get(..url.scheme().len())
                    .filter(|prefix| prefix.eq_ignore_ascii_case(url.scheme()))
                    .and_then(|_| raw[url.scheme().len()..].strip_prefix(':'))
                else {
                    return Err(invalid("first path segment in URL cannot contain colon"));
                };
                let path = if after_scheme.starts_with('/') {
                    url.path().to_string()
                } else {
                    // Opaque form such as `file:rel/path`, kept verbatim.
                    strip_query_and_fragment(after_scheme).to_string()
                };
                (Some(url.scheme().to_string()), path)
            }
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let path = strip_query_and_fragment(raw);
                let first_segment = path.split('/').next().unwrap_or_default();
                if first_segment.contains(':') {
                    return Err(invalid("first path segment in URL cannot contain colon"));
                }
                let path = match path.strip_prefix("//") {
                    Some(authority) if !path.starts_with("///") => {
                        authority.find('/').map_or("", |i| &authority[i..])
                    }
                    _ => path,
                };
                (None, path.to_string())
            }
            Err(err) => return Err(invalid(&err.to_string())),
        };

        let path = if scheme.is_some() && !path.starts_with('/') {
            path
        } else {
            decode_path(&path).map_err(invalid)?
        };

        Ok(Self {
            raw: raw.to_string(),
            scheme,
            path,
        })
    }

    /// The location as configured.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The lowercased scheme, if the location has one.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// True for `file` locations and bare paths.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.scheme.as_deref(), None | Some("" | "file"))
    }

    /// The path component, or the opaque part for `file:rel/path`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path after lexical cleaning.
    #[must_use]
    pub fn cleaned_path(&self) -> PathBuf {
        PathBuf::from(clean_path(&self.path))
    }
}

fn strip_query_and_fragment(raw: &str) -> &str {
    let end = raw.find(['?', '#']).unwrap_or(raw.len());
    &raw[..end]
}

/// Percent-decodes `path`, rejecting malformed escapes.
fn decode_path(path: &str) -> Result<String, &'static str> {
    let bytes = path.as_bytes();
    let malformed = bytes.iter().enumerate().any(|(i, &b)| {
        b == b'%'
            && !bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit))
    });
    if malformed {
        return Err("invalid URL escape");
    }
    Ok(percent_decode_str(path).decode_utf8_lossy().into_owned())
}

/// Lexically cleans a slash-separated path.
///
/// Repeated separators and `.` elements are dropped and `..` elements
/// consume the element before them. A rooted path never climbs above `/`.
/// The empty path cleans to `.`.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}
