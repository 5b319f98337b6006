//! Cookie input parsing into a canonical credential set.
//!
//! Four encodings are accepted without an explicit format flag:
//!
//! 1. JSON array of objects with `name`/`value` (optional `domain`)
//! 2. JSON object mapping cookie name to value
//! 3. Netscape cookie file text (TAB-separated, one cookie per line)
//! 4. Raw `Cookie:` header text (`name=value; other=value`)
//!
//! Detection order is fixed: JSON first (array vs object), then the
//! Netscape line shape, then the raw header. The first shape that matches
//! wins; a shape that matches but contains bad entries is an error rather
//! than a fall-through to the next shape.

use std::fmt::{self, Write as _};

use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Minimum TAB-separated fields for a Netscape cookie line.
///
/// Exported cookie files carry 7 fields; some tools drop an empty value,
/// leaving 6.
const NETSCAPE_MIN_FIELDS: usize = 6;

/// Header lines written by browsers and yt-dlp at the top of a cookies.txt.
const NETSCAPE_HEADERS: [&str; 2] = ["# Netscape HTTP Cookie File", "# HTTP Cookie File"];

/// Prefix curl and browsers use to mark HTTP-only cookies in Netscape files.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Domain used when writing cookies that carry no domain of their own.
pub const DEFAULT_COOKIE_DOMAIN: &str = ".vimeo.com";

/// Far-future expiry written for cookies without an explicit one.
const NETSCAPE_DEFAULT_EXPIRES: u64 = 2_147_483_647;

/// The encoding a cookie string was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieFormat {
    /// JSON array of cookie objects.
    JsonArray,
    /// JSON object of name to value.
    JsonObject,
    /// Netscape cookie file.
    Netscape,
    /// Raw `Cookie` header string.
    Header,
}

impl fmt::Display for CookieFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JsonArray => write!(f, "json-array"),
            Self::JsonObject => write!(f, "json-object"),
            Self::Netscape => write!(f, "netscape"),
            Self::Header => write!(f, "header"),
        }
    }
}

/// A single canonical cookie entry.
///
/// The value is redacted in `Debug` output so credentials never reach logs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CookieEntry {
    name: String,
    domain: Option<String>,
    value: String,
}

impl CookieEntry {
    /// Creates a cookie entry. Domains are lower-cased.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: Option<&str>) -> Self {
        Self {
            name: name.into(),
            domain: domain
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_ascii_lowercase),
            value: value.into(),
        }
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie domain, when the input encoding carried one.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Cookie value. Sensitive; do not log.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for CookieEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieEntry")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Canonical authentication state for a run.
///
/// Entries are de-duplicated by `(name, domain)` with the last occurrence
/// winning, and kept sorted so two credentials built from different
/// encodings of the same cookies compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    entries: Vec<CookieEntry>,
}

impl Credential {
    /// An empty credential (anonymous access).
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builds a credential from entries, applying the canonical ordering.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = CookieEntry>) -> Self {
        let mut canonical: Vec<CookieEntry> = Vec::new();
        for entry in entries {
            if let Some(existing) = canonical
                .iter_mut()
                .find(|e| e.name == entry.name && e.domain == entry.domain)
            {
                *existing = entry;
            } else {
                canonical.push(entry);
            }
        }
        canonical.sort();
        Self { entries: canonical }
    }

    /// Returns true when no cookies are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterates over the canonical entries.
    pub fn entries(&self) -> impl Iterator<Item = &CookieEntry> {
        self.entries.iter()
    }

    /// Renders the credential as a Netscape cookie file.
    ///
    /// Cookies without a domain are scoped to [`DEFAULT_COOKIE_DOMAIN`].
    #[must_use]
    pub fn to_netscape(&self) -> String {
        let mut out = String::from("# Netscape HTTP Cookie File\n");
        for entry in &self.entries {
            let domain = entry.domain().unwrap_or(DEFAULT_COOKIE_DOMAIN);
            let include_subdomains = if domain.starts_with('.') {
                "TRUE"
            } else {
                "FALSE"
            };
            let _ = writeln!(
                out,
                "{domain}\t{include_subdomains}\t/\tFALSE\t{NETSCAPE_DEFAULT_EXPIRES}\t{}\t{}",
                entry.name, entry.value
            );
        }
        out
    }
}

/// Errors produced while parsing cookie input.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// The input matched none of the supported encodings.
    #[error("cookie input is not JSON, a Netscape cookie file, or a cookie header: {reason}")]
    Unrecognized {
        /// Why the last candidate shape was rejected.
        reason: String,
    },

    /// The input was recognized but an entry in it is invalid.
    #[error("invalid {format} cookie input: {reason}")]
    InvalidEntry {
        /// The recognized encoding.
        format: CookieFormat,
        /// What was wrong.
        reason: String,
    },
}

/// Parses optional cookie input into a canonical [`Credential`].
///
/// Absent, empty, or whitespace-only input yields an anonymous credential.
///
/// # Errors
///
/// Returns [`CookieError`] when non-empty input matches none of the four
/// supported shapes, or matches a shape but contains invalid entries.
#[instrument(level = "debug", skip(input), fields(input_len = input.map_or(0, str::len)))]
pub fn parse_cookies(input: Option<&str>) -> Result<Credential, CookieError> {
    let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        debug!("no cookie input, using anonymous access");
        return Ok(Credential::anonymous());
    };

    let (format, credential) = detect_and_parse(raw)?;
    debug!(%format, cookies = credential.len(), "parsed cookie input");
    Ok(credential)
}

/// Runs the fixed-priority detection chain over non-empty input.
fn detect_and_parse(raw: &str) -> Result<(CookieFormat, Credential), CookieError> {
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        match json {
            Value::Array(items) => {
                return parse_json_array(&items).map(|c| (CookieFormat::JsonArray, c));
            }
            Value::Object(map) => {
                return parse_json_object(&map).map(|c| (CookieFormat::JsonObject, c));
            }
            // Scalars are not a cookie encoding; keep looking.
            _ => {}
        }
    }

    if looks_like_netscape(raw) {
        return parse_netscape(raw).map(|c| (CookieFormat::Netscape, c));
    }

    parse_header(raw).map(|c| (CookieFormat::Header, c))
}

fn parse_json_array(items: &[Value]) -> Result<Credential, CookieError> {
    let mut entries = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else {
            return Err(CookieError::InvalidEntry {
                format: CookieFormat::JsonArray,
                reason: format!("element {idx} is not an object"),
            });
        };
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CookieError::InvalidEntry {
                format: CookieFormat::JsonArray,
                reason: format!("element {idx} has no string `name`"),
            })?;
        let value = obj
            .get("value")
            .and_then(scalar_to_string)
            .ok_or_else(|| CookieError::InvalidEntry {
                format: CookieFormat::JsonArray,
                reason: format!("element {idx} (`{name}`) has no scalar `value`"),
            })?;
        let domain = obj.get("domain").and_then(Value::as_str);
        entries.push(CookieEntry::new(name, value, domain));
    }
    Ok(Credential::from_entries(entries))
}

fn parse_json_object(map: &serde_json::Map<String, Value>) -> Result<Credential, CookieError> {
    let mut entries = Vec::with_capacity(map.len());
    for (name, value) in map {
        if name.is_empty() {
            return Err(CookieError::InvalidEntry {
                format: CookieFormat::JsonObject,
                reason: "empty cookie name".to_string(),
            });
        }
        let value = scalar_to_string(value).ok_or_else(|| CookieError::InvalidEntry {
            format: CookieFormat::JsonObject,
            reason: format!("value for `{name}` is not a string, number, or boolean"),
        })?;
        entries.push(CookieEntry::new(name.as_str(), value, None));
    }
    Ok(Credential::from_entries(entries))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Returns the data lines of a Netscape file, with `#HttpOnly_` unwrapped.
fn netscape_data_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.lines().filter_map(|line| {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            None
        } else if let Some(rest) = line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest)
        } else if line.starts_with('#') {
            None
        } else {
            Some(line)
        }
    })
}

/// Every data line must carry at least [`NETSCAPE_MIN_FIELDS`] TAB fields.
fn looks_like_netscape(raw: &str) -> bool {
    let mut lines = netscape_data_lines(raw).peekable();
    if lines.peek().is_none() {
        // A comment-only file is an empty Netscape file only with its header.
        let first = raw.trim_start().lines().next().unwrap_or_default().trim();
        return NETSCAPE_HEADERS.contains(&first);
    }
    lines.all(|line| line.split('\t').count() >= NETSCAPE_MIN_FIELDS)
}

fn parse_netscape(raw: &str) -> Result<Credential, CookieError> {
    let mut entries = Vec::new();
    for (idx, line) in netscape_data_lines(raw).enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        let domain = fields[0].trim();
        let name = fields[5].trim();
        let value = fields.get(6).copied().unwrap_or_default();
        if name.is_empty() {
            return Err(CookieError::InvalidEntry {
                format: CookieFormat::Netscape,
                reason: format!("cookie {} has an empty name", idx + 1),
            });
        }
        if domain.is_empty() {
            warn!(name, "netscape cookie without domain");
        }
        entries.push(CookieEntry::new(name, value, Some(domain)));
    }
    Ok(Credential::from_entries(entries))
}

fn parse_header(raw: &str) -> Result<Credential, CookieError> {
    let raw = raw
        .strip_prefix("Cookie:")
        .or_else(|| raw.strip_prefix("cookie:"))
        .unwrap_or(raw);
    let mut entries = Vec::new();
    for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((name, value)) = pair.split_once('=') else {
            return Err(CookieError::Unrecognized {
                reason: format!("segment `{}` has no `=`", truncate(pair)),
            });
        };
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(CookieError::Unrecognized {
                reason: format!("segment `{}` has an invalid cookie name", truncate(name)),
            });
        }
        entries.push(CookieEntry::new(name, value.trim(), None));
    }
    if entries.is_empty() {
        return Err(CookieError::Unrecognized {
            reason: "no name=value pairs found".to_string(),
        });
    }
    Ok(Credential::from_entries(entries))
}

/// Keeps error messages short; never includes anything after `=`.
fn truncate(s: &str) -> String {
    s.chars().take(32).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn names(credential: &Credential) -> Vec<&str> {
        credential.entries().map(CookieEntry::name).collect()
    }

    #[test]
    fn test_parse_cookies_absent_input_is_anonymous() {
        assert!(parse_cookies(None).unwrap().is_empty());
        assert!(parse_cookies(Some("")).unwrap().is_empty());
        assert!(parse_cookies(Some("   \n\t ")).unwrap().is_empty());
    }

    #[test]
    fn test_parse_cookies_header_string() {
        let credential = parse_cookies(Some("vuid=abc; session=xyz")).unwrap();
        assert_eq!(names(&credential), vec!["session", "vuid"]);
        assert_eq!(credential.entries().next().unwrap().value(), "xyz");
    }

    #[test]
    fn test_parse_cookies_header_with_prefix_and_trailing_semicolon() {
        let credential = parse_cookies(Some("Cookie: a=1; b=2;")).unwrap();
        assert_eq!(credential.len(), 2);
    }

    #[test]
    fn test_parse_cookies_header_value_may_contain_equals() {
        let credential = parse_cookies(Some("token=a=b=c")).unwrap();
        assert_eq!(credential.entries().next().unwrap().value(), "a=b=c");
    }

    #[test]
    fn test_parse_cookies_json_array() {
        let input = r#"[{"name":"a","value":"1","domain":".Vimeo.com"},{"name":"b","value":2}]"#;
        let credential = parse_cookies(Some(input)).unwrap();
        assert_eq!(credential.len(), 2);
        let a = credential.entries().find(|e| e.name() == "a").unwrap();
        assert_eq!(a.domain(), Some(".vimeo.com"));
        let b = credential.entries().find(|e| e.name() == "b").unwrap();
        assert_eq!(b.value(), "2");
        assert_eq!(b.domain(), None);
    }

    #[test]
    fn test_parse_cookies_json_array_missing_name_is_error() {
        let err = parse_cookies(Some(r#"[{"value":"1"}]"#)).unwrap_err();
        assert!(matches!(
            err,
            CookieError::InvalidEntry {
                format: CookieFormat::JsonArray,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_cookies_json_object() {
        let credential = parse_cookies(Some(r#"{"a":"1","b":"2"}"#)).unwrap();
        assert_eq!(names(&credential), vec!["a", "b"]);
    }

    #[test]
    fn test_parse_cookies_json_object_nested_value_is_error() {
        let err = parse_cookies(Some(r#"{"a":{"nested":true}}"#)).unwrap_err();
        assert!(matches!(err, CookieError::InvalidEntry { .. }));
    }

    #[test]
    fn test_parse_cookies_netscape_file() {
        let input = "\
# Netscape HTTP Cookie File
.vimeo.com\tTRUE\t/\tTRUE\t1700000000\tvuid\tabc
#HttpOnly_.vimeo.com\tTRUE\t/\tTRUE\t0\tsession\txyz
";
        let credential = parse_cookies(Some(input)).unwrap();
        assert_eq!(names(&credential), vec!["session", "vuid"]);
        assert!(
            credential
                .entries()
                .all(|e| e.domain() == Some(".vimeo.com"))
        );
    }

    #[test]
    fn test_parse_cookies_netscape_six_fields_has_empty_value() {
        let input = ".vimeo.com\tTRUE\t/\tFALSE\t0\tflag";
        let credential = parse_cookies(Some(input)).unwrap();
        assert_eq!(credential.entries().next().unwrap().value(), "");
    }

    #[test]
    fn test_parse_cookies_netscape_crlf() {
        let input = "# Header\r\n.vimeo.com\tTRUE\t/\tFALSE\t0\tname\tvalue\r\n";
        let credential = parse_cookies(Some(input)).unwrap();
        assert_eq!(credential.entries().next().unwrap().value(), "value");
    }

    #[test]
    fn test_parse_cookies_short_tab_lines_fall_back_to_header_and_fail() {
        let err = parse_cookies(Some("a\tb\tc")).unwrap_err();
        assert!(matches!(err, CookieError::Unrecognized { .. }));
    }

    #[test]
    fn test_parse_cookies_garbage_is_unrecognized() {
        let err = parse_cookies(Some("definitely not cookies")).unwrap_err();
        assert!(matches!(err, CookieError::Unrecognized { .. }));
    }

    #[test]
    fn test_parse_cookies_json_scalar_is_not_json_format() {
        // `42` parses as JSON but is no cookie encoding, and has no `=`.
        assert!(parse_cookies(Some("42")).is_err());
    }

    #[test]
    fn test_parse_cookies_equivalent_encodings_are_identical() {
        let header = parse_cookies(Some("a=1; b=2")).unwrap();
        let object = parse_cookies(Some(r#"{"b":"2","a":"1"}"#)).unwrap();
        let array =
            parse_cookies(Some(r#"[{"name":"a","value":"1"},{"name":"b","value":"2"}]"#)).unwrap();
        assert_eq!(header, object);
        assert_eq!(header, array);
    }

    #[test]
    fn test_parse_cookies_netscape_equals_array_with_domain() {
        let netscape = parse_cookies(Some(
            ".vimeo.com\tTRUE\t/\tFALSE\t0\ta\t1\n.vimeo.com\tTRUE\t/\tFALSE\t0\tb\t2\n",
        ))
        .unwrap();
        let array = parse_cookies(Some(
            r#"[{"name":"b","value":"2","domain":".vimeo.com"},{"name":"a","value":"1","domain":".vimeo.com"}]"#,
        ))
        .unwrap();
        assert_eq!(netscape, array);
    }

    #[test]
    fn test_detection_priority_json_before_netscape() {
        // Tabs inside a JSON document must not make it a Netscape file.
        let input = "[\n\t{\"name\":\"a\",\t\"value\":\"1\"}\n]";
        let (format, _) = detect_and_parse(input).unwrap();
        assert_eq!(format, CookieFormat::JsonArray);
    }

    #[test]
    fn test_detection_priority_netscape_before_header() {
        let input = ".vimeo.com\tTRUE\t/\tFALSE\t0\ta\tx=y";
        let (format, credential) = detect_and_parse(input).unwrap();
        assert_eq!(format, CookieFormat::Netscape);
        assert_eq!(credential.entries().next().unwrap().value(), "x=y");
    }

    #[test]
    fn test_detection_header_is_last_resort() {
        let (format, _) = detect_and_parse("a=1").unwrap();
        assert_eq!(format, CookieFormat::Header);
    }

    #[test]
    fn test_credential_deduplicates_last_wins() {
        let credential = parse_cookies(Some("a=1; a=2")).unwrap();
        assert_eq!(credential.len(), 1);
        assert_eq!(credential.entries().next().unwrap().value(), "2");
    }

    #[test]
    fn test_cookie_entry_debug_redacts_value() {
        let entry = CookieEntry::new("session", "super_secret_token", None);
        let debug = format!("{entry:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret_token"));
    }

    #[test]
    fn test_parse_cookies_header_only_netscape_file_is_empty() {
        let input = "# Netscape HTTP Cookie File\n# https://curl.se/docs/http-cookies.html\n";
        let (format, credential) = detect_and_parse(input).unwrap();
        assert_eq!(format, CookieFormat::Netscape);
        assert!(credential.is_empty());
    }

    #[test]
    fn test_parse_cookies_comment_without_header_is_unrecognized() {
        for input in ["#junk", "# just a note\n# another"] {
            let err = parse_cookies(Some(input)).unwrap_err();
            assert!(matches!(err, CookieError::Unrecognized { .. }), "{input}: {err:?}");
        }
    }

    #[test]
    fn test_error_message_does_not_leak_values() {
        let err = parse_cookies(Some("ok=secret_value; broken")).unwrap_err();
        assert!(!err.to_string().contains("secret_value"));
    }

    #[test]
    fn test_to_netscape_round_trips_through_parser() {
        let credential = parse_cookies(Some(r#"[{"name":"a","value":"1","domain":".vimeo.com"}]"#))
            .unwrap();
        let rendered = credential.to_netscape();
        assert!(rendered.starts_with("# Netscape HTTP Cookie File"));
        assert_eq!(parse_cookies(Some(&rendered)).unwrap(), credential);
    }

    #[test]
    fn test_to_netscape_uses_default_domain() {
        let credential = parse_cookies(Some("a=1")).unwrap();
        assert!(credential.to_netscape().contains(".vimeo.com\tTRUE\t/"));
    }
}
