//! Typed WebDAV request and response headers.
use headers::Header;
use http::header::{HeaderName, HeaderValue};
use regex::Regex;

/// Timeout used when a LOCK request does not ask for one.
pub const DEFAULT_TIMEOUT: u64 = 3600;
/// Longest lock lifetime handed out, one week.
pub const MAX_TIMEOUT: u64 = 604800;

lazy_static! {
    static ref DEPTH: HeaderName = HeaderName::from_static("depth");
    static ref DESTINATION: HeaderName = HeaderName::from_static("destination");
    static ref OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
    static ref TIMEOUT: HeaderName = HeaderName::from_static("timeout");
    static ref LOCK_TOKEN: HeaderName = HeaderName::from_static("lock-token");
    static ref IF: HeaderName = HeaderName::from_static("if");
    static ref DAV: HeaderName = HeaderName::from_static("dav");
    static ref MS_AUTHOR_VIA: HeaderName = HeaderName::from_static("ms-author-via");
    static ref IF_TOKEN: Regex = Regex::new(r"\(<([^>]*)>\)").unwrap();
}

fn one<'i, I>(values: &mut I) -> Result<&'i str, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    values
        .next()
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim())
        .ok_or_else(headers::Error::invalid)
}

fn value(s: &str) -> HeaderValue {
    HeaderValue::from_str(s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    /// One level less. Infinity stays infinite.
    pub fn decrement(self) -> Depth {
        match self {
            Depth::Zero | Depth::One => Depth::Zero,
            Depth::Infinity => Depth::Infinity,
        }
    }
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    // "0" and "1" are taken literally, everything else means infinity.
    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(match one(values)? {
            "0" => Depth::Zero,
            "1" => Depth::One,
            _ => Depth::Infinity,
        })
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let v = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "Infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(v)));
    }
}

/// Destination: header, undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?;
        if s.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(Destination(s.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(value(&self.0)));
    }
}

/// Overwrite: header. Only `T` (any case) means true.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(Overwrite(one(values)?.eq_ignore_ascii_case("T")))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let v = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(v)));
    }
}

/// Timeout: header, resolved to a number of seconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeout(pub u64);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        Ok(Timeout(parse_timeout(one(values)?)))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(value(&format!("Second-{}", self.0))));
    }
}

// Only the first of a comma-separated list counts. Anything that is not a
// number is taken to mean "as long as possible".
fn parse_timeout(s: &str) -> u64 {
    let first = s.split(',').next().unwrap_or_default().trim();
    let secs = match first.strip_prefix("Second-") {
        Some(n) => n.trim().parse::<i64>().ok(),
        None => first.parse::<i64>().ok(),
    };
    match secs {
        None => MAX_TIMEOUT,
        Some(n) if n <= 0 => DEFAULT_TIMEOUT,
        Some(n) => (n as u64).min(MAX_TIMEOUT),
    }
}

/// Lock-Token: header. Holds the bare lock id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(pub String);

impl Header for LockToken {
    fn name() -> &'static HeaderName {
        &LOCK_TOKEN
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?;
        let end = s.find('>').ok_or_else(headers::Error::invalid)?;
        let start = match s.find(':') {
            Some(idx) if idx < end => idx + 1,
            _ => s.find('<').map(|i| i + 1).unwrap_or_default(),
        };
        let id = s[start..end].trim();
        if id.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(LockToken(id.to_string()))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(value(&format!(
            "<opaquelocktoken:{}>",
            self.0
        ))));
    }
}

/// Lock tokens named in an `If` header.
///
/// Only the first and the last `(<token>)` group are looked at; the first
/// refers to the request URI, the last to the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfTokens {
    None,
    Single(String),
    Pair(String, String),
}

impl IfTokens {
    /// The token for the request URI.
    pub fn first(&self) -> Option<&str> {
        match self {
            IfTokens::None => None,
            IfTokens::Single(t) | IfTokens::Pair(t, _) => Some(t),
        }
    }

    /// The token for the destination of a COPY or MOVE, if there is one.
    pub fn second(&self) -> Option<&str> {
        match self {
            IfTokens::Pair(_, t) => Some(t),
            _ => None,
        }
    }
}

/// If: header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct If(pub IfTokens);

fn strip_locktoken(t: &str) -> String {
    match t.find("locktoken:") {
        Some(_) => t[t.find(':').map(|i| i + 1).unwrap_or_default()..].to_string(),
        None => t.to_string(),
    }
}

impl Header for If {
    fn name() -> &'static HeaderName {
        &IF
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?;
        let tokens: Vec<&str> = IF_TOKEN
            .captures_iter(s)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        let toks = match tokens.as_slice() {
            [] => IfTokens::None,
            [t] => IfTokens::Single(strip_locktoken(t)),
            [first, .., last] => IfTokens::Pair(strip_locktoken(first), strip_locktoken(last)),
        };
        Ok(If(toks))
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        let s = match &self.0 {
            IfTokens::None => String::new(),
            IfTokens::Single(t) => format!("(<opaquelocktoken:{t}>)"),
            IfTokens::Pair(a, b) => {
                format!("(<opaquelocktoken:{a}>) (<opaquelocktoken:{b}>)")
            }
        };
        values.extend(std::iter::once(value(&s)));
    }
}

/// DAV: response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dav(pub &'static str);

impl Header for Dav {
    fn name() -> &'static HeaderName {
        &DAV
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)? {
            "1, 2" => Ok(Dav("1, 2")),
            "1" => Ok(Dav("1")),
            _ => Err(headers::Error::invalid()),
        }
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from_static(self.0)));
    }
}

/// MS-Author-Via: response header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsAuthorVia;

impl Header for MsAuthorVia {
    fn name() -> &'static HeaderName {
        &MS_AUTHOR_VIA
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        one(values).map(|_| MsAuthorVia)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(std::iter::once(HeaderValue::from_static("DAV")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use headers::HeaderMapExt;
    use http::HeaderMap;

    fn get<H: Header>(name: &'static str, v: &'static str) -> Option<H> {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_static(v));
        map.typed_get::<H>()
    }

    #[test]
    fn depth() {
        assert_eq!(get::<Depth>("depth", "0"), Some(Depth::Zero));
        assert_eq!(get::<Depth>("depth", "1"), Some(Depth::One));
        assert_eq!(get::<Depth>("depth", "infinity"), Some(Depth::Infinity));
        assert_eq!(get::<Depth>("depth", "bogus"), Some(Depth::Infinity));
        assert_eq!(Depth::One.decrement(), Depth::Zero);
    }

    #[test]
    fn timeout() {
        assert_eq!(get::<Timeout>("timeout", "Second-60"), Some(Timeout(60)));
        assert_eq!(
            get::<Timeout>("timeout", "Second-60, Infinite"),
            Some(Timeout(60))
        );
        assert_eq!(get::<Timeout>("timeout", "Infinite"), Some(Timeout(MAX_TIMEOUT)));
        assert_eq!(get::<Timeout>("timeout", "120"), Some(Timeout(120)));
        assert_eq!(get::<Timeout>("timeout", "Second-0"), Some(Timeout(DEFAULT_TIMEOUT)));
        assert_eq!(
            get::<Timeout>("timeout", "Second-99999999"),
            Some(Timeout(MAX_TIMEOUT))
        );
    }

    #[test]
    fn overwrite() {
        assert_eq!(get::<Overwrite>("overwrite", "t"), Some(Overwrite(true)));
        assert_eq!(get::<Overwrite>("overwrite", "F"), Some(Overwrite(false)));
    }

    #[test]
    fn lock_token() {
        assert_eq!(
            get::<LockToken>("lock-token", "<opaquelocktoken:abc-123>"),
            Some(LockToken("abc-123".to_string()))
        );
        assert_eq!(get::<LockToken>("lock-token", "garbage"), None);
    }

    #[test]
    fn if_tokens() {
        assert_eq!(
            get::<If>("if", "(<opaquelocktoken:a1>)"),
            Some(If(IfTokens::Single("a1".to_string())))
        );
        assert_eq!(
            get::<If>("if", "</x> (<opaquelocktoken:a1>) </y> (<opaquelocktoken:b2>)"),
            Some(If(IfTokens::Pair("a1".to_string(), "b2".to_string())))
        );
        assert_eq!(
            get::<If>("if", "(<a>) (<b>) (<c>)"),
            Some(If(IfTokens::Pair("a".to_string(), "c".to_string())))
        );
        assert_eq!(get::<If>("if", "([etag])"), Some(If(IfTokens::None)));
    }
}
