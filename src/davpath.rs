//! Utility functions to handle request paths.
//!
//! All paths that go to the store and the lock manager are absolute,
//! decoded, `/`-separated strings relative to the handler prefix.
use http::Request;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::errors::DavError;
use crate::DavResult;

// Characters left alone when a path is put into an href.
const PATH_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'*')
    .remove(b'/');

/// Request extension that marks an internal include.
///
/// When present, its path is used instead of the path of the request URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedPath(pub String);

/// Strip `prefix` off `path`. `None` if the path is not below the prefix.
fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn decode(s: &str) -> DavResult<String> {
    percent_decode_str(s)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DavError::InvalidPath)
}

/// The path that a request operates on.
///
/// An `IncludedPath` extension takes precedence. Otherwise the URI path is
/// decoded and the handler prefix stripped off. Either way the result is
/// normalized and cleaned, so one resource always has one path: `//f`,
/// `/./f` and `/f/` all become `/f`.
pub(crate) fn relative_path<B>(req: &Request<B>, prefix: &str) -> DavResult<String> {
    let path = match req.extensions().get::<IncludedPath>() {
        Some(IncludedPath(p)) => normalize(p).ok_or(DavError::InvalidPath)?,
        None => {
            let path = normalize(&decode(req.uri().path())?).ok_or(DavError::InvalidPath)?;
            match strip_prefix(&path, prefix) {
                Some(p) => p.to_string(),
                None => {
                    debug!("path {path} is not below prefix {prefix}");
                    return Err(DavError::InvalidPath);
                }
            }
        }
    };
    if path.is_empty() {
        return Ok("/".to_string());
    }
    Ok(clean_path(&path).to_string())
}

/// Remove a trailing slash, except from the root.
pub fn clean_path(path: &str) -> &str {
    if path.len() > 1 && path.ends_with('/') {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Everything up to the last slash. The parent of `/a` is `/`, the root
/// has no parent.
pub fn parent_path(path: &str) -> Option<String> {
    let path = clean_path(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Last path segment.
pub fn file_name(path: &str) -> &str {
    clean_path(path).rsplit('/').next().unwrap_or_default()
}

/// Join a folder path and a child name.
pub fn join(folder: &str, name: &str) -> String {
    let folder = clean_path(folder);
    if folder == "/" {
        format!("/{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// Collapse `//`, `/./` and `/../` segments.
///
/// Backslashes count as separators. Returns `None` if the path tries to
/// climb above the root.
pub fn normalize(path: &str) -> Option<String> {
    if path == "/." {
        return Some("/".to_string());
    }
    let path = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    let mut out = String::from("/");
    out.push_str(&segments.join("/"));
    // keep a trailing slash, it marks a collection.
    if path.ends_with('/') && out.len() > 1 {
        out.push('/');
    }
    Some(out)
}

/// Turn a `Destination` header value into a relative path.
///
/// Accepts an absolute URL, a host-relative form (`host:port/path`,
/// `:port/path`) and a plain absolute path. `server_name` is the host part
/// of the request, `prefix` the handler prefix.
pub(crate) fn parse_destination(dest: &str, server_name: Option<&str>, prefix: &str) -> DavResult<String> {
    let path = if dest.contains("://") {
        match url::Url::parse(dest) {
            Ok(url) => decode(url.path())?,
            Err(_) => {
                let dest = decode(dest)?;
                let start = dest.find("://").map(|i| i + 3).unwrap_or_default();
                match dest[start..].find('/') {
                    Some(idx) => dest[start + idx..].to_string(),
                    None => "/".to_string(),
                }
            }
        }
    } else {
        let mut dest = decode(dest)?;
        if let Some(host) = server_name.filter(|h| !h.is_empty()) {
            if let Some(rest) = dest.strip_prefix(host) {
                dest = rest.to_string();
            }
        }
        if let Some(idx) = dest.find(':') {
            dest = dest[idx..].to_string();
        }
        if dest.starts_with(':') {
            dest = match dest.find('/') {
                Some(idx) => dest[idx..].to_string(),
                None => "/".to_string(),
            };
        }
        dest
    };

    let path = normalize(&path).ok_or(DavError::InvalidPath)?;
    let path = strip_prefix(&path, prefix).unwrap_or(&path);
    if path.is_empty() {
        return Ok("/".to_string());
    }
    Ok(clean_path(path).to_string())
}

/// Percent-encode a path for use in an href.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SAFE).to_string()
}
