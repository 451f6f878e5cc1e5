//! Status codes and their reason phrases.
//!
//! `http::StatusCode` knows 207 and 423, but gives 418 its teapot
//! meaning and has no reason phrase for 419 and 420. The WebDAV
//! layer uses its own table.
use std::collections::HashMap;

use http::StatusCode;

lazy_static! {
    /// 418, reused for WebDAV "Unprocessable Entity".
    pub static ref SC_UNPROCESSABLE_ENTITY: StatusCode = status(418);
    /// 419 Insufficient Space On Resource.
    pub static ref SC_INSUFFICIENT_SPACE_ON_RESOURCE: StatusCode = status(419);
    /// 420 Method Failure.
    pub static ref SC_METHOD_FAILURE: StatusCode = status(420);
    static ref REASONS: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(200, "OK");
        m.insert(201, "Created");
        m.insert(202, "Accepted");
        m.insert(204, "No Content");
        m.insert(207, "Multi-Status");
        m.insert(301, "Moved Permanently");
        m.insert(302, "Moved Temporarily");
        m.insert(304, "Not Modified");
        m.insert(400, "Bad Request");
        m.insert(401, "Unauthorized");
        m.insert(403, "Forbidden");
        m.insert(404, "Not Found");
        m.insert(405, "Method Not Allowed");
        m.insert(409, "Conflict");
        m.insert(412, "Precondition Failed");
        m.insert(413, "Request Too Long");
        m.insert(415, "Unsupported Media Type");
        m.insert(418, "Unprocessable Entity");
        m.insert(419, "Insufficient Space On Resource");
        m.insert(420, "Method Failure");
        m.insert(423, "Locked");
        m.insert(500, "Internal Server Error");
        m.insert(501, "Not Implemented");
        m.insert(502, "Bad Gateway");
        m.insert(503, "Service Unavailable");
        m.insert(504, "Gateway Timeout");
        m.insert(505, "HTTP Version Not Supported");
        m
    };
}

// only called with literals in range.
fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Reason phrase for `code`. Unknown codes get an empty phrase.
pub fn status_text(code: StatusCode) -> &'static str {
    REASONS.get(&code.as_u16()).copied().unwrap_or("")
}

/// `HTTP/1.1 <code> <text>`, as used in multistatus bodies.
pub fn status_line(code: StatusCode) -> String {
    format!("HTTP/1.1 {} {}", code.as_u16(), status_text(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webdav_reason_phrases() {
        assert_eq!(status_text(*SC_METHOD_FAILURE), "Method Failure");
        assert_eq!(status_text(*SC_UNPROCESSABLE_ENTITY), "Unprocessable Entity");
        assert_eq!(
            status_line(StatusCode::MULTI_STATUS),
            "HTTP/1.1 207 Multi-Status"
        );
        assert_eq!(status_line(StatusCode::LOCKED), "HTTP/1.1 423 Locked");
        assert_eq!(
            SC_INSUFFICIENT_SPACE_ON_RESOURCE.as_u16(),
            419
        );
    }
}
