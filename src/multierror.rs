use http::{Response, StatusCode};
use xml::writer::XmlEvent as XmlWEvent;

use crate::body::Body;
use crate::davpath::encode_path;
use crate::davstatus::status_line;
use crate::errors::DavError;
use crate::xmltree_ext::{emitter, finish, write_elem};
use crate::DavResult;

/// Per-path outcome of a recursive operation, in the order the failures
/// happened. Recording a path twice keeps the last status.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct ErrorList(Vec<(String, StatusCode)>);

impl ErrorList {
    pub fn new() -> ErrorList {
        ErrorList(Vec::new())
    }

    pub fn add(&mut self, path: impl Into<String>, status: StatusCode) {
        let path = path.into();
        match self.0.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = status,
            None => self.0.push((path, status)),
        }
    }

    pub fn append(&mut self, other: ErrorList) {
        for (path, status) in other.0 {
            self.add(path, status);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, StatusCode)> {
        self.0.iter()
    }
}

impl<S: Into<String>> FromIterator<(S, StatusCode)> for ErrorList {
    fn from_iter<I: IntoIterator<Item = (S, StatusCode)>>(iter: I) -> Self {
        let mut list = ErrorList::new();
        for (path, status) in iter {
            list.add(path, status);
        }
        list
    }
}

/// Render an error list.
///
/// A single entry becomes a plain status response. Anything else becomes
/// a 207 multistatus with one `response` per path, hrefs below `prefix`.
pub(crate) fn send_report(errors: &ErrorList, prefix: &str) -> DavResult<Response<Body>> {
    if errors.len() == 1 {
        let (path, status) = &errors.0[0];
        debug!("report: {path} {status}");
        return Err(DavError::Status(*status));
    }

    let mut xw = emitter("D:multistatus")?;
    for (path, status) in errors.iter() {
        xw.write(XmlWEvent::start_element("D:response"))?;
        let href = format!("{}{}", prefix.trim_end_matches('/'), path);
        write_elem(&mut xw, "D:href", &encode_path(&href))?;
        write_elem(&mut xw, "D:status", &status_line(*status))?;
        xw.write(XmlWEvent::end_element())?;
    }
    let body = finish(xw)?;

    let resp = Response::builder()
        .status(StatusCode::MULTI_STATUS)
        .header("content-type", "text/xml; charset=utf-8")
        .body(Body::from(body))
        .map_err(|_| DavError::Status(StatusCode::INTERNAL_SERVER_ERROR))?;
    Ok(resp)
}
