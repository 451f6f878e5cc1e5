use headers::HeaderMapExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use xml::writer::{EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::body::Body;
use crate::davhandler::handle_lock::write_activelock;
use crate::davhandler::handle_options::not_allowed;
use crate::davheaders::Depth;
use crate::davpath::{clean_path, encode_path, file_name, join, parent_path};
use crate::davstatus::status_line;
use crate::errors::DavError;
use crate::fs::*;
use crate::util::{content_type, etag, systemtime_to_httpdate, systemtime_to_rfc3339, MemBuffer};
use crate::xmltree_ext::{emitter, finish, write_elem, ElementExt};
use crate::DavResult;

const NS_DAV_URI: &str = "DAV:";

// The properties PROPFIND with `propname` lists.
const FOLDER_PROPNAMES: &[&str] = &[
    "creationdate",
    "displayname",
    "resourcetype",
    "supportedlock",
    "source",
];
const RESOURCE_PROPNAMES: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlanguage",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
    "supportedlock",
    "source",
];

/// A property name with its namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PropName {
    ns: String,
    name: String,
}

impl PropName {
    fn from_element(e: &Element) -> PropName {
        PropName {
            ns: e.namespace_uri().to_string(),
            name: e.name.clone(),
        }
    }

    fn is_dav(&self) -> bool {
        self.ns == NS_DAV_URI
    }

    // Empty element for this property.
    fn write_empty(&self, xw: &mut EventWriter<MemBuffer>) -> DavResult<()> {
        if self.is_dav() {
            return write_elem(xw, &format!("D:{}", self.name), "");
        }
        let start = XmlWEvent::start_element(self.name.as_str());
        let start = if self.ns.is_empty() {
            start
        } else {
            start.default_ns(self.ns.as_str())
        };
        xw.write(start)?;
        xw.write(XmlWEvent::end_element())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PropfindMode {
    AllProp,
    PropName,
    Prop(Vec<PropName>),
}

// An empty body asks for all properties.
fn parse_propfind(body: &[u8]) -> DavResult<PropfindMode> {
    if body.is_empty() {
        return Ok(PropfindMode::AllProp);
    }
    let root = Element::parse2(body)?;
    if root.name != "propfind" {
        return Err(DavError::XmlParseError);
    }
    if let Some(prop) = root.child_by_name("prop") {
        let props = prop.child_elems_iter().map(PropName::from_element).collect();
        return Ok(PropfindMode::Prop(props));
    }
    if root.child_by_name("propname").is_some() {
        return Ok(PropfindMode::PropName);
    }
    Ok(PropfindMode::AllProp)
}

// Every property named under `set/prop` and `remove/prop`, in order.
fn parse_proppatch(body: &[u8]) -> DavResult<Vec<PropName>> {
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into());
    }
    let root = Element::parse2(body)?;
    if root.name != "propertyupdate" {
        return Err(DavError::XmlParseError);
    }
    let mut props = Vec::new();
    for elem in root.child_elems_iter() {
        if elem.name != "set" && elem.name != "remove" {
            continue;
        }
        if let Some(prop) = elem.child_by_name("prop") {
            props.extend(prop.child_elems_iter().map(PropName::from_element));
        }
    }
    Ok(props)
}

fn multistatus_response(body: bytes::Bytes) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::MULTI_STATUS;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/xml; charset=utf-8"),
    );
    resp
}

impl crate::DavHandler {
    pub(crate) async fn handle_propfind(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        let path = clean_path(path);
        let depth = req
            .headers()
            .typed_get::<Depth>()
            .unwrap_or(Depth::Infinity);

        let _guard = self.temp_lock(txn, req, path, false, depth)?;

        if self.store.get_stored_object(txn, path).await?.is_none() {
            return Err(StatusCode::NOT_FOUND.into());
        }
        let mode = parse_propfind(body)?;

        let mut xw = emitter("D:multistatus")?;
        // depth first, children in the order the store lists them.
        let mut todo = vec![(path.to_string(), depth)];
        let mut visited = 0;
        while let Some((cur, depth)) = todo.pop() {
            let so = match self.store.get_stored_object(txn, &cur).await? {
                Some(so) => so,
                None => continue,
            };
            self.write_propresponse(txn, &mut xw, &cur, &so, &mode)?;
            visited += 1;

            if depth == Depth::Zero || !so.is_folder() {
                continue;
            }
            if let Some(names) = self.store.get_children_names(txn, &cur).await? {
                let depth = depth.decrement();
                for name in names.iter().rev() {
                    todo.push((join(&cur, name), depth));
                }
            }
        }
        debug!("PROPFIND {path}: {visited} responses");

        Ok(multistatus_response(finish(xw)?))
    }

    // href of `path`, folders with a trailing slash.
    fn href(&self, path: &str, folder: bool) -> String {
        let mut href = encode_path(&format!("{}{}", self.prefix.trim_end_matches('/'), path));
        if folder && !href.ends_with('/') {
            href.push('/');
        }
        href
    }

    fn write_propresponse(
        &self,
        txn: &Transaction,
        xw: &mut EventWriter<MemBuffer>,
        path: &str,
        so: &StoredObject,
        mode: &PropfindMode,
    ) -> DavResult<()> {
        xw.write(XmlWEvent::start_element("D:response"))?;
        write_elem(xw, "D:href", &self.href(path, so.is_folder()))?;

        xw.write(XmlWEvent::start_element("D:propstat"))?;
        xw.write(XmlWEvent::start_element("D:prop"))?;
        let mut not_found = Vec::new();
        match mode {
            PropfindMode::AllProp => {
                for name in ["creationdate", "displayname"] {
                    self.write_prop(txn, xw, path, so, name)?;
                }
                if so.is_folder() {
                    self.write_prop(txn, xw, path, so, "resourcetype")?;
                } else {
                    for name in [
                        "getlastmodified",
                        "getcontentlength",
                        "getcontenttype",
                        "getetag",
                        "resourcetype",
                    ] {
                        self.write_prop(txn, xw, path, so, name)?;
                    }
                }
                for name in ["supportedlock", "lockdiscovery", "source"] {
                    self.write_prop(txn, xw, path, so, name)?;
                }
            }
            PropfindMode::PropName => {
                let names = if so.is_folder() {
                    FOLDER_PROPNAMES
                } else {
                    RESOURCE_PROPNAMES
                };
                for name in names {
                    write_elem(xw, &format!("D:{name}"), "")?;
                }
            }
            PropfindMode::Prop(props) => {
                for prop in props {
                    if !prop.is_dav() || !self.write_prop(txn, xw, path, so, &prop.name)? {
                        not_found.push(prop);
                    }
                }
            }
        }
        xw.write(XmlWEvent::end_element())?;
        write_elem(xw, "D:status", &status_line(StatusCode::OK))?;
        xw.write(XmlWEvent::end_element())?;

        if !not_found.is_empty() {
            xw.write(XmlWEvent::start_element("D:propstat"))?;
            xw.write(XmlWEvent::start_element("D:prop"))?;
            for prop in not_found {
                prop.write_empty(xw)?;
            }
            xw.write(XmlWEvent::end_element())?;
            write_elem(xw, "D:status", &status_line(StatusCode::NOT_FOUND))?;
            xw.write(XmlWEvent::end_element())?;
        }

        xw.write(XmlWEvent::end_element())?;
        Ok(())
    }

    // Write one live DAV: property. Returns false if `path` does not have it.
    fn write_prop(
        &self,
        txn: &Transaction,
        xw: &mut EventWriter<MemBuffer>,
        path: &str,
        so: &StoredObject,
        name: &str,
    ) -> DavResult<bool> {
        let folder = so.is_folder();
        match name {
            "creationdate" => {
                let date = so.creation_date.map(systemtime_to_rfc3339).unwrap_or_default();
                write_elem(xw, "D:creationdate", &date)?;
            }
            "displayname" => write_elem(xw, "D:displayname", file_name(path))?,
            "getcontentlanguage" if !folder => write_elem(xw, "D:getcontentlanguage", "")?,
            "getcontentlength" if !folder => {
                write_elem(xw, "D:getcontentlength", &so.resource_length.to_string())?
            }
            "getcontenttype" if !folder => {
                let ct = content_type(so, path).unwrap_or_default();
                write_elem(xw, "D:getcontenttype", &ct)?;
            }
            "getetag" if !folder && !so.is_null_resource() => {
                write_elem(xw, "D:getetag", &etag(so))?
            }
            "getlastmodified" if !folder => {
                let date = so.last_modified.map(systemtime_to_httpdate).unwrap_or_default();
                write_elem(xw, "D:getlastmodified", &date)?;
            }
            "resourcetype" => {
                if folder {
                    xw.write(XmlWEvent::start_element("D:resourcetype"))?;
                    write_elem(xw, "D:collection", "")?;
                    xw.write(XmlWEvent::end_element())?;
                } else {
                    write_elem(xw, "D:resourcetype", "")?;
                }
            }
            "source" => write_elem(xw, "D:source", "")?,
            "supportedlock" => self.write_supportedlock(txn, xw, path)?,
            "lockdiscovery" => self.write_lockdiscovery(txn, xw, path)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    // The lock scopes a new lock on `path` could still get.
    fn write_supportedlock(
        &self,
        txn: &Transaction,
        xw: &mut EventWriter<MemBuffer>,
        path: &str,
    ) -> DavResult<()> {
        let scopes: &[&str] = match self.locks.get_locked_object_by_path(txn, path) {
            Some(lo) if lo.is_locked() && lo.is_exclusive() => &[],
            Some(lo) if lo.is_locked() => &["D:shared"],
            _ => &["D:exclusive", "D:shared"],
        };
        xw.write(XmlWEvent::start_element("D:supportedlock"))?;
        for scope in scopes {
            xw.write(XmlWEvent::start_element("D:lockentry"))?;
            xw.write(XmlWEvent::start_element("D:lockscope"))?;
            write_elem(xw, scope, "")?;
            xw.write(XmlWEvent::end_element())?;
            xw.write(XmlWEvent::start_element("D:locktype"))?;
            write_elem(xw, "D:write", "")?;
            xw.write(XmlWEvent::end_element())?;
            xw.write(XmlWEvent::end_element())?;
        }
        xw.write(XmlWEvent::end_element())?;
        Ok(())
    }

    fn write_lockdiscovery(
        &self,
        txn: &Transaction,
        xw: &mut EventWriter<MemBuffer>,
        path: &str,
    ) -> DavResult<()> {
        match self.locks.get_locked_object_by_path(txn, path) {
            Some(lo) if lo.is_locked() && !lo.has_expired() => {
                xw.write(XmlWEvent::start_element("D:lockdiscovery"))?;
                write_activelock(xw, &lo)?;
                xw.write(XmlWEvent::end_element())?;
            }
            _ => write_elem(xw, "D:lockdiscovery", "")?,
        }
        Ok(())
    }

    pub(crate) async fn handle_proppatch(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        let path = clean_path(path);
        let parent = parent_path(path).unwrap_or_else(|| "/".to_string());
        if !self.check_locks(txn, req, &parent) || !self.check_locks(txn, req, path) {
            return Err(StatusCode::LOCKED.into());
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Zero)?;

        let so = match self.store.get_stored_object(txn, path).await? {
            Some(so) => so,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        if so.is_null_resource() {
            return Ok(not_allowed(Some(&so)));
        }
        let props = parse_proppatch(body)?;

        // nothing is stored; every change is acknowledged.
        let mut xw = emitter("D:multistatus")?;
        xw.write(XmlWEvent::start_element("D:response"))?;
        write_elem(&mut xw, "D:href", &self.href(path, so.is_folder()))?;
        for prop in &props {
            xw.write(XmlWEvent::start_element("D:propstat"))?;
            xw.write(XmlWEvent::start_element("D:prop"))?;
            prop.write_empty(&mut xw)?;
            xw.write(XmlWEvent::end_element())?;
            write_elem(&mut xw, "D:status", &status_line(StatusCode::OK))?;
            xw.write(XmlWEvent::end_element())?;
        }
        xw.write(XmlWEvent::end_element())?;
        debug!("PROPPATCH {path}: {} properties acknowledged", props.len());

        Ok(multistatus_response(finish(xw)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn propfind_modes() {
        assert_eq!(parse_propfind(b"").unwrap(), PropfindMode::AllProp);
        let body = br#"<D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert_eq!(parse_propfind(body).unwrap(), PropfindMode::PropName);
        let body = br#"<D:propfind xmlns:D="DAV:" xmlns:Z="urn:z">
            <D:prop><D:getetag/><Z:color/></D:prop>
            </D:propfind>"#;
        match parse_propfind(body).unwrap() {
            PropfindMode::Prop(props) => {
                assert_eq!(props.len(), 2);
                assert!(props[0].is_dav());
                assert_eq!(props[0].name, "getetag");
                assert_eq!(props[1].ns, "urn:z");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_propfind(b"<D:propfind").is_err());
    }

    #[test]
    fn proppatch_collects_set_and_remove() {
        let body = br#"<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:z">
            <D:set><D:prop><Z:author>me</Z:author></D:prop></D:set>
            <D:remove><D:prop><Z:copyright/></D:prop></D:remove>
            </D:propertyupdate>"#;
        let props = parse_proppatch(body).unwrap();
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["author", "copyright"]);
        assert_eq!(
            parse_proppatch(b"").unwrap_err().statuscode(),
            StatusCode::BAD_REQUEST
        );
    }
}
