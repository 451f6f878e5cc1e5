use std::io::Write;
use std::time::SystemTime;

use headers::HeaderMapExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use xml::writer::{EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davheaders::{self, Depth, IfTokens, DEFAULT_TIMEOUT};
use crate::davpath::{clean_path, parent_path};
use crate::davstatus::SC_METHOD_FAILURE;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::LockedObject;
use crate::util::systemtime_to_millis;
use crate::xmltree_ext::{emitter, finish, write_elem, ElementExt};
use crate::DavResult;

// What a LOCK request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockInfo {
    exclusive: bool,
    owner: String,
}

// Parse a `lockinfo` body. Scope, type and owner are all required.
fn parse_lockinfo(body: &[u8]) -> DavResult<LockInfo> {
    if body.is_empty() {
        return Err(StatusCode::BAD_REQUEST.into());
    }
    let root = Element::parse2(body)?;
    if root.name != "lockinfo" {
        return Err(DavError::XmlParseError);
    }

    let scope = root
        .child_by_name("lockscope")
        .and_then(|s| s.child_elems_iter().next())
        .ok_or(DavError::XmlParseError)?;
    let exclusive = match scope.name.as_str() {
        "exclusive" => true,
        "shared" => false,
        _ => return Err(DavError::XmlParseError),
    };

    let locktype = root
        .child_by_name("locktype")
        .and_then(|t| t.child_elems_iter().next())
        .ok_or(DavError::XmlParseError)?;
    if locktype.name != "write" {
        return Err(DavError::XmlParseError);
    }

    let owner = root.child_by_name("owner").ok_or(DavError::XmlParseError)?;
    let owner = match owner.child_by_name("href") {
        Some(href) => href.text(),
        None => owner.text(),
    }
    .ok_or(DavError::XmlParseError)?;

    Ok(LockInfo {
        exclusive,
        owner: owner.to_string(),
    })
}

/// Write a `D:activelock` element describing `lo`.
pub(crate) fn write_activelock<W: Write>(
    xw: &mut EventWriter<W>,
    lo: &LockedObject,
) -> DavResult<()> {
    xw.write(XmlWEvent::start_element("D:activelock"))?;

    xw.write(XmlWEvent::start_element("D:locktype"))?;
    write_elem(xw, "D:write", "")?;
    xw.write(XmlWEvent::end_element())?;

    xw.write(XmlWEvent::start_element("D:lockscope"))?;
    write_elem(
        xw,
        if lo.is_exclusive() {
            "D:exclusive"
        } else {
            "D:shared"
        },
        "",
    )?;
    xw.write(XmlWEvent::end_element())?;

    let depth = match lo.depth {
        Depth::Zero => "0",
        Depth::One => "1",
        Depth::Infinity => "Infinity",
    };
    write_elem(xw, "D:depth", depth)?;

    xw.write(XmlWEvent::start_element("D:owner"))?;
    for owner in &lo.owners {
        write_elem(xw, "D:href", owner)?;
    }
    xw.write(XmlWEvent::end_element())?;

    let timeout = match lo.time_left() {
        Some(secs) => format!("Second-{secs}"),
        None => "Infinite".to_string(),
    };
    write_elem(xw, "D:timeout", &timeout)?;

    xw.write(XmlWEvent::start_element("D:locktoken"))?;
    write_elem(xw, "D:href", &lo.token())?;
    xw.write(XmlWEvent::end_element())?;

    xw.write(XmlWEvent::end_element())?;
    Ok(())
}

// 200 with the lock discovery of `lo` and its token.
fn lock_response(lo: &LockedObject) -> DavResult<Response<Body>> {
    let mut xw = emitter("D:prop")?;
    xw.write(XmlWEvent::start_element("D:lockdiscovery"))?;
    write_activelock(&mut xw, lo)?;
    xw.write(XmlWEvent::end_element())?;
    let body = finish(xw)?;

    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = StatusCode::OK;
    let h = resp.headers_mut();
    h.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/xml; charset=utf-8"),
    );
    h.typed_insert(davheaders::LockToken(lo.id.clone()));
    Ok(resp)
}

impl crate::DavHandler {
    pub(crate) async fn handle_lock(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        body: &[u8],
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Zero)?;

        let timeout = req
            .headers()
            .typed_get::<davheaders::Timeout>()
            .map(|davheaders::Timeout(t)| t)
            .unwrap_or(DEFAULT_TIMEOUT);

        // an If header means refresh.
        let tokens = req
            .headers()
            .typed_get::<davheaders::If>()
            .map(|davheaders::If(t)| t)
            .unwrap_or(IfTokens::None);
        if let Some(token) = tokens.first() {
            // the token has to name a lock on this very path.
            match self.locks.get_locked_object_by_id(txn, token) {
                Some(lo) if lo.path == path => {}
                _ => return Err(StatusCode::PRECONDITION_FAILED.into()),
            }
            return match self.locks.refresh_lock(txn, token, timeout) {
                Some(lo) => {
                    debug!("LOCK {path}: refreshed {} for {timeout}s", lo.id);
                    lock_response(&lo)
                }
                None => Err(StatusCode::PRECONDITION_FAILED.into()),
            };
        }

        let ua = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        let info = match ua {
            // the Finder sends nothing we can use.
            Some(ua) if ua.contains("Darwin") => LockInfo {
                exclusive: true,
                owner: format!("{}{}", ua, systemtime_to_millis(SystemTime::now())),
            },
            _ => parse_lockinfo(body)?,
        };
        let depth = req
            .headers()
            .typed_get::<Depth>()
            .unwrap_or(Depth::Infinity);

        let exists = self.store.get_stored_object(txn, path).await?.is_some();
        if !self
            .locks
            .lock(txn, path, &info.owner, info.exclusive, depth, timeout, false)
        {
            debug!("LOCK {path}: refused");
            return Err(StatusCode::LOCKED.into());
        }
        let lo = self
            .locks
            .get_locked_object_by_path(txn, path)
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

        if !exists {
            if let Err(e) = self.create_lock_null(txn, path).await {
                self.locks.unlock(txn, &lo.id, &info.owner);
                return Err(e);
            }
        }

        debug!(
            "LOCK {path}: {} {} for {timeout}s",
            if info.exclusive { "exclusive" } else { "shared" },
            lo.id
        );
        lock_response(&lo)
    }

    // Create missing ancestor folders, then an empty resource flagged as
    // lock-null at `path`.
    async fn create_lock_null(&self, txn: &Transaction, path: &str) -> DavResult<()> {
        let mut ancestors = Vec::new();
        let mut cur = parent_path(clean_path(path));
        while let Some(p) = cur {
            cur = parent_path(&p);
            ancestors.push(p);
        }
        for folder in ancestors.iter().rev() {
            match self.store.get_stored_object(txn, folder).await? {
                Some(so) if so.is_folder() => {}
                Some(_) => return Err(StatusCode::PRECONDITION_FAILED.into()),
                None => {
                    trace!("LOCK {path}: creating folder {folder}");
                    self.store.create_folder(txn, folder).await?;
                }
            }
        }
        self.store.create_resource(txn, path).await?;
        self.store.set_null_resource(txn, path, true).await?;
        Ok(())
    }

    pub(crate) async fn handle_unlock(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Zero)?;

        let id = match req.headers().typed_get::<davheaders::LockToken>() {
            Some(davheaders::LockToken(id)) => id,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let lo = match self.locks.get_locked_object_by_id(txn, &id) {
            Some(lo) => lo,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };

        // a shared lock goes away with all its owners.
        let released = if lo.is_shared() {
            lo.owners
                .iter()
                .all(|owner| self.locks.unlock(txn, &id, owner))
        } else {
            let owner = lo.owners.first().map(|s| s.as_str()).unwrap_or_default();
            self.locks.unlock(txn, &id, owner)
        };
        if !released {
            debug!("UNLOCK {path}: {id} could not be released");
            return Err((*SC_METHOD_FAILURE).into());
        }

        let emptied = self
            .locks
            .get_locked_object_by_id(txn, &id)
            .map(|lo| !lo.is_locked())
            .unwrap_or(true);
        if emptied {
            if let Some(so) = self.store.get_stored_object(txn, &lo.path).await? {
                if so.is_null_resource() {
                    debug!("UNLOCK {}: removing lock-null resource", lo.path);
                    self.store.remove_object(txn, &lo.path).await?;
                }
            }
        }
        Ok(empty_response(StatusCode::NO_CONTENT))
    }
}
