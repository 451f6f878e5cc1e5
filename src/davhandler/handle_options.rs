use headers::HeaderMapExt;
use http::{HeaderValue, Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davheaders::{Dav, Depth, MsAuthorVia};
use crate::fs::{StoredObject, Transaction};
use crate::DavResult;

const NULL_RESOURCE_METHODS_ALLOWED: &str = "OPTIONS, MKCOL, PUT";
const LOCK_NULL_METHODS_ALLOWED: &str = "OPTIONS, MKCOL, PUT, PROPFIND, LOCK, UNLOCK";
const RESOURCE_METHODS_ALLOWED: &str =
    "OPTIONS, GET, HEAD, POST, DELETE, TRACE, PROPPATCH, COPY, MOVE, LOCK, UNLOCK, PROPFIND";
const FOLDER_METHODS_ALLOWED: &str =
    "OPTIONS, GET, HEAD, POST, DELETE, TRACE, PROPPATCH, COPY, MOVE, LOCK, UNLOCK, PROPFIND, PUT";

/// Value of the `Allow` header for an object in this state.
pub(crate) fn methods_allowed(so: Option<&StoredObject>) -> &'static str {
    match so {
        None => NULL_RESOURCE_METHODS_ALLOWED,
        Some(so) if so.is_null_resource() => LOCK_NULL_METHODS_ALLOWED,
        Some(so) if so.is_folder() => FOLDER_METHODS_ALLOWED,
        Some(_) => RESOURCE_METHODS_ALLOWED,
    }
}

/// 405 Method Not Allowed, with the methods that are.
pub(crate) fn not_allowed(so: Option<&StoredObject>) -> Response<Body> {
    let mut resp = empty_response(StatusCode::METHOD_NOT_ALLOWED);
    resp.headers_mut()
        .insert("allow", HeaderValue::from_static(methods_allowed(so)));
    resp
}

impl crate::DavHandler {
    pub(crate) async fn handle_options(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        let _guard = self.temp_lock(txn, req, path, false, Depth::Zero)?;

        let so = self.store.get_stored_object(txn, path).await?;

        let mut res = empty_response(StatusCode::OK);
        let h = res.headers_mut();
        h.typed_insert(Dav("1, 2"));
        h.insert("allow", HeaderValue::from_static(methods_allowed(so.as_ref())));
        h.typed_insert(MsAuthorVia);
        h.typed_insert(headers::ContentLength(0));
        Ok(res)
    }

    /// Catch-all for methods we do not know.
    pub(crate) fn handle_not_implemented(&self, req: &Request<()>) -> DavResult<Response<Body>> {
        debug!("method {} not implemented", req.method());
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        Err(StatusCode::NOT_IMPLEMENTED.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn allow_table() {
        let now = SystemTime::now();
        assert_eq!(methods_allowed(None), "OPTIONS, MKCOL, PUT");
        assert_eq!(
            methods_allowed(Some(&StoredObject::null_resource())),
            "OPTIONS, MKCOL, PUT, PROPFIND, LOCK, UNLOCK"
        );
        assert!(methods_allowed(Some(&StoredObject::folder(now, now))).ends_with(", PUT"));
        assert!(!methods_allowed(Some(&StoredObject::resource(now, now, 1))).contains("PUT"));
    }
}
