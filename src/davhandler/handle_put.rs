use headers::HeaderMapExt;
use http::{header, Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davheaders::{Depth, If, IfTokens};
use crate::davpath::{clean_path, parent_path};
use crate::fs::*;
use crate::multierror::{send_report, ErrorList};
use crate::DavResult;

// Some clients want to see a particular status after a PUT.
fn put_status(user_agent: Option<&str>) -> StatusCode {
    match user_agent {
        Some(ua) if ua.contains("Transmit") => StatusCode::NO_CONTENT,
        _ => StatusCode::CREATED,
    }
}

impl crate::DavHandler {
    pub(crate) async fn handle_put(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        content: ContentStream,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        let parent = parent_path(clean_path(path)).unwrap_or_else(|| "/".to_string());

        if !self.check_locks(txn, req, &parent) {
            let errors: ErrorList = [(parent, StatusCode::LOCKED)].into_iter().collect();
            return send_report(&errors, &self.prefix);
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Zero)?;

        match self.store.get_stored_object(txn, &parent).await? {
            Some(p) if p.is_resource() => return Err(StatusCode::FORBIDDEN.into()),
            Some(_) => {}
            None if self.lazy_folder_creation_on_put => {
                debug!("PUT {path}: creating parent folder {parent}");
                self.store.create_folder(txn, &parent).await?;
            }
            None => {
                let errors: ErrorList = [(parent, StatusCode::NOT_FOUND)].into_iter().collect();
                return send_report(&errors, &self.prefix);
            }
        }

        match self.store.get_stored_object(txn, path).await? {
            None => {
                if !self.check_locks(txn, req, path) {
                    let errors: ErrorList =
                        [(path.to_string(), StatusCode::LOCKED)].into_iter().collect();
                    return send_report(&errors, &self.prefix);
                }
                self.store.create_resource(txn, path).await?;
            }
            Some(so) if so.is_null_resource() => {
                self.claim_lock_null(txn, req, path)?;
                self.store.set_null_resource(txn, path, false).await?;
            }
            Some(_) => {
                if !self.check_locks(txn, req, path) {
                    let errors: ErrorList =
                        [(path.to_string(), StatusCode::LOCKED)].into_iter().collect();
                    return send_report(&errors, &self.prefix);
                }
            }
        }

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let encoding = req
            .headers()
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok());
        let len = self
            .store
            .set_resource_content(txn, path, content, content_type, encoding)
            .await?;
        debug!("PUT {path}: {len} bytes");

        let ua = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok());
        Ok(empty_response(put_status(ua)))
    }

    /// Release the lock that holds the lock-null resource at `path`, so the
    /// caller can turn it into a real object.
    ///
    /// The request must carry the token of that lock.
    pub(crate) fn claim_lock_null(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<()> {
        let lo = match self.locks.get_locked_object_by_path(txn, path) {
            Some(lo) if lo.is_locked() => lo,
            _ => {
                error!("lock-null resource {path} has no lock");
                return Err(StatusCode::INTERNAL_SERVER_ERROR.into());
            }
        };
        let tokens = req
            .headers()
            .typed_get::<If>()
            .map(|If(t)| t)
            .unwrap_or(IfTokens::None);
        let token = match tokens.first() {
            Some(t) => t,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };
        if token != lo.id {
            debug!("lock-null resource {path}: token {token} does not match");
            return Err(StatusCode::LOCKED.into());
        }
        let owner = lo.owners.first().map(|s| s.as_str()).unwrap_or_default();
        if !self.locks.unlock(txn, &lo.id, owner) {
            return Err(StatusCode::INTERNAL_SERVER_ERROR.into());
        }
        Ok(())
    }
}
