use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davhandler::handle_options::not_allowed;
use crate::davheaders::Depth;
use crate::davpath::{clean_path, parent_path};
use crate::fs::*;
use crate::DavResult;

impl crate::DavHandler {
    pub(crate) async fn handle_mkcol(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        // the root always exists.
        let parent = match parent_path(clean_path(path)) {
            Some(parent) => parent,
            None => return Err(StatusCode::FORBIDDEN.into()),
        };
        if !self.check_locks(txn, req, &parent) {
            debug!("MKCOL {path}: parent {parent} is locked");
            return Err(StatusCode::FORBIDDEN.into());
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Zero)?;

        let parent_so = match self.store.get_stored_object(txn, &parent).await? {
            Some(so) => so,
            None => return Err(StatusCode::CONFLICT.into()),
        };
        if !parent_so.is_folder() {
            return Ok(not_allowed(Some(&parent_so)));
        }

        match self.store.get_stored_object(txn, path).await? {
            None => {
                self.store.create_folder(txn, path).await?;
            }
            Some(so) if so.is_null_resource() => {
                self.claim_lock_null(txn, req, path)?;
                self.store.remove_object(txn, path).await?;
                self.store.create_folder(txn, path).await?;
            }
            Some(so) => return Ok(not_allowed(Some(&so))),
        }
        Ok(empty_response(StatusCode::CREATED))
    }
}
