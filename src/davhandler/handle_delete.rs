use futures_util::future::{BoxFuture, FutureExt};
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davheaders::Depth;
use crate::davpath::{clean_path, join, parent_path};
use crate::errors::DavError;
use crate::fs::*;
use crate::multierror::{send_report, ErrorList};
use crate::DavResult;

// Status a failed child removal is reported with.
fn child_status(e: &DavError) -> StatusCode {
    match e {
        DavError::FsError(FsError::AccessDenied) => StatusCode::FORBIDDEN,
        DavError::FsError(FsError::NotFound) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl crate::DavHandler {
    pub(crate) async fn handle_delete(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        let parent = parent_path(clean_path(path)).unwrap_or_else(|| "/".to_string());
        if !self.check_locks(txn, req, &parent) || !self.check_locks(txn, req, path) {
            return Err(StatusCode::LOCKED.into());
        }

        let _guard = self.temp_lock(txn, req, path, true, Depth::Infinity)?;

        let mut errors = ErrorList::new();
        match self.delete_resource(txn, path, &mut errors).await {
            Ok(()) if errors.is_empty() => Ok(empty_response(StatusCode::NO_CONTENT)),
            Ok(()) => send_report(&errors, &self.prefix),
            // the folder itself stays behind when a child could not be
            // removed; the children are what the client needs to see.
            Err(e) if !errors.is_empty() => {
                debug!("DELETE {path}: {e}");
                send_report(&errors, &self.prefix)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove the object at `path`, recursing into folders.
    ///
    /// Failures below `path` are recorded in `errors` and do not stop the
    /// walk. A failure on `path` itself is returned.
    pub(crate) async fn delete_resource(
        &self,
        txn: &Transaction,
        path: &str,
        errors: &mut ErrorList,
    ) -> DavResult<()> {
        match self.store.get_stored_object(txn, path).await? {
            Some(so) if so.is_folder() => {
                self.delete_folder(txn, path, errors).await;
                self.store.remove_object(txn, path).await?;
            }
            Some(_) => self.store.remove_object(txn, path).await?,
            None => return Err(StatusCode::NOT_FOUND.into()),
        }
        Ok(())
    }

    // Remove everything inside a folder, children last to first.
    fn delete_folder<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
        errors: &'a mut ErrorList,
    ) -> BoxFuture<'a, ()> {
        async move {
            let children = match self.store.get_children_names(txn, path).await {
                Ok(children) => children.unwrap_or_default(),
                Err(e) => {
                    errors.add(path, child_status(&e.into()));
                    return;
                }
            };
            for name in children.iter().rev() {
                let child = join(path, name);
                if let Err(e) = self.delete_child(txn, &child, errors).await {
                    trace!("DELETE {child}: {e}");
                    errors.add(child, child_status(&e));
                }
            }
        }
        .boxed()
    }

    async fn delete_child(
        &self,
        txn: &Transaction,
        child: &str,
        errors: &mut ErrorList,
    ) -> DavResult<()> {
        let so = self
            .store
            .get_stored_object(txn, child)
            .await?
            .ok_or(FsError::NotFound)?;
        if so.is_folder() {
            self.delete_folder(txn, child, errors).await;
        }
        self.store.remove_object(txn, child).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_statuses() {
        assert_eq!(
            child_status(&FsError::AccessDenied.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(child_status(&FsError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(
            child_status(&FsError::GeneralFailure("disk".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
