use futures_util::future::{BoxFuture, FutureExt};
use headers::HeaderMapExt;
use http::{header, Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davhandler::handle_options::not_allowed;
use crate::davheaders::{self, Depth};
use crate::davpath::{clean_path, join, parent_path, parse_destination};
use crate::errors::DavError;
use crate::fs::*;
use crate::multierror::{send_report, ErrorList};
use crate::DavResult;

// Result of the copy phase shared by COPY and MOVE.
enum Copied {
    // stopped before anything was written.
    Aborted(Response<Body>),
    // copied, possibly with failures below the destination.
    Done(StatusCode, ErrorList),
}

// A resource can not be copied onto itself or into its own subtree.
fn check_target(path: &str, dest: &str) -> DavResult<()> {
    let path = clean_path(path);
    let inside = path == "/" || dest.starts_with(&format!("{path}/"));
    if dest == path || inside {
        debug!("destination {dest} is {path} or below it");
        return Err(StatusCode::FORBIDDEN.into());
    }
    Ok(())
}

// Status a failed child copy is reported with.
fn child_status(e: &DavError) -> StatusCode {
    match e {
        DavError::FsError(FsError::AccessDenied) => StatusCode::FORBIDDEN,
        DavError::FsError(FsError::NotFound) => StatusCode::NOT_FOUND,
        DavError::FsError(FsError::Exists) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl crate::DavHandler {
    pub(crate) async fn handle_copy(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        let dest = self.destination(req)?;
        check_target(path, &dest)?;

        let _guard = self.temp_lock(txn, req, path, false, Depth::Infinity)?;

        match self.copy_resource(txn, req, path, &dest).await? {
            Copied::Aborted(resp) => Ok(resp),
            Copied::Done(status, errors) if errors.is_empty() => Ok(empty_response(status)),
            Copied::Done(_, errors) => send_report(&errors, &self.prefix),
        }
    }

    pub(crate) async fn handle_move(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        if self.read_only {
            return Err(StatusCode::FORBIDDEN.into());
        }
        if !self.check_locks(txn, req, path) {
            return Err(StatusCode::LOCKED.into());
        }
        let dest = self.destination(req)?;
        if !self.check_locks(txn, req, &dest) {
            return Err(StatusCode::LOCKED.into());
        }

        check_target(path, &dest)?;

        let _guard = self.temp_lock(txn, req, path, true, Depth::Infinity)?;

        let (status, mut errors) = match self.copy_resource(txn, req, path, &dest).await? {
            Copied::Aborted(resp) => return Ok(resp),
            Copied::Done(status, errors) => (status, errors),
        };

        let mut delete_errors = ErrorList::new();
        if let Err(e) = self.delete_resource(txn, path, &mut delete_errors).await {
            if delete_errors.is_empty() {
                return Err(e);
            }
            debug!("MOVE {path}: source not removed: {e}");
        }
        errors.append(delete_errors);

        if errors.is_empty() {
            Ok(empty_response(status))
        } else {
            send_report(&errors, &self.prefix)
        }
    }

    // The Destination header as a relative path.
    fn destination(&self, req: &Request<()>) -> DavResult<String> {
        let dest = match req.headers().typed_get::<davheaders::Destination>() {
            Some(davheaders::Destination(dest)) => dest,
            None => return Err(StatusCode::BAD_REQUEST.into()),
        };
        let host = req
            .headers()
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h));
        parse_destination(&dest, host, &self.prefix)
    }

    async fn copy_resource(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        dest: &str,
    ) -> DavResult<Copied> {
        let dest_parent = parent_path(clean_path(dest)).unwrap_or_else(|| "/".to_string());
        if !self.check_locks(txn, req, &dest_parent) || !self.check_locks(txn, req, dest) {
            return Err(StatusCode::LOCKED.into());
        }
        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map(|davheaders::Overwrite(o)| o)
            .unwrap_or(true);
        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Zero) => Depth::Zero,
            _ => Depth::Infinity,
        };

        let _guard = self.temp_lock(txn, req, dest, true, Depth::Infinity)?;

        let source = match self.store.get_stored_object(txn, path).await? {
            Some(so) => so,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        if source.is_null_resource() {
            return Ok(Copied::Aborted(not_allowed(Some(&source))));
        }

        let mut errors = ErrorList::new();
        let status = match self.store.get_stored_object(txn, dest).await? {
            Some(_) if !overwrite => return Err(StatusCode::PRECONDITION_FAILED.into()),
            Some(_) => {
                if let Err(e) = self.delete_resource(txn, dest, &mut errors).await {
                    if errors.is_empty() {
                        return Err(e);
                    }
                    debug!("copy to {dest}: destination not removed: {e}");
                    return Ok(Copied::Aborted(send_report(&errors, &self.prefix)?));
                }
                StatusCode::NO_CONTENT
            }
            None => StatusCode::CREATED,
        };

        if source.is_folder() {
            self.copy_folder(txn, path, dest, depth, &mut errors).await?;
        } else {
            self.copy_content(txn, &source, path, dest).await?;
        }
        debug!("copied {path} to {dest}: {status}, {} failures", errors.len());
        Ok(Copied::Done(status, errors))
    }

    // Create `dest` as a resource holding the content of `path`.
    async fn copy_content(
        &self,
        txn: &Transaction,
        source: &StoredObject,
        path: &str,
        dest: &str,
    ) -> DavResult<()> {
        self.store.create_resource(txn, dest).await?;
        let content = self.store.get_resource_content(txn, path).await?;
        let len = self
            .store
            .set_resource_content(txn, dest, content, source.mime_type.as_deref(), None)
            .await?;
        trace!("copy {path} -> {dest}: {len} bytes");
        Ok(())
    }

    // Create `dest` as a folder and, unless `depth` is zero, copy every
    // child of `path` into it. Child failures go into `errors`.
    fn copy_folder<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
        dest: &'a str,
        depth: Depth,
        errors: &'a mut ErrorList,
    ) -> BoxFuture<'a, DavResult<()>> {
        async move {
            self.store.create_folder(txn, dest).await?;
            if depth == Depth::Zero {
                return Ok(());
            }
            let children = self
                .store
                .get_children_names(txn, path)
                .await?
                .unwrap_or_default();
            for name in children.iter().rev() {
                let child = join(path, name);
                let child_dest = join(dest, name);
                if let Err(e) = self.copy_child(txn, &child, &child_dest, errors).await {
                    trace!("copy {child} -> {child_dest}: {e}");
                    errors.add(child_dest, child_status(&e));
                }
            }
            Ok(())
        }
        .boxed()
    }

    async fn copy_child(
        &self,
        txn: &Transaction,
        path: &str,
        dest: &str,
        errors: &mut ErrorList,
    ) -> DavResult<()> {
        let so = self
            .store
            .get_stored_object(txn, path)
            .await?
            .ok_or(FsError::NotFound)?;
        if so.is_folder() {
            self.copy_folder(txn, path, dest, Depth::Infinity, errors).await
        } else {
            self.copy_content(txn, &so, path, dest).await
        }
    }
}
