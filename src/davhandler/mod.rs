//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::error::Error as StdError;
use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use async_stream::stream;
use bytes::{self, buf::Buf};
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body::Body as HttpBody;
use uuid::Uuid;

use crate::body::Body;
use crate::davheaders::{self, Depth};
use crate::davpath::relative_path;
use crate::errors::DavError;
use crate::fs::*;
use crate::ls::{ResourceLocks, TEMP_TIMEOUT};
use crate::util::{dav_method, systemtime_to_millis, DavMethod};
use crate::DavResult;

pub(crate) mod handle_copymove;
pub(crate) mod handle_delete;
pub(crate) mod handle_gethead;
pub(crate) mod handle_lock;
pub(crate) mod handle_mkcol;
pub(crate) mod handle_options;
pub(crate) mod handle_props;
pub(crate) mod handle_put;

// Largest request body we read into memory (everything but PUT).
const MAX_XML_BODY: usize = 65536;

/// Configuration of the handler.
#[derive(Clone)]
pub struct DavBuilder {
    /// Prefix to be stripped off when handling request.
    prefix: String,
    /// Storage backend.
    store: Arc<dyn DavStore>,
    /// Lock manager. A fresh one unless shared explicitly.
    locks: Option<Arc<ResourceLocks>>,
    /// Set of allowed methods (Defaults to "all methods")
    allow: DavMethod,
    /// Principal is webdav speak for "user", passed to the store when a
    /// transaction begins.
    principal: Option<String>,
    /// Refuse every modifying method with 403.
    read_only: bool,
    /// GET on a folder redirects to this file inside it.
    default_index_file: Option<String>,
    /// GET/HEAD on a missing path serve this path instead.
    instead_of_404: Option<String>,
    /// Send Content-Length on GET/HEAD.
    content_length_header: bool,
    /// PUT creates missing parent folders.
    lazy_folder_creation_on_put: bool,
}

impl DavBuilder {
    /// Create a new configuration builder.
    pub fn new(store: Arc<dyn DavStore>) -> DavBuilder {
        Self {
            prefix: String::new(),
            store,
            locks: None,
            allow: DavMethod::WEBDAV_RW,
            principal: None,
            read_only: false,
            default_index_file: None,
            instead_of_404: None,
            content_length_header: true,
            lazy_folder_creation_on_put: false,
        }
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build(self) -> DavHandler {
        self.into()
    }

    /// Prefix to be stripped off before translating the rest of
    /// the request path to a store path.
    pub fn strip_prefix(self, prefix: impl Into<String>) -> Self {
        let mut this = self;
        this.prefix = prefix.into();
        this
    }

    /// Share a lock manager between handlers.
    pub fn lock_manager(self, locks: Arc<ResourceLocks>) -> Self {
        let mut this = self;
        this.locks = Some(locks);
        this
    }

    /// Which methods to allow (default is all methods).
    pub fn methods(self, allow: DavMethod) -> Self {
        let mut this = self;
        this.allow = allow;
        this
    }

    /// Set the name of the "webdav principal".
    pub fn principal(self, principal: impl Into<String>) -> Self {
        let mut this = self;
        this.principal = Some(principal.into());
        this
    }

    /// Read-only mode (default is false).
    pub fn read_only(self, read_only: bool) -> Self {
        let mut this = self;
        this.read_only = read_only;
        this
    }

    /// GET on a folder redirects to this file inside the folder.
    pub fn default_index_file(self, name: impl Into<String>) -> Self {
        let mut this = self;
        this.default_index_file = Some(name.into());
        this
    }

    /// GET/HEAD on a path that does not exist serve this path instead, with
    /// status 404.
    pub fn instead_of_404(self, path: impl Into<String>) -> Self {
        let mut this = self;
        this.instead_of_404 = Some(path.into());
        this
    }

    /// Send a Content-Length header on GET/HEAD (default is true).
    pub fn content_length_header(self, enabled: bool) -> Self {
        let mut this = self;
        this.content_length_header = enabled;
        this
    }

    /// Create missing parent folders on PUT (default is false).
    pub fn lazy_folder_creation_on_put(self, enabled: bool) -> Self {
        let mut this = self;
        this.lazy_folder_creation_on_put = enabled;
        this
    }
}

/// The webdav handler struct.
///
/// The `new` and `build` etc methods are used to instantiate a handler.
///
/// The `handle` and `handle_with` methods are the methods that do the actual work.
#[derive(Clone)]
pub struct DavHandler {
    pub(crate) prefix: Arc<String>,
    pub(crate) store: Arc<dyn DavStore>,
    pub(crate) locks: Arc<ResourceLocks>,
    pub(crate) allow: DavMethod,
    pub(crate) principal: Option<Arc<String>>,
    pub(crate) read_only: bool,
    pub(crate) default_index_file: Option<Arc<String>>,
    pub(crate) instead_of_404: Option<Arc<String>>,
    pub(crate) content_length_header: bool,
    pub(crate) lazy_folder_creation_on_put: bool,
}

impl From<DavBuilder> for DavHandler {
    fn from(cfg: DavBuilder) -> Self {
        Self {
            prefix: Arc::new(cfg.prefix),
            store: cfg.store,
            locks: cfg.locks.unwrap_or_default(),
            allow: cfg.allow,
            principal: cfg.principal.map(Arc::new),
            read_only: cfg.read_only,
            default_index_file: cfg.default_index_file.map(Arc::new),
            instead_of_404: cfg.instead_of_404.map(Arc::new),
            content_length_header: cfg.content_length_header,
            lazy_folder_creation_on_put: cfg.lazy_folder_creation_on_put,
        }
    }
}

/// Unique id the dispatcher gives every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RequestId(pub Uuid);

/// A temporary lock, released when dropped.
pub(crate) struct TempLock<'a> {
    locks: &'a ResourceLocks,
    txn: &'a Transaction,
    path: String,
    owner: String,
}

impl Drop for TempLock<'_> {
    fn drop(&mut self) {
        self.locks
            .unlock_temporary_locked_objects(self.txn, &self.path, &self.owner);
    }
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder(store: Arc<dyn DavStore>) -> DavBuilder {
        DavBuilder::new(store)
    }

    /// The lock manager this handler uses.
    pub fn lock_manager(&self) -> &Arc<ResourceLocks> {
        &self.locks
    }

    /// Handle a webdav request.
    pub async fn handle<ReqBody, ReqData, ReqError>(&self, req: Request<ReqBody>) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        self.handle_inner(req).await
    }

    /// Handle a webdav request, overriding parts of the config.
    ///
    /// For example, the `principal` can be set for this request.
    pub async fn handle_with<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
        prefix: Option<String>,
        principal: Option<String>,
    ) -> Response<Body>
    where
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    {
        let mut this = self.clone();
        if let Some(prefix) = prefix {
            this.prefix = Arc::new(format!(
                "{}/{}",
                this.prefix.strip_suffix('/').unwrap_or(&this.prefix),
                prefix.strip_prefix('/').unwrap_or(&prefix)
            ));
        }
        if let Some(principal) = principal {
            this.principal = Some(Arc::new(principal));
        }
        this.handle_inner(req).await
    }
}

impl DavHandler {
    // drain request body and return length.
    pub(crate) async fn read_request<ReqBody, ReqData, ReqError>(
        &self,
        body: ReqBody,
        max_size: usize,
    ) -> DavResult<Vec<u8>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError>,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            let mut buf = res.map_err(|_| {
                DavError::IoError(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "UnexpectedEof",
                ))
            })?;
            while buf.has_remaining() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                let b = buf.chunk();
                let l = b.len();
                data.extend_from_slice(b);
                buf.advance(l);
            }
        }
        Ok(data)
    }

    // Owner string for temporary locks: method, time, request id.
    pub(crate) fn temp_owner(&self, req: &Request<()>) -> String {
        let id = req
            .extensions()
            .get::<RequestId>()
            .map(|r| r.0)
            .unwrap_or_else(Uuid::new_v4);
        format!(
            "{}{}-{}",
            req.method(),
            systemtime_to_millis(SystemTime::now()),
            id
        )
    }

    /// Take a temporary lock on `path` for the duration of the request.
    pub(crate) fn temp_lock<'a>(
        &'a self,
        txn: &'a Transaction,
        req: &Request<()>,
        path: &str,
        exclusive: bool,
        depth: Depth,
    ) -> DavResult<TempLock<'a>> {
        let owner = self.temp_owner(req);
        if !self
            .locks
            .lock(txn, path, &owner, exclusive, depth, TEMP_TIMEOUT, true)
        {
            debug!("temporary lock on {path} refused");
            return Err(StatusCode::LOCKED.into());
        }
        Ok(TempLock {
            locks: &self.locks,
            txn,
            path: path.to_string(),
            owner,
        })
    }

    /// True unless `path` holds an exclusive client lock whose token is not
    /// named in the `If` header.
    pub(crate) fn check_locks(&self, txn: &Transaction, req: &Request<()>, path: &str) -> bool {
        let lo = match self.locks.get_locked_object_by_path(txn, path) {
            Some(lo) => lo,
            None => return true,
        };
        if !lo.is_locked() || lo.is_shared() || lo.has_expired() {
            return true;
        }
        let tokens = match req.headers().typed_get::<davheaders::If>() {
            Some(davheaders::If(tokens)) => tokens,
            None => return false,
        };
        let matched = [tokens.first(), tokens.second()]
            .into_iter()
            .flatten()
            .any(|t| {
                self.locks
                    .get_locked_object_by_id(txn, t)
                    .map(|by_id| by_id.id == lo.id)
                    .unwrap_or(false)
            });
        matched
    }

    // internal dispatcher.
    async fn handle_inner<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> Response<Body>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let is_ms = req
            .headers()
            .get("user-agent")
            .and_then(|s| s.to_str().ok())
            .map(|s| s.contains("Microsoft"))
            .unwrap_or(false);

        // Turn any DavError results into a HTTP error response.
        match self.handle2(req).await {
            Ok(resp) => {
                debug!("== END REQUEST result {}", resp.status());
                resp
            }
            Err(err) => {
                if err.is_store_failure() {
                    error!("== END REQUEST result {err}");
                } else {
                    debug!("== END REQUEST result {err:?}");
                }
                let mut resp = empty_response(err.statuscode());
                let h = resp.headers_mut();
                if is_ms && err.statuscode() == StatusCode::NOT_FOUND {
                    // This is an attempt to convince Windows to not
                    // cache a 404 NOT_FOUND for 30-60 seconds.
                    h.insert(
                        "cache-control",
                        http::HeaderValue::from_static("no-store, no-cache, must-revalidate"),
                    );
                    h.insert("pragma", http::HeaderValue::from_static("no-cache"));
                    h.insert("expires", http::HeaderValue::from_static("0"));
                    h.insert("vary", http::HeaderValue::from_static("*"));
                }
                h.typed_insert(headers::ContentLength(0));
                if err.must_close() {
                    h.insert("connection", http::HeaderValue::from_static("close"));
                }
                resp
            }
        }
    }

    // internal dispatcher part 2.
    async fn handle2<ReqBody, ReqData, ReqError>(
        &self,
        req: Request<ReqBody>,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let (mut req, body) = {
            let (parts, body) = req.into_parts();
            (Request::from_parts(parts, ()), body)
        };

        // translate HTTP method to Webdav method. Unknown methods end up
        // in the catch-all handler.
        let method = dav_method(req.method()).ok();

        // see if method is allowed.
        if let Some(m) = method {
            if !self.allow.contains(m) {
                debug!(
                    "method {} not allowed on request {}",
                    req.method(),
                    req.uri()
                );
                return Err(DavError::StatusClose(StatusCode::METHOD_NOT_ALLOWED));
            }
        }

        // make sure the request path is valid.
        let path = relative_path(&req, &self.prefix)?;

        // PUT is the only handler that reads the body itself. All the
        // other handlers either expected no body, or a pre-read Vec<u8>.
        let (body_strm, body_data) = match method {
            Some(m) if m == DavMethod::PUT => (Some(body), Vec::new()),
            _ => (None, self.read_request(body, MAX_XML_BODY).await?),
        };

        // Not all methods accept a body.
        if let Some(m) = method {
            if !DavMethod::WEBDAV_BODY.contains(m) && !body_data.is_empty() {
                return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE.into());
            }
        }

        req.extensions_mut().insert(RequestId(Uuid::new_v4()));
        debug!("== START REQUEST {} {}", req.method(), path);

        let principal = self.principal.as_deref().map(|p| p.as_str());
        let txn = self.store.begin(principal).await?;
        let res = match self.store.check_authentication(&txn).await {
            Ok(()) => {
                self.dispatch(method, &txn, &req, &path, body_strm, &body_data)
                    .await
            }
            Err(FsError::Unauthenticated) => {
                debug!("request {} {} not authenticated", req.method(), path);
                Err(StatusCode::FORBIDDEN.into())
            }
            Err(e) => Err(e.into()),
        };

        // Expected outcomes (4xx, multistatus) are committed, only
        // unexpected failures roll back.
        match &res {
            Err(e) if e.is_store_failure() => {
                if let Err(e) = self.store.rollback(&txn).await {
                    error!("rollback of {} failed: {e}", txn.id());
                }
            }
            _ => self.store.commit(&txn).await?,
        }
        res
    }

    async fn dispatch<ReqBody, ReqData, ReqError>(
        &self,
        method: Option<DavMethod>,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
        body_strm: Option<ReqBody>,
        body_data: &[u8],
    ) -> DavResult<Response<Body>>
    where
        ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
        ReqData: Buf + Send + 'static,
        ReqError: StdError + Send + Sync + 'static,
    {
        let method = match method {
            Some(m) => m,
            None => return self.handle_not_implemented(req),
        };
        match method {
            m if m == DavMethod::OPTIONS => self.handle_options(txn, req, path).await,
            m if m == DavMethod::PROPFIND => self.handle_propfind(txn, req, path, body_data).await,
            m if m == DavMethod::PROPPATCH => {
                self.handle_proppatch(txn, req, path, body_data).await
            }
            m if m == DavMethod::MKCOL => self.handle_mkcol(txn, req, path).await,
            m if m == DavMethod::DELETE => self.handle_delete(txn, req, path).await,
            m if m == DavMethod::LOCK => self.handle_lock(txn, req, path, body_data).await,
            m if m == DavMethod::UNLOCK => self.handle_unlock(txn, req, path).await,
            m if m == DavMethod::HEAD || m == DavMethod::GET => {
                self.handle_get(txn, req, path).await
            }
            m if m == DavMethod::COPY => self.handle_copy(txn, req, path).await,
            m if m == DavMethod::MOVE => self.handle_move(txn, req, path).await,
            m if m == DavMethod::PUT => match body_strm {
                Some(body) => self.handle_put(txn, req, path, body_stream(body)).await,
                None => Err(StatusCode::BAD_REQUEST.into()),
            },
            _ => self.handle_not_implemented(req),
        }
    }
}

/// Response with an empty body.
pub(crate) fn empty_response(status: StatusCode) -> Response<Body> {
    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = status;
    resp
}

// Turn a request body into store content.
fn body_stream<ReqBody, ReqData, ReqError>(body: ReqBody) -> ContentStream
where
    ReqBody: HttpBody<Data = ReqData, Error = ReqError> + Send + 'static,
    ReqData: Buf + Send + 'static,
    ReqError: StdError + Send + Sync + 'static,
{
    Box::pin(stream! {
        pin_utils::pin_mut!(body);
        while let Some(res) = body.data().await {
            match res {
                Ok(mut buf) => {
                    let len = buf.remaining();
                    yield Ok(buf.copy_to_bytes(len));
                }
                Err(e) => {
                    yield Err(FsError::GeneralFailure(e.to_string()));
                    break;
                }
            }
        }
    })
}
