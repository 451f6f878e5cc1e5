//! Contains the structs and traits that define a store backend.
//!
//! The protocol layer never touches storage directly. Everything goes
//! through [`DavStore`], which hands out [`StoredObject`] snapshots and
//! streams resource content in and out.
//!
//! Every call takes the [`Transaction`] that the handler obtained from
//! [`DavStore::begin`] at the start of the request; the handler commits
//! or rolls it back when the request is done.
use std::fmt::Debug;
use std::io;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use uuid::Uuid;

#[cfg(any(docsrs, feature = "localfs"))]
pub mod localfs;
#[cfg(any(docsrs, feature = "memfs"))]
pub mod memfs;

/// Errors generated by a store implementation.
///
/// These are more result-codes than errors, really.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// Operation not implemented (501)
    #[error("not implemented")]
    NotImplemented,
    /// Something went wrong (500)
    #[error("store failure: {0}")]
    GeneralFailure(String),
    /// The object already exists (409 in most places)
    #[error("object already exists")]
    Exists,
    /// The object does not exist (404)
    #[error("object not found")]
    NotFound,
    /// Not allowed (403)
    #[error("access denied")]
    AccessDenied,
    /// The transaction has no valid principal (403)
    #[error("not authenticated")]
    Unauthenticated,
}

/// The Result type.
pub type FsResult<T> = std::result::Result<T, FsError>;

/// Future returned by almost all of the DavStore methods.
pub type FsFuture<'a, T> = BoxFuture<'a, FsResult<T>>;

/// Resource content, as a stream of chunks.
pub type ContentStream = BoxStream<'static, FsResult<Bytes>>;

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::AccessDenied,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure(e.to_string()),
        }
    }
}

impl From<&io::Error> for FsError {
    fn from(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound,
            io::ErrorKind::PermissionDenied => FsError::AccessDenied,
            io::ErrorKind::AlreadyExists => FsError::Exists,
            _ => FsError::GeneralFailure(e.to_string()),
        }
    }
}

/// Unit of work against a store.
///
/// Opaque to the protocol layer. Stores that have real transactions can key
/// their state on `id()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
    principal: Option<String>,
}

impl Transaction {
    pub fn new(principal: Option<&str>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            principal: principal.map(|p| p.to_string()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

/// Snapshot of a folder or resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub folder: bool,
    pub creation_date: Option<SystemTime>,
    pub last_modified: Option<SystemTime>,
    pub resource_length: u64,
    pub mime_type: Option<String>,
    /// Locked, but without content yet.
    pub null_resource: bool,
}

impl StoredObject {
    pub fn folder(created: SystemTime, modified: SystemTime) -> StoredObject {
        StoredObject {
            folder: true,
            creation_date: Some(created),
            last_modified: Some(modified),
            resource_length: 0,
            mime_type: None,
            null_resource: false,
        }
    }

    pub fn resource(created: SystemTime, modified: SystemTime, len: u64) -> StoredObject {
        StoredObject {
            folder: false,
            creation_date: Some(created),
            last_modified: Some(modified),
            resource_length: len,
            mime_type: None,
            null_resource: false,
        }
    }

    /// A lock-null resource carries no metadata at all.
    pub fn null_resource() -> StoredObject {
        StoredObject {
            folder: false,
            creation_date: None,
            last_modified: None,
            resource_length: 0,
            mime_type: None,
            null_resource: true,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn is_resource(&self) -> bool {
        !self.folder
    }

    pub fn is_null_resource(&self) -> bool {
        self.null_resource
    }
}

/// The trait that defines a store.
///
/// Paths are absolute, `/`-separated and already decoded.
pub trait DavStore: Sync + Send {
    /// Start a unit of work for `principal`.
    fn begin<'a>(&'a self, principal: Option<&'a str>) -> FsFuture<'a, Transaction>;

    /// Fails with `FsError::Unauthenticated` if the transaction may not proceed.
    fn check_authentication<'a>(&'a self, txn: &'a Transaction) -> FsFuture<'a, ()>;

    fn commit<'a>(&'a self, txn: &'a Transaction) -> FsFuture<'a, ()>;

    fn rollback<'a>(&'a self, txn: &'a Transaction) -> FsFuture<'a, ()>;

    fn create_folder<'a>(&'a self, txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()>;

    /// Create an empty resource.
    fn create_resource<'a>(&'a self, txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()>;

    fn get_resource_content<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, ContentStream>;

    /// Replace the content of a resource. Returns the number of bytes
    /// written, which also becomes the resource length.
    fn set_resource_content<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
        content: ContentStream,
        content_type: Option<&'a str>,
        encoding: Option<&'a str>,
    ) -> FsFuture<'a, u64>;

    /// Names of the children of a folder, `None` if `path` is not a folder.
    fn get_children_names<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, Option<Vec<String>>>;

    fn get_resource_length<'a>(&'a self, txn: &'a Transaction, path: &'a str) -> FsFuture<'a, u64>;

    /// Remove a resource or an empty folder.
    fn remove_object<'a>(&'a self, txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()>;

    fn get_stored_object<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, Option<StoredObject>>;

    /// Mark or unmark the object at `path` as a lock-null resource.
    fn set_null_resource<'a>(
        &'a self,
        txn: &'a Transaction,
        path: &'a str,
        null_resource: bool,
    ) -> FsFuture<'a, ()>;
}

impl Debug for dyn DavStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DavStore")
    }
}
