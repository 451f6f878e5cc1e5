//! Local filesystem store.
//!
//! Serves a directory on the local filesystem. The filesystem has no
//! transactions, so `commit` and `rollback` do nothing, and no place to keep
//! the lock-null flag, so that lives in memory for as long as the store does.
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_stream::stream;
use bytes::BytesMut;
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::davpath::clean_path;
use crate::fs::*;

// Size of the chunks resource content is streamed in.
const READ_BUF_SIZE: usize = 65536;

/// Local Filesystem implementation.
#[derive(Debug)]
pub struct LocalFs {
    basedir: PathBuf,
    public: bool,
    null_resources: Mutex<HashSet<String>>,
}

impl LocalFs {
    /// Create a new LocalFs store, serving "base".
    ///
    /// If "public" is set to true, all files and directories created will be
    /// publically readable (mode 644/755), otherwise they will be private
    /// (mode 600/700). Umask still overrides this.
    pub fn new(base: impl Into<PathBuf>, public: bool) -> Arc<LocalFs> {
        Arc::new(LocalFs {
            basedir: base.into(),
            public,
            null_resources: Mutex::new(HashSet::new()),
        })
    }

    // Map a store path onto the filesystem. `..` never leaves the base.
    fn abs_path(&self, path: &str) -> FsResult<PathBuf> {
        let mut pathbuf = self.basedir.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return Err(FsError::AccessDenied);
            }
            pathbuf.push(segment);
        }
        Ok(pathbuf)
    }

    fn is_null_resource(&self, path: &str) -> bool {
        self.null_resources.lock().contains(clean_path(path))
    }
}

fn stored_object(meta: &std::fs::Metadata, null_resource: bool) -> StoredObject {
    let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let created = meta.created().unwrap_or(modified);
    if meta.is_dir() {
        return StoredObject::folder(created, modified);
    }
    let mut so = StoredObject::resource(created, modified, meta.len());
    so.null_resource = null_resource;
    so
}

async fn open_for_write(path: &Path, create_new: bool, public: bool) -> io::Result<tokio::fs::File> {
    let mut opt = tokio::fs::OpenOptions::new();
    opt.write(true).create(true).truncate(true);
    if create_new {
        opt.create_new(true);
    }
    #[cfg(unix)]
    if public {
        opt.mode(0o644);
    } else {
        opt.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = public;
    opt.open(path).await
}

impl DavStore for LocalFs {
    fn begin<'a>(&'a self, principal: Option<&'a str>) -> FsFuture<'a, Transaction> {
        async move {
            let txn = Transaction::new(principal);
            trace!("FS: begin {}", txn.id());
            Ok(txn)
        }
        .boxed()
    }

    fn check_authentication<'a>(&'a self, _txn: &'a Transaction) -> FsFuture<'a, ()> {
        async move { Ok(()) }.boxed()
    }

    fn commit<'a>(&'a self, txn: &'a Transaction) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: commit {}", txn.id());
            Ok(())
        }
        .boxed()
    }

    fn rollback<'a>(&'a self, txn: &'a Transaction) -> FsFuture<'a, ()> {
        async move {
            warn!("FS: rollback {} requested, local changes stay", txn.id());
            Ok(())
        }
        .boxed()
    }

    fn create_folder<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_folder {path}");
            let abs = self.abs_path(path)?;
            #[allow(unused_mut)]
            let mut dir = tokio::fs::DirBuilder::new();
            #[cfg(unix)]
            dir.mode(if self.public { 0o755 } else { 0o700 });
            dir.create(abs).await?;
            Ok(())
        }
        .boxed()
    }

    fn create_resource<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_resource {path}");
            let abs = self.abs_path(path)?;
            open_for_write(&abs, true, self.public).await?;
            Ok(())
        }
        .boxed()
    }

    fn get_resource_content<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, ContentStream> {
        async move {
            trace!("FS: get_resource_content {path}");
            let abs = self.abs_path(path)?;
            let mut file = tokio::fs::File::open(abs).await?;
            Ok(Box::pin(stream! {
                loop {
                    let mut buf = BytesMut::with_capacity(READ_BUF_SIZE);
                    match file.read_buf(&mut buf).await {
                        Ok(0) => break,
                        Ok(_) => yield Ok(buf.freeze()),
                        Err(e) => {
                            yield Err(FsError::from(e));
                            break;
                        }
                    }
                }
            }) as ContentStream)
        }
        .boxed()
    }

    fn set_resource_content<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
        mut content: ContentStream,
        _content_type: Option<&'a str>,
        _encoding: Option<&'a str>,
    ) -> FsFuture<'a, u64> {
        async move {
            let abs = self.abs_path(path)?;
            let mut file = open_for_write(&abs, false, self.public).await?;
            let mut len = 0u64;
            while let Some(chunk) = content.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                len += chunk.len() as u64;
            }
            file.flush().await?;
            trace!("FS: set_resource_content {path}: {len} bytes");
            Ok(len)
        }
        .boxed()
    }

    fn get_children_names<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, Option<Vec<String>>> {
        async move {
            let abs = self.abs_path(path)?;
            if !tokio::fs::metadata(&abs).await?.is_dir() {
                return Ok(None);
            }
            let mut names = Vec::new();
            let mut read_dir = tokio::fs::read_dir(&abs).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                match entry.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(name) => debug!("FS: skipping non-utf8 name {name:?} in {path}"),
                }
            }
            Ok(Some(names))
        }
        .boxed()
    }

    fn get_resource_length<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, u64> {
        async move {
            let abs = self.abs_path(path)?;
            Ok(tokio::fs::metadata(abs).await?.len())
        }
        .boxed()
    }

    fn remove_object<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_object {path}");
            if clean_path(path) == "/" {
                return Err(FsError::AccessDenied);
            }
            let abs = self.abs_path(path)?;
            if tokio::fs::symlink_metadata(&abs).await?.is_dir() {
                tokio::fs::remove_dir(abs).await?;
            } else {
                tokio::fs::remove_file(abs).await?;
            }
            self.null_resources.lock().remove(clean_path(path));
            Ok(())
        }
        .boxed()
    }

    fn get_stored_object<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, Option<StoredObject>> {
        async move {
            let abs = self.abs_path(path)?;
            match tokio::fs::metadata(abs).await {
                Ok(meta) => Ok(Some(stored_object(&meta, self.is_null_resource(path)))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        }
        .boxed()
    }

    fn set_null_resource<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
        null_resource: bool,
    ) -> FsFuture<'a, ()> {
        async move {
            let path = clean_path(path).to_string();
            trace!("FS: set_null_resource {path} {null_resource}");
            let mut nulls = self.null_resources.lock();
            if null_resource {
                nulls.insert(path);
            } else {
                nulls.remove(&path);
            }
            Ok(())
        }
        .boxed()
    }
}
