//! Simple in-memory store.
//!
//! This implementation has state, so if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemFs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. As a MemFs struct is just a handle, cloning is cheap.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, FutureExt, StreamExt};
use parking_lot::Mutex;

use crate::davpath::{clean_path, parent_path};
use crate::fs::*;

#[derive(Debug, Clone)]
enum MemNode {
    Folder {
        created: SystemTime,
        modified: SystemTime,
    },
    Resource {
        created: SystemTime,
        modified: SystemTime,
        data: Bytes,
        null_resource: bool,
    },
}

#[derive(Debug, Default)]
struct MemTree {
    nodes: BTreeMap<String, MemNode>,
    // paths on which every mutation is refused.
    protected: HashSet<String>,
}

/// Ephemeral in-memory store.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<Mutex<MemTree>>,
}

impl MemFs {
    /// Create a new, empty store. Only the root folder exists.
    pub fn new() -> Arc<MemFs> {
        let now = SystemTime::now();
        let mut tree = MemTree::default();
        tree.nodes.insert(
            "/".to_string(),
            MemNode::Folder {
                created: now,
                modified: now,
            },
        );
        Arc::new(MemFs {
            tree: Arc::new(Mutex::new(tree)),
        })
    }

    /// Refuse every create, write and remove on `path` with `AccessDenied`.
    pub fn protect(&self, path: &str) {
        self.tree.lock().protected.insert(clean_path(path).to_string());
    }

    fn check_writable(tree: &MemTree, path: &str) -> FsResult<()> {
        if tree.protected.contains(path) {
            return Err(FsError::AccessDenied);
        }
        Ok(())
    }

    fn check_parent(tree: &MemTree, path: &str) -> FsResult<()> {
        let parent = parent_path(path).ok_or(FsError::NotFound)?;
        match tree.nodes.get(parent.as_str()) {
            Some(MemNode::Folder { .. }) => Ok(()),
            Some(MemNode::Resource { .. }) => Err(FsError::GeneralFailure(format!(
                "parent of {path} is not a folder"
            ))),
            None => Err(FsError::NotFound),
        }
    }

    fn children_of(tree: &MemTree, path: &str) -> Vec<String> {
        tree.nodes
            .keys()
            .filter(|p| p.as_str() != "/" && parent_path(p).as_deref() == Some(path))
            .map(|p| p.rsplit('/').next().unwrap_or_default().to_string())
            .collect()
    }

    fn create(&self, path: &str, node: MemNode) -> FsResult<()> {
        let path = clean_path(path);
        let mut tree = self.tree.lock();
        Self::check_writable(&tree, path)?;
        if tree.nodes.contains_key(path) {
            return Err(FsError::Exists);
        }
        Self::check_parent(&tree, path)?;
        tree.nodes.insert(path.to_string(), node);
        Ok(())
    }
}

impl DavStore for MemFs {
    fn begin<'a>(&'a self, principal: Option<&'a str>) -> FsFuture<'a, Transaction> {
        async move {
            trace!("FS: begin {principal:?}");
            Ok(Transaction::new(principal))
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
            trace!("FS: rollback {}", txn.id());
            Ok(())
        }
        .boxed()
    }

    fn create_folder<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_folder {path:?}");
            let now = SystemTime::now();
            self.create(
                path,
                MemNode::Folder {
                    created: now,
                    modified: now,
                },
            )
        }
        .boxed()
    }

    fn create_resource<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_resource {path:?}");
            let now = SystemTime::now();
            self.create(
                path,
                MemNode::Resource {
                    created: now,
                    modified: now,
                    data: Bytes::new(),
                    null_resource: false,
                },
            )
        }
        .boxed()
    }

    fn get_resource_content<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, ContentStream> {
        async move {
            let tree = self.tree.lock();
            match tree.nodes.get(clean_path(path)) {
                Some(MemNode::Resource { data, .. }) => {
                    let data = data.clone();
                    Ok(stream::once(async move { Ok(data) }).boxed())
                }
                Some(MemNode::Folder { .. }) => Err(FsError::GeneralFailure(format!(
                    "{path} is a folder"
                ))),
                None => Err(FsError::NotFound),
            }
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
            trace!("FS: set_resource_content {path:?}");
            let path = clean_path(path);
            {
                let tree = self.tree.lock();
                Self::check_writable(&tree, path)?;
            }
            let mut buf = BytesMut::new();
            while let Some(chunk) = content.next().await {
                buf.extend_from_slice(&chunk?);
            }
            let len = buf.len() as u64;
            let mut tree = self.tree.lock();
            match tree.nodes.get_mut(path) {
                Some(MemNode::Resource { modified, data, .. }) => {
                    *modified = SystemTime::now();
                    *data = buf.freeze();
                    Ok(len)
                }
                Some(MemNode::Folder { .. }) => Err(FsError::GeneralFailure(format!(
                    "{path} is a folder"
                ))),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn get_children_names<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
    ) -> FsFuture<'a, Option<Vec<String>>> {
        async move {
            let path = clean_path(path);
            let tree = self.tree.lock();
            match tree.nodes.get(path) {
                Some(MemNode::Folder { .. }) => Ok(Some(Self::children_of(&tree, path))),
                _ => Ok(None),
            }
        }
        .boxed()
    }

    fn get_resource_length<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, u64> {
        async move {
            let tree = self.tree.lock();
            match tree.nodes.get(clean_path(path)) {
                Some(MemNode::Resource { data, .. }) => Ok(data.len() as u64),
                Some(MemNode::Folder { .. }) => Ok(0),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }

    fn remove_object<'a>(&'a self, _txn: &'a Transaction, path: &'a str) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_object {path:?}");
            let path = clean_path(path);
            let mut tree = self.tree.lock();
            Self::check_writable(&tree, path)?;
            if path == "/" {
                return Err(FsError::AccessDenied);
            }
            match tree.nodes.get(path) {
                None => return Err(FsError::NotFound),
                Some(MemNode::Folder { .. }) if !Self::children_of(&tree, path).is_empty() => {
                    return Err(FsError::GeneralFailure(format!("{path} is not empty")));
                }
                Some(_) => {}
            }
            tree.nodes.remove(path);
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
            let tree = self.tree.lock();
            let so = tree.nodes.get(clean_path(path)).map(|node| match node {
                MemNode::Folder { created, modified } => StoredObject::folder(*created, *modified),
                MemNode::Resource {
                    null_resource: true,
                    ..
                } => StoredObject::null_resource(),
                MemNode::Resource {
                    created,
                    modified,
                    data,
                    ..
                } => StoredObject::resource(*created, *modified, data.len() as u64),
            });
            Ok(so)
        }
        .boxed()
    }

    fn set_null_resource<'a>(
        &'a self,
        _txn: &'a Transaction,
        path: &'a str,
        null: bool,
    ) -> FsFuture<'a, ()> {
        async move {
            let mut tree = self.tree.lock();
            match tree.nodes.get_mut(clean_path(path)) {
                Some(MemNode::Resource { null_resource, .. }) => {
                    *null_resource = null;
                    Ok(())
                }
                Some(MemNode::Folder { .. }) => Err(FsError::GeneralFailure(format!(
                    "{path} is a folder"
                ))),
                None => Err(FsError::NotFound),
            }
        }
        .boxed()
    }
}
