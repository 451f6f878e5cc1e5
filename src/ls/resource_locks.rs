use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use uuid::Uuid;

use super::{LockKind, LockedObject};
use crate::davheaders::Depth;
use crate::davpath::{clean_path, parent_path};
use crate::fs::Transaction;

/// Number of node creations after which a release sweeps the tree for
/// garbage nodes.
const CLEANUP_LIMIT: u64 = 100_000;

#[derive(Debug)]
struct LockNode {
    id: String,
    owners: BTreeSet<String>,
    exclusive: bool,
    depth: Depth,
    expires_at: Option<SystemTime>,
    parent: Option<String>,
    children: HashSet<String>,
}

impl LockNode {
    fn new(parent: Option<String>) -> LockNode {
        LockNode {
            id: Uuid::new_v4().to_string(),
            owners: BTreeSet::new(),
            exclusive: false,
            depth: Depth::Infinity,
            expires_at: None,
            parent,
            children: HashSet::new(),
        }
    }

    fn is_garbage(&self) -> bool {
        self.owners.is_empty() && self.children.is_empty()
    }

    // A new lock can coexist with this node's lock only if neither is exclusive.
    fn admits(&self, exclusive: bool) -> bool {
        self.owners.is_empty() || !(self.exclusive || exclusive)
    }
}

/// One lock tree. Nodes are keyed by path, parent and child links are paths.
#[derive(Debug)]
struct LockTree {
    kind: LockKind,
    nodes: HashMap<String, LockNode>,
    by_id: HashMap<String, String>,
}

impl LockTree {
    fn new(kind: LockKind) -> LockTree {
        let root = LockNode::new(None);
        let mut by_id = HashMap::new();
        by_id.insert(root.id.clone(), "/".to_string());
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), root);
        LockTree { kind, nodes, by_id }
    }

    fn snapshot(&self, path: &str) -> Option<LockedObject> {
        let node = self.nodes.get(path)?;
        Some(LockedObject {
            path: path.to_string(),
            id: node.id.clone(),
            owners: node.owners.iter().cloned().collect(),
            exclusive: node.exclusive,
            depth: node.depth,
            expires_at: node.expires_at,
            kind: self.kind,
        })
    }

    // Create the node for `path` and every missing ancestor. Returns the
    // number of nodes created.
    fn ensure_chain(&mut self, path: &str) -> u64 {
        if self.nodes.contains_key(path) {
            return 0;
        }
        let parent = parent_path(path).unwrap_or_else(|| "/".to_string());
        let created = self.ensure_chain(&parent);
        let node = LockNode::new(Some(parent.clone()));
        self.by_id.insert(node.id.clone(), path.to_string());
        self.nodes.insert(path.to_string(), node);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.insert(path.to_string());
        }
        created + 1
    }

    // Walk from `path` up to the root. Every owned node on the way must
    // admit the new lock.
    fn check_parents(&self, path: &str, exclusive: bool) -> bool {
        let mut cur = Some(path.to_string());
        while let Some(p) = cur {
            let node = match self.nodes.get(&p) {
                Some(node) => node,
                None => return true,
            };
            if !node.admits(exclusive) {
                return false;
            }
            cur = node.parent.clone();
        }
        true
    }

    // Walk down `depth` levels. An owned node ends the descent: it admits
    // the new lock or it does not.
    fn check_children(&self, path: &str, exclusive: bool, depth: Depth) -> bool {
        let node = match self.nodes.get(path) {
            Some(node) => node,
            None => return true,
        };
        if !node.owners.is_empty() {
            return node.admits(exclusive);
        }
        if node.children.is_empty() || depth == Depth::Zero {
            return true;
        }
        let depth = depth.decrement();
        node.children
            .iter()
            .all(|c| self.check_children(c, exclusive, depth))
    }

    fn check_locks(&self, path: &str, exclusive: bool, depth: Depth) -> bool {
        self.check_parents(path, exclusive) && self.check_children(path, exclusive, depth)
    }

    fn remove_node(&mut self, path: &str) {
        if path == "/" {
            return;
        }
        if let Some(node) = self.nodes.remove(path) {
            self.by_id.remove(&node.id);
            if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
                parent.children.remove(path);
            }
        }
    }

    // Remove the node if it is garbage, then its ancestors that became
    // garbage because of that.
    fn prune_upwards(&mut self, path: &str) {
        let mut cur = Some(path.to_string());
        while let Some(p) = cur {
            if p == "/" {
                break;
            }
            match self.nodes.get(&p) {
                Some(node) if node.is_garbage() => {
                    cur = node.parent.clone();
                    self.remove_node(&p);
                }
                _ => break,
            }
        }
    }

    // Remove all garbage nodes, deepest first.
    fn sweep(&mut self) {
        let mut paths: Vec<String> = self.nodes.keys().cloned().collect();
        paths.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));
        for p in paths {
            if self.nodes.get(&p).map(|n| n.is_garbage()).unwrap_or(false) {
                self.remove_node(&p);
            }
        }
    }

    fn expire(&mut self, now: SystemTime) {
        let mut expired = Vec::new();
        for (path, node) in self.nodes.iter_mut() {
            if node.expires_at.map(|t| t <= now).unwrap_or(false) && !node.owners.is_empty() {
                trace!("LS: {:?} lock on {path} expired", self.kind);
                node.owners.clear();
                expired.push(path.clone());
            }
        }
        for p in expired {
            self.prune_upwards(&p);
        }
    }

    fn release(&mut self, path: &str, owner: &str) {
        if let Some(node) = self.nodes.get_mut(path) {
            if !node.owners.remove(owner) {
                trace!("LS: {owner} does not own {path}");
            }
        }
        self.prune_upwards(path);
    }
}

#[derive(Debug)]
struct LockTables {
    write: LockTree,
    read: LockTree,
    created: u64,
}

impl LockTables {
    fn tree(&mut self, temporary: bool) -> &mut LockTree {
        if temporary {
            &mut self.read
        } else {
            &mut self.write
        }
    }

    // The creation counter covers both trees, so both get swept.
    fn maybe_sweep(&mut self, temporary: bool) {
        if self.created > CLEANUP_LIMIT {
            debug!("LS: sweeping lock trees after {} creations", self.created);
            self.created = 0;
            self.write.sweep();
            self.read.sweep();
        }
        self.tree(temporary).expire(SystemTime::now());
    }
}

/// The lock manager.
///
/// All state sits behind one mutex. Every operation is a short
/// synchronous critical section, nothing waits for a lock to become free.
#[derive(Debug)]
pub struct ResourceLocks {
    tables: Mutex<LockTables>,
}

impl Default for ResourceLocks {
    fn default() -> Self {
        ResourceLocks::new()
    }
}

impl ResourceLocks {
    pub fn new() -> ResourceLocks {
        ResourceLocks {
            tables: Mutex::new(LockTables {
                write: LockTree::new(LockKind::Write),
                read: LockTree::new(LockKind::Read),
                created: 0,
            }),
        }
    }

    /// Try to lock `path` for `owner`.
    ///
    /// Returns false if a conflicting lock exists on the path, on one of its
    /// ancestors, or on a descendant within `depth`. Locking again for an
    /// owner that already holds the lock succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn lock(
        &self,
        txn: &Transaction,
        path: &str,
        owner: &str,
        exclusive: bool,
        depth: Depth,
        timeout: u64,
        temporary: bool,
    ) -> bool {
        let path = clean_path(path);
        let mut tables = self.tables.lock();
        tables.tree(temporary).expire(SystemTime::now());
        let created = tables.tree(temporary).ensure_chain(path);
        tables.created += created;

        let tree = tables.tree(temporary);
        if !tree.check_locks(path, exclusive, depth) {
            trace!("LS: {} lock on {path} for {owner} refused (txn {})", kind_name(temporary), txn.id());
            // don't leave the nodes we just created behind.
            tree.prune_upwards(path);
            return false;
        }

        let expires_at = deadline(timeout);
        let parent = match tree.nodes.get_mut(path) {
            Some(node) => {
                node.exclusive = exclusive;
                node.depth = depth;
                node.expires_at = expires_at;
                node.owners.insert(owner.to_string());
                node.parent.clone()
            }
            None => return false,
        };
        // an ancestor that only holds the tree together inherits the expiry.
        if let Some(parent) = parent.and_then(|p| tree.nodes.get_mut(&p)) {
            if parent.owners.is_empty() {
                parent.expires_at = expires_at;
            }
        }
        trace!("LS: {} lock on {path} for {owner} granted", kind_name(temporary));
        true
    }

    /// Exclusive client lock.
    pub fn exclusive_lock(
        &self,
        txn: &Transaction,
        path: &str,
        owner: &str,
        depth: Depth,
        timeout: u64,
    ) -> bool {
        self.lock(txn, path, owner, true, depth, timeout, false)
    }

    /// Shared client lock.
    pub fn shared_lock(
        &self,
        txn: &Transaction,
        path: &str,
        owner: &str,
        depth: Depth,
        timeout: u64,
    ) -> bool {
        self.lock(txn, path, owner, false, depth, timeout, false)
    }

    /// Remove `owner` from the client lock `id`.
    ///
    /// The node goes away once it has neither owners nor children. Returns
    /// false if `id` is unknown.
    pub fn unlock(&self, _txn: &Transaction, id: &str, owner: &str) -> bool {
        let mut tables = self.tables.lock();
        let found = match tables.write.by_id.get(id).cloned() {
            Some(path) => {
                trace!("LS: unlock {path} for {owner}");
                tables.write.release(&path, owner);
                true
            }
            None => {
                trace!("LS: unlock of unknown lock {id}");
                false
            }
        };
        tables.maybe_sweep(false);
        found
    }

    /// Release the temporary lock that `owner` holds on `path`.
    pub fn unlock_temporary_locked_objects(&self, _txn: &Transaction, path: &str, owner: &str) {
        let path = clean_path(path);
        let mut tables = self.tables.lock();
        if tables.read.nodes.contains_key(path) {
            tables.read.release(path, owner);
        } else {
            trace!("LS: no temporary lock on {path}");
        }
        tables.maybe_sweep(true);
    }

    /// Drop every lock in the selected tree that has expired.
    pub fn check_timeouts(&self, _txn: &Transaction, temporary: bool) {
        self.tables.lock().tree(temporary).expire(SystemTime::now());
    }

    /// Push the expiry of client lock `id` to `timeout` seconds from now.
    pub fn refresh_lock(&self, _txn: &Transaction, id: &str, timeout: u64) -> Option<LockedObject> {
        let mut tables = self.tables.lock();
        let path = tables.write.by_id.get(id)?.clone();
        let node = tables.write.nodes.get_mut(&path)?;
        if node.owners.is_empty() {
            return None;
        }
        node.expires_at = deadline(timeout);
        tables.write.snapshot(&path)
    }

    pub fn get_locked_object_by_id(&self, _txn: &Transaction, id: &str) -> Option<LockedObject> {
        let tables = self.tables.lock();
        let path = tables.write.by_id.get(id)?;
        tables.write.snapshot(path)
    }

    pub fn get_locked_object_by_path(&self, _txn: &Transaction, path: &str) -> Option<LockedObject> {
        self.tables.lock().write.snapshot(clean_path(path))
    }

    pub fn get_temp_locked_object_by_id(&self, _txn: &Transaction, id: &str) -> Option<LockedObject> {
        let tables = self.tables.lock();
        let path = tables.read.by_id.get(id)?;
        tables.read.snapshot(path)
    }

    pub fn get_temp_locked_object_by_path(
        &self,
        _txn: &Transaction,
        path: &str,
    ) -> Option<LockedObject> {
        self.tables.lock().read.snapshot(clean_path(path))
    }
}

// `timeout` seconds from now, or never if that does not fit in a SystemTime.
fn deadline(timeout: u64) -> Option<SystemTime> {
    SystemTime::now().checked_add(Duration::from_secs(timeout))
}

fn kind_name(temporary: bool) -> &'static str {
    if temporary {
        "temporary"
    } else {
        "client"
    }
}
