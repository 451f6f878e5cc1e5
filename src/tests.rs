use std::sync::Arc;

use futures_util::StreamExt;
use http::{HeaderMap, Method, Request, StatusCode};

use crate::body::Body;
use crate::davheaders::Depth;
use crate::fs::DavStore;
use crate::{DavHandler, MemFs};

const EXCLUSIVE: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:exclusive/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>alice</D:href></D:owner>
</D:lockinfo>"#;

fn shared(owner: &str) -> String {
    format!(
        r#"<D:lockinfo xmlns:D="DAV:">
  <D:lockscope><D:shared/></D:lockscope>
  <D:locktype><D:write/></D:locktype>
  <D:owner><D:href>{owner}</D:href></D:owner>
</D:lockinfo>"#
    )
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
}

impl Reply {
    fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    // the opaquelocktoken uri out of a Lock-Token header.
    fn lock_token(&self) -> String {
        self.header("lock-token")
            .trim_start_matches('<')
            .trim_end_matches('>')
            .to_string()
    }
}

fn setup() -> (Arc<MemFs>, DavHandler) {
    let _ = env_logger::builder().is_test(true).try_init();
    let fs = MemFs::new();
    let dh = DavHandler::builder(fs.clone()).build();
    (fs, dh)
}

async fn request(
    dh: &DavHandler,
    method: &str,
    path: &str,
    headers: &[(&str, &str)],
    body: &str,
) -> Reply {
    let mut req = Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(format!("http://localhost{path}"));
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    let req = req.body(Body::from(body.to_string())).unwrap();

    let resp = dh.handle(req).await;
    let (parts, mut body) = resp.into_parts();
    let mut data = Vec::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk.unwrap());
    }
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8(data).unwrap(),
    }
}

async fn put(dh: &DavHandler, path: &str, content: &str) {
    let r = request(dh, "PUT", path, &[], content).await;
    assert!(r.status.is_success(), "PUT {path}: {}", r.status);
}

async fn mkcol(dh: &DavHandler, path: &str) {
    let r = request(dh, "MKCOL", path, &[], "").await;
    assert_eq!(r.status, StatusCode::CREATED, "MKCOL {path}");
}

async fn exists(fs: &MemFs, path: &str) -> bool {
    let txn = fs.begin(None).await.unwrap();
    fs.get_stored_object(&txn, path).await.unwrap().is_some()
}

#[tokio::test]
async fn options_headers() {
    let (_, dh) = setup();
    put(&dh, "/f", "x").await;

    let r = request(&dh, "OPTIONS", "/", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("dav"), "1, 2");
    assert!(r.header("allow").contains("PROPFIND"));
    assert!(r.header("allow").contains("PUT"));

    let r = request(&dh, "OPTIONS", "/f", &[], "").await;
    assert!(!r.header("allow").contains("MKCOL"));

    let r = request(&dh, "OPTIONS", "/missing", &[], "").await;
    assert_eq!(r.header("allow"), "OPTIONS, MKCOL, PUT");
}

#[tokio::test]
async fn unknown_method_and_read_only() {
    let (fs, dh) = setup();
    let r = request(&dh, "TRACE", "/", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_IMPLEMENTED);

    let ro = DavHandler::builder(fs.clone()).read_only(true).build();
    for method in ["PUT", "MKCOL", "DELETE", "PROPPATCH", "LOCK", "TRACE"] {
        let r = request(&ro, method, "/x", &[], "").await;
        assert_eq!(r.status, StatusCode::FORBIDDEN, "{method}");
    }
    assert!(!exists(&fs, "/x").await);

    let r = request(&ro, "PROPFIND", "/", &[("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
}

#[tokio::test]
async fn put_get_head() {
    let (_, dh) = setup();
    let r = request(&dh, "PUT", "/hello.txt", &[], "hello").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let r = request(&dh, "PUT", "/hello.txt", &[], "hello world").await;
    assert_eq!(r.status, StatusCode::CREATED);

    let r = request(&dh, "GET", "/hello.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.body, "hello world");
    assert!(r.header("etag").starts_with("W/\"11-"));
    assert!(r.header("content-type").starts_with("text/plain"));

    let etag = r.header("etag").to_string();
    let r = request(&dh, "GET", "/hello.txt", &[("if-none-match", &etag)], "").await;
    assert_eq!(r.status, StatusCode::NOT_MODIFIED);

    let r = request(&dh, "HEAD", "/hello.txt", &[], "").await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.header("content-length"), "11");
    assert!(r.body.is_empty());

    let r = request(&dh, "GET", "/nope", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);

    // no parent folder.
    let r = request(&dh, "PUT", "/a/b", &[], "x").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
    let r = request(&dh, "PUT", "/hello.txt/b", &[], "x").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn put_lazy_folders() {
    let fs = MemFs::new();
    let dh = DavHandler::builder(fs.clone())
        .lazy_folder_creation_on_put(true)
        .build();
    let r = request(&dh, "PUT", "/a/c", &[], "x").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(exists(&fs, "/a").await);

    // only the direct parent is created.
    let r = request(&dh, "PUT", "/x/y/z", &[], "x").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn exclusive_lock_conflicts() {
    let (_, dh) = setup();
    put(&dh, "/f", "data").await;

    let r = request(&dh, "LOCK", "/f", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
    assert!(r.body.contains("<D:exclusive"));
    assert!(r.body.contains("alice"));
    let token = r.lock_token();
    assert!(token.starts_with("opaquelocktoken:"));

    // nobody else gets a lock, shared or exclusive.
    let r = request(&dh, "LOCK", "/f", &[], &shared("bob")).await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "LOCK", "/f", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::LOCKED);

    // writes need the token.
    let r = request(&dh, "PUT", "/f", &[], "other").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "DELETE", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let iff = format!("(<{token}>)");
    let r = request(&dh, "PUT", "/f", &[("if", &iff)], "mine").await;
    assert_eq!(r.status, StatusCode::CREATED);

    // reads do not.
    let r = request(&dh, "GET", "/f", &[], "").await;
    assert_eq!(r.body, "mine");
}

#[tokio::test]
async fn lock_on_ancestor_blocks_descendants() {
    let (_, dh) = setup();
    mkcol(&dh, "/d").await;
    put(&dh, "/d/f", "x").await;

    let r = request(&dh, "LOCK", "/d", &[("depth", "infinity")], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
    let r = request(&dh, "LOCK", "/d/f", &[], &shared("bob")).await;
    assert_eq!(r.status, StatusCode::LOCKED);
}

#[tokio::test]
async fn shared_locks_coexist() {
    let (_, dh) = setup();
    put(&dh, "/s", "x").await;

    let a = request(&dh, "LOCK", "/s", &[], &shared("alice")).await;
    assert_eq!(a.status, StatusCode::OK);
    assert!(a.body.contains("<D:shared"));
    let b = request(&dh, "LOCK", "/s", &[], &shared("bob")).await;
    assert_eq!(b.status, StatusCode::OK);
    assert_eq!(a.lock_token(), b.lock_token());
    assert!(b.body.contains("alice") && b.body.contains("bob"));

    // an exclusive lock has to wait for every shared owner.
    let r = request(&dh, "LOCK", "/s", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let lock_token = format!("<{}>", a.lock_token());
    let r = request(&dh, "UNLOCK", "/s", &[("lock-token", &lock_token)], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);

    let txn = crate::fs::Transaction::new(None);
    let locked = dh
        .lock_manager()
        .get_locked_object_by_path(&txn, "/s")
        .map(|lo| lo.is_locked())
        .unwrap_or(false);
    assert!(!locked);

    let r = request(&dh, "LOCK", "/s", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
}

#[tokio::test]
async fn lock_refresh() {
    let (_, dh) = setup();
    put(&dh, "/f", "x").await;
    let r = request(&dh, "LOCK", "/f", &[("timeout", "Second-60")], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
    assert!(r.body.contains("<D:timeout>Second-"));

    let iff = format!("(<{}>)", r.lock_token());
    let again = request(&dh, "LOCK", "/f", &[("if", &iff), ("timeout", "Second-600")], "").await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.lock_token(), r.lock_token());
    let txn = crate::fs::Transaction::new(None);
    let left = dh
        .lock_manager()
        .get_locked_object_by_path(&txn, "/f")
        .and_then(|lo| lo.time_left())
        .unwrap_or_default();
    assert!(left > 500, "{left}s left");

    let iff = "(<opaquelocktoken:nope>)";
    let r = request(&dh, "LOCK", "/f", &[("if", iff)], "").await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn lock_needs_a_proper_body() {
    let (_, dh) = setup();
    let r = request(&dh, "LOCK", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = request(&dh, "LOCK", "/f", &[], "<D:propfind xmlns:D=\"DAV:\"/>").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn lock_null_resource_lifecycle() {
    let (fs, dh) = setup();

    let r = request(&dh, "LOCK", "/n/x", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
    let token = r.lock_token();
    let txn = fs.begin(None).await.unwrap();
    let so = fs.get_stored_object(&txn, "/n/x").await.unwrap().unwrap();
    assert!(so.is_null_resource());
    assert!(fs.get_stored_object(&txn, "/n").await.unwrap().unwrap().is_folder());

    let r = request(&dh, "GET", "/n/x", &[], "").await;
    assert_eq!(r.status, StatusCode::METHOD_NOT_ALLOWED);
    assert!(r.header("allow").contains("UNLOCK"));

    let r = request(&dh, "PROPFIND", "/n/x", &[("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.body.contains("lockdiscovery"));

    let r = request(&dh, "UNLOCK", "/n/x", &[("lock-token", "<opaquelocktoken:nope>")], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = request(&dh, "UNLOCK", "/n/x", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let lock_token = format!("<{token}>");
    let r = request(&dh, "UNLOCK", "/n/x", &[("lock-token", &lock_token)], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(!exists(&fs, "/n/x").await);
    assert!(exists(&fs, "/n").await);
}

#[tokio::test]
async fn put_on_lock_null_needs_the_token() {
    let (fs, dh) = setup();
    let r = request(&dh, "LOCK", "/n", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);
    let token = r.lock_token();

    let r = request(&dh, "PUT", "/n", &[], "x").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);

    let r = request(&dh, "PUT", "/n", &[("if", "(<opaquelocktoken:nope>)")], "x").await;
    assert_eq!(r.status, StatusCode::LOCKED);

    let txn = fs.begin(None).await.unwrap();
    assert!(fs
        .get_stored_object(&txn, "/n")
        .await
        .unwrap()
        .unwrap()
        .is_null_resource());

    let iff = format!("(<{token}>)");
    let r = request(&dh, "PUT", "/n", &[("if", &iff)], "content").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let so = fs.get_stored_object(&txn, "/n").await.unwrap().unwrap();
    assert!(so.is_resource() && !so.is_null_resource());

    // the lock went away with the lock-null state.
    let r = request(&dh, "PUT", "/n", &[], "again").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let r = request(&dh, "GET", "/n", &[], "").await;
    assert_eq!(r.body, "again");
}

#[tokio::test]
async fn mkcol_rules() {
    let (fs, dh) = setup();
    let r = request(&dh, "MKCOL", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let r = request(&dh, "MKCOL", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::METHOD_NOT_ALLOWED);
    let r = request(&dh, "MKCOL", "/x/y", &[], "").await;
    assert_eq!(r.status, StatusCode::CONFLICT);
    let r = request(&dh, "MKCOL", "/d", &[], "<body/>").await;
    assert_eq!(r.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let r = request(&dh, "LOCK", "/ln", &[], EXCLUSIVE).await;
    let iff = format!("(<{}>)", r.lock_token());
    let r = request(&dh, "MKCOL", "/ln", &[("if", &iff)], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    let txn = fs.begin(None).await.unwrap();
    assert!(fs.get_stored_object(&txn, "/ln").await.unwrap().unwrap().is_folder());
}

#[tokio::test]
async fn copy_overwrite() {
    let (_, dh) = setup();
    put(&dh, "/a", "one").await;
    put(&dh, "/b", "two").await;

    let dest = [("destination", "http://localhost/b"), ("overwrite", "F")];
    let r = request(&dh, "COPY", "/a", &dest, "").await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(request(&dh, "GET", "/b", &[], "").await.body, "two");

    let r = request(&dh, "COPY", "/a", &[("destination", "/b")], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert_eq!(request(&dh, "GET", "/b", &[], "").await.body, "one");

    let r = request(&dh, "COPY", "/a", &[("destination", "http://localhost/c")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert_eq!(request(&dh, "GET", "/a", &[], "").await.body, "one");

    let r = request(&dh, "COPY", "/a", &[("destination", "/a")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = request(&dh, "COPY", "/a", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = request(&dh, "COPY", "/zz", &[("destination", "/zy")], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn copy_folder_depth() {
    let (fs, dh) = setup();
    mkcol(&dh, "/src").await;
    put(&dh, "/src/f", "x").await;
    mkcol(&dh, "/src/sub").await;
    put(&dh, "/src/sub/g", "y").await;

    let r = request(&dh, "COPY", "/src", &[("destination", "/all")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(exists(&fs, "/all/sub/g").await);

    let r = request(&dh, "COPY", "/src", &[("destination", "/top"), ("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(exists(&fs, "/top").await);
    assert!(!exists(&fs, "/top/f").await);
}

#[tokio::test]
async fn move_with_failing_child() {
    let (fs, dh) = setup();
    mkcol(&dh, "/a").await;
    put(&dh, "/a/f", "data").await;
    put(&dh, "/a/g", "x").await;
    fs.protect("/b/g");

    let r = request(&dh, "MOVE", "/a", &[("destination", "/b")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert_eq!(request(&dh, "GET", "/b/f", &[], "").await.body, "data");
    assert!(!exists(&fs, "/b/g").await);
    assert!(!exists(&fs, "/a").await);
}

#[tokio::test]
async fn move_reports_every_failure() {
    let (fs, dh) = setup();
    mkcol(&dh, "/a").await;
    put(&dh, "/a/f", "x").await;
    put(&dh, "/a/g", "y").await;
    put(&dh, "/a/h", "z").await;
    fs.protect("/b/f");
    fs.protect("/b/g");

    let r = request(&dh, "MOVE", "/a", &[("destination", "/b")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.body.contains("<D:href>/b/f</D:href>"));
    assert!(r.body.contains("<D:href>/b/g</D:href>"));
    assert!(r.body.contains("403"));
    assert!(exists(&fs, "/b/h").await);
}

#[tokio::test]
async fn move_locked_source() {
    let (fs, dh) = setup();
    put(&dh, "/f", "x").await;
    let r = request(&dh, "LOCK", "/f", &[], EXCLUSIVE).await;
    let iff = format!("(<{}>)", r.lock_token());

    let r = request(&dh, "MOVE", "/f", &[("destination", "/g")], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "MOVE", "/f", &[("destination", "/g"), ("if", &iff)], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(!exists(&fs, "/f").await);
    assert!(exists(&fs, "/g").await);
}

#[tokio::test]
async fn delete_keeps_going() {
    let (fs, dh) = setup();
    mkcol(&dh, "/d").await;
    put(&dh, "/d/a", "1").await;
    put(&dh, "/d/b", "2").await;
    put(&dh, "/d/c", "3").await;
    fs.protect("/d/b");

    let r = request(&dh, "DELETE", "/d", &[], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert!(!exists(&fs, "/d/a").await);
    assert!(exists(&fs, "/d/b").await);
    assert!(!exists(&fs, "/d/c").await);
    assert!(exists(&fs, "/d").await);

    let r = request(&dh, "DELETE", "/nope", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);

    put(&dh, "/f", "x").await;
    let r = request(&dh, "DELETE", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
    assert!(!exists(&fs, "/f").await);
}

#[tokio::test]
async fn propfind_depth() {
    let (_, dh) = setup();
    mkcol(&dh, "/p").await;
    put(&dh, "/p/x", "x").await;
    mkcol(&dh, "/p/sub").await;
    put(&dh, "/p/sub/y", "y").await;

    let count = |r: &Reply| r.body.matches("<D:response>").count();

    let r = request(&dh, "PROPFIND", "/p", &[("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert_eq!(count(&r), 1);
    assert!(r.body.contains("<D:href>/p/</D:href>"));
    assert!(r.body.contains("<D:collection"));

    let r = request(&dh, "PROPFIND", "/p", &[("depth", "1")], "").await;
    assert_eq!(count(&r), 3);

    let r = request(&dh, "PROPFIND", "/p", &[("depth", "infinity")], "").await;
    assert_eq!(count(&r), 4);
    assert!(r.body.contains("<D:href>/p/sub/y</D:href>"));

    let r = request(&dh, "PROPFIND", "/p", &[], "").await;
    assert_eq!(count(&r), 4);

    let r = request(&dh, "PROPFIND", "/missing", &[("depth", "0")], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn propfind_named_props() {
    let (_, dh) = setup();
    put(&dh, "/f", "abc").await;
    let body = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:" xmlns:Z="urn:zz">
  <D:prop><D:getcontentlength/><Z:color/></D:prop>
</D:propfind>"#;
    let r = request(&dh, "PROPFIND", "/f", &[("depth", "0")], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.body.contains("<D:getcontentlength>3</D:getcontentlength>"));
    assert!(r.body.contains("color"));
    assert!(r.body.contains("404 Not Found"));

    let r = request(&dh, "PROPFIND", "/f", &[("depth", "0")], "<nope").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn proppatch() {
    let (_, dh) = setup();
    put(&dh, "/f", "x").await;
    let body = r#"<D:propertyupdate xmlns:D="DAV:" xmlns:Z="urn:zz">
  <D:set><D:prop><Z:color>red</Z:color></D:prop></D:set>
  <D:remove><D:prop><Z:size/></D:prop></D:remove>
</D:propertyupdate>"#;
    let r = request(&dh, "PROPPATCH", "/f", &[], body).await;
    assert_eq!(r.status, StatusCode::MULTI_STATUS);
    assert!(r.body.contains("200 OK"));
    assert!(r.body.contains("color") && r.body.contains("size"));

    let r = request(&dh, "PROPPATCH", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    let r = request(&dh, "PROPPATCH", "/missing", &[], body).await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn prefix_is_stripped() {
    let fs = MemFs::new();
    let dh = DavHandler::builder(fs.clone()).strip_prefix("/dav").build();
    let r = request(&dh, "PUT", "/dav/f", &[], "x").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(exists(&fs, "/f").await);

    let r = request(&dh, "PROPFIND", "/dav/f", &[("depth", "0")], "").await;
    assert!(r.body.contains("<D:href>/dav/f</D:href>"));

    let r = request(&dh, "GET", "/other/f", &[], "").await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aliased_paths_hit_the_same_lock() {
    let (_, dh) = setup();
    put(&dh, "/f", "data").await;
    let r = request(&dh, "LOCK", "/f", &[], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);

    let r = request(&dh, "PUT", "//f", &[], "other").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "DELETE", "/./f", &[], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "PUT", "/x/../f", &[], "other").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert_eq!(request(&dh, "GET", "/f", &[], "").await.body, "data");

    let r = request(&dh, "GET", "/f/", &[], "").await;
    assert_eq!(r.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn busy_path_is_locked() {
    let (fs, dh) = setup();
    put(&dh, "/f", "data").await;

    // another request holds a temporary lock on the whole tree.
    let txn = crate::fs::Transaction::new(None);
    let locks = dh.lock_manager();
    assert!(locks.lock(&txn, "/", "other", false, Depth::Infinity, 10, true));

    let r = request(&dh, "PUT", "/f", &[], "new").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    let r = request(&dh, "DELETE", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert!(exists(&fs, "/f").await);

    locks.unlock_temporary_locked_objects(&txn, "/", "other");
    let r = request(&dh, "DELETE", "/f", &[], "").await;
    assert_eq!(r.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn copy_into_own_subtree() {
    let (fs, dh) = setup();
    mkcol(&dh, "/a").await;
    put(&dh, "/a/f", "x").await;

    let r = request(&dh, "COPY", "/a", &[("destination", "/a/sub")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = request(&dh, "MOVE", "/a", &[("destination", "/a/sub")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    let r = request(&dh, "MOVE", "/a", &[("destination", "/a/")], "").await;
    assert_eq!(r.status, StatusCode::FORBIDDEN);
    assert!(!exists(&fs, "/a/sub").await);
    assert!(exists(&fs, "/a/f").await);

    // a sibling sharing the name prefix is fine.
    let r = request(&dh, "COPY", "/a", &[("destination", "/ab")], "").await;
    assert_eq!(r.status, StatusCode::CREATED);
    assert!(exists(&fs, "/ab/f").await);
}

#[tokio::test]
async fn refused_lock_creates_nothing() {
    let (fs, dh) = setup();
    mkcol(&dh, "/d").await;
    let r = request(&dh, "LOCK", "/d", &[("depth", "infinity")], EXCLUSIVE).await;
    assert_eq!(r.status, StatusCode::OK);

    let r = request(&dh, "LOCK", "/d/n/m", &[], &shared("bob")).await;
    assert_eq!(r.status, StatusCode::LOCKED);
    assert!(!exists(&fs, "/d/n/m").await);
    assert!(!exists(&fs, "/d/n").await);
}

#[tokio::test]
async fn refresh_needs_a_token_for_this_path() {
    let (_, dh) = setup();
    put(&dh, "/f", "x").await;
    put(&dh, "/g", "y").await;
    let f = request(&dh, "LOCK", "/f", &[], EXCLUSIVE).await;
    assert_eq!(f.status, StatusCode::OK);
    let g = request(&dh, "LOCK", "/g", &[], &shared("bob")).await;
    assert_eq!(g.status, StatusCode::OK);

    let iff = format!("(<{}>)", f.lock_token());
    let r = request(&dh, "LOCK", "/g", &[("if", &iff)], "").await;
    assert_eq!(r.status, StatusCode::PRECONDITION_FAILED);
    let r = request(&dh, "LOCK", "/f", &[("if", &iff)], "").await;
    assert_eq!(r.status, StatusCode::OK);
}
