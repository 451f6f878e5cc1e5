use headers::HeaderMapExt;
use htmlescape::encode_minimal;
use http::{header, HeaderValue, Request, Response, StatusCode};

use crate::body::Body;
use crate::davhandler::empty_response;
use crate::davhandler::handle_options::not_allowed;
use crate::davheaders::Depth;
use crate::davpath::{encode_path, join};
use crate::errors::DavError;
use crate::fs::*;
use crate::util::{content_type, etag, systemtime_to_httpdate};
use crate::DavResult;

const LISTING_CSS: &str = "\
body { font-family: Arial, Helvetica, sans-serif; }\n\
h1 { font-size: 1.5em; }\n\
th { background-color: #9DACBF; }\n\
table { border-top-style: solid; border-right-style: solid; border-bottom-style: solid; \
border-left-style: solid; }\n\
td { margin: 0px; padding-top: 2px; padding-right: 5px; padding-bottom: 2px; padding-left: 5px; }\n\
tr.even { background-color: #CCCCCC; }\n\
tr.odd { background-color: #FFFFFF; }\n";

impl crate::DavHandler {
    pub(crate) async fn handle_get(
        &self,
        txn: &Transaction,
        req: &Request<()>,
        path: &str,
    ) -> DavResult<Response<Body>> {
        let head = req.method() == http::Method::HEAD;

        let mut path = path.to_string();
        let mut so = self.store.get_stored_object(txn, &path).await?;
        let exists = so.is_some();
        if so.is_none() {
            if let Some(fallback) = self.instead_of_404.as_deref().filter(|p| !p.trim().is_empty()) {
                path = fallback.to_string();
                so = self.store.get_stored_object(txn, &path).await?;
            }
        }

        let so = match so {
            Some(so) => so,
            None => return Err(StatusCode::NOT_FOUND.into()),
        };
        if so.is_null_resource() {
            return Ok(not_allowed(Some(&so)));
        }
        if so.is_folder() {
            if let Some(index) = self.default_index_file.as_deref().filter(|f| !f.trim().is_empty()) {
                let location = format!("{}{}", req.uri().path(), index);
                let mut resp = empty_response(StatusCode::FOUND);
                resp.headers_mut().insert(
                    header::LOCATION,
                    HeaderValue::from_str(&location).map_err(|_| DavError::InvalidPath)?,
                );
                return Ok(resp);
            }
        }

        let _guard = self.temp_lock(txn, req, &path, false, Depth::Zero)?;

        let etag = etag(&so);
        if let Some(inm) = req.headers().get(header::IF_NONE_MATCH) {
            if inm.as_bytes() == etag.as_bytes() {
                return Ok(empty_response(StatusCode::NOT_MODIFIED));
            }
        }

        let status = if exists {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };

        if so.is_folder() {
            return self.folder_body(txn, &path, status, head).await;
        }

        // a resource addressed as a collection.
        let uri_path = req.uri().path();
        if exists && (uri_path.ends_with('/') || uri_path.ends_with('\\')) {
            return Err(StatusCode::NOT_FOUND.into());
        }

        let mut resp = empty_response(status);
        let h = resp.headers_mut();
        if let Some(modified) = so.last_modified {
            h.typed_insert(headers::LastModified::from(modified));
        }
        if let Ok(v) = HeaderValue::from_str(&etag) {
            h.insert(header::ETAG, v);
        }
        if self.content_length_header && so.resource_length > 0 {
            h.typed_insert(headers::ContentLength(so.resource_length));
        }
        if let Some(ct) = content_type(&so, &path) {
            if let Ok(v) = HeaderValue::from_str(&ct) {
                h.insert(header::CONTENT_TYPE, v);
            }
        }

        if !head {
            let content = self.store.get_resource_content(txn, &path).await?;
            *resp.body_mut() = Body::content(content);
        }
        Ok(resp)
    }

    // HTML listing of a folder. HEAD gets the headers only.
    async fn folder_body(
        &self,
        txn: &Transaction,
        path: &str,
        status: StatusCode,
        head: bool,
    ) -> DavResult<Response<Body>> {
        let mut resp = empty_response(status);
        resp.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        if head {
            return Ok(resp);
        }

        let mut children = self
            .store
            .get_children_names(txn, path)
            .await?
            .unwrap_or_default();
        children.sort();

        let mut w = String::new();
        w.push_str("<html><head><title>Content of folder ");
        w.push_str(&encode_minimal(path));
        w.push_str("</title><style type=\"text/css\">\n");
        w.push_str(LISTING_CSS);
        w.push_str("</style></head><body>\n");
        w.push_str(&format!("<h1>Content of folder {}</h1>\n", encode_minimal(path)));
        w.push_str("<table>\n");
        w.push_str("<tr><th>Name</th><th>Size</th><th>Created</th><th>Modified</th></tr>\n");
        w.push_str("<tr><td colspan=\"4\"><a href=\"../\">Parent</a></td></tr>\n");

        let prefix = self.prefix.trim_end_matches('/');
        for (idx, name) in children.iter().enumerate() {
            let child = join(path, name);
            let obj = match self.store.get_stored_object(txn, &child).await {
                Ok(obj) => obj,
                Err(e) => {
                    debug!("listing {child}: {e}");
                    None
                }
            };
            let is_folder = obj.as_ref().map(|o| o.is_folder()).unwrap_or(false);
            let class = if idx % 2 == 0 { "even" } else { "odd" };
            let mut href = encode_path(&format!("{prefix}{child}"));
            if is_folder {
                href.push('/');
            }
            w.push_str(&format!(
                "<tr class=\"{class}\"><td><a href=\"{}\">{}</a></td>",
                encode_minimal(&href),
                encode_minimal(name)
            ));
            match &obj {
                Some(o) if o.is_folder() => w.push_str("<td>Folder</td>"),
                Some(o) => w.push_str(&format!("<td>{} Bytes</td>", o.resource_length)),
                None => w.push_str("<td>Unknown Bytes</td>"),
            }
            for t in [
                obj.as_ref().and_then(|o| o.creation_date),
                obj.as_ref().and_then(|o| o.last_modified),
            ] {
                match t {
                    Some(t) => w.push_str(&format!("<td>{}</td>", systemtime_to_httpdate(t))),
                    None => w.push_str("<td></td>"),
                }
            }
            w.push_str("</tr>\n");
        }
        w.push_str("</table>\n</body></html>\n");

        *resp.body_mut() = Body::from(w);
        Ok(resp)
    }
}
