//
//  Sample application.
//
//  Listens on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//

use std::convert::Infallible;
use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use clap::Parser;
use futures_util::future::TryFutureExt;
use headers::{authorization::Basic, Authorization, HeaderMapExt};

use dav_lockserver::{body::Body, DavHandler, DavStore, LocalFs, MemFs};

#[derive(Clone)]
struct Server {
    dh: DavHandler,
    auth: bool,
}

impl Server {
    pub fn new(directory: Option<&str>, read_only: bool, auth: bool) -> Self {
        let store: Arc<dyn DavStore> = match directory {
            Some(dir) => LocalFs::new(dir, true),
            None => MemFs::new(),
        };
        let dh = DavHandler::builder(store)
            .read_only(read_only)
            .lazy_folder_creation_on_put(true)
            .build();
        Server { dh, auth }
    }

    async fn handle(
        &self,
        req: hyper::Request<hyper::Body>,
    ) -> Result<hyper::Response<Body>, Infallible> {
        if !self.auth {
            return Ok(self.dh.handle(req).await);
        }

        // we want the client to authenticate.
        match req.headers().typed_get::<Authorization<Basic>>() {
            Some(Authorization(basic)) => {
                let user = basic.username().to_string();
                Ok(self.dh.handle_with(req, None, Some(user)).await)
            }
            None => {
                let mut response = hyper::Response::new(Body::from("please auth"));
                *response.status_mut() = hyper::StatusCode::UNAUTHORIZED;
                response.headers_mut().insert(
                    "WWW-Authenticate",
                    hyper::header::HeaderValue::from_static("Basic realm=\"dav-lockserver\""),
                );
                Ok(response)
            }
        }
    }
}

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// port to listen on
    #[arg(short, long, default_value = "4918")]
    port: u16,
    /// local directory to serve, the in-memory store if not given
    #[arg(short, long)]
    dir: Option<String>,
    /// refuse every request that would change something
    #[arg(short, long)]
    read_only: bool,
    /// require basic authentication
    #[arg(short, long)]
    auth: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let Cli {
        port,
        dir,
        read_only,
        auth,
    } = Cli::parse();
    serve(dir, read_only, auth, port).await
}

async fn serve(
    dir: Option<String>,
    read_only: bool,
    auth: bool,
    port: u16,
) -> Result<(), Box<dyn Error>> {
    let name = dir.clone().unwrap_or_else(|| "memory store".to_string());

    let dav_server = Server::new(dir.as_deref(), read_only, auth);
    let make_service = hyper::service::make_service_fn(|_| {
        let dav_server = dav_server.clone();
        async move {
            let func = move |req| {
                let dav_server = dav_server.clone();
                async move { dav_server.handle(req).await }
            };
            Ok::<_, hyper::Error>(hyper::service::service_fn(func))
        }
    });

    let addr = SocketAddr::from_str(&format!("0.0.0.0:{port}"))?;
    let server = hyper::Server::try_bind(&addr)?
        .serve(make_service)
        .map_err(|e| eprintln!("server error: {}", e));

    println!("Serving {} on {}", name, port);
    let _ = server.await;
    Ok(())
}
