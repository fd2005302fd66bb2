//! The HTTP side of the function: a greeting endpoint and a health endpoint.
use crate::app;
use crate::logging::Logging;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use slog::*;
use std::convert::Infallible;
use std::sync::Arc;
use std::{net::SocketAddr, result::Result};

const PATH_HOME: &str = "/";
const PATH_HEALTH: &str = "/health";

// starts the HTTP server and serves until `shutdown` fires.
pub async fn start(
    log: &Logger,
    logging: Arc<Logging>,
    bind_addr: &str,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<(), String> {
    let http_addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("unable to parse HTTP address {}: {}", bind_addr, e))?;

    let make_svc = make_service_fn(move |_conn| {
        let logging = logging.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = HttpHandler {
                    logging: logging.clone(),
                };
                async move { handler.router(req).await }
            }))
        }
    });

    let http_server = Server::try_bind(&http_addr)
        .map_err(|e| format!("unable to bind HTTP address {}: {}", bind_addr, e))?
        .serve(make_svc);

    info!(log, "Starting HTTP service."; "address" => &http_addr);
    info!(log, "Exposing {} function.", app::NAME; "path" => PATH_HOME);
    info!(log, "Exposing liveness endpoint."; "path" => PATH_HEALTH);

    let graceful = http_server.with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    });
    graceful
        .await
        .map_err(|e| format!("HTTP server error: {}", e))?;

    info!(log, "HTTP shutdown OK");
    Ok(())
}

struct HttpHandler {
    logging: Arc<Logging>,
}

impl HttpHandler {
    async fn router(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let (log, hook) = self.logging.request_logger(&req);

        let response = match (req.method(), req.uri().path()) {
            (&Method::GET, PATH_HOME) => {
                let name = greeting_name(req.uri().query());
                info!(log, "Greeting {}", name; "path" => PATH_HOME);
                Response::new(Body::from(format!("Hello, {}!\n", name)))
            }
            (&Method::GET, PATH_HEALTH) => {
                debug!(log, "Health probe");
                Response::new(Body::from("OK"))
            }
            (method, path) => {
                warn!(log, "No handler for request"; "method" => method.as_str(), "path" => path);
                not_found()
            }
        };

        // The function instance may be frozen as soon as the response is out.
        if let Some(hook) = hook {
            if let Err(e) = tokio::task::spawn_blocking(move || hook.flush()).await {
                error!(self.logging.root, "Could not flush the request logs: {}", e);
            }
        }

        Ok(response)
    }
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn greeting_name(query: Option<&str>) -> String {
    query
        .and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == "name")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "World".to_string())
}

#[cfg(test)]
mod tests {
    use super::greeting_name;
    use pretty_assertions::assert_eq;

    #[test]
    fn greets_the_world_by_default() {
        assert_eq!(greeting_name(None), "World");
        assert_eq!(greeting_name(Some("name=")), "World");
        assert_eq!(greeting_name(Some("other=x")), "World");
    }

    #[test]
    fn greets_by_decoded_name() {
        assert_eq!(greeting_name(Some("name=Ada%20Lovelace")), "Ada Lovelace");
        assert_eq!(greeting_name(Some("lang=en&name=Grace")), "Grace");
    }
}
