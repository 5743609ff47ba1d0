//! Minimal HTTP/1.1 front end: an index form and `/imagedetails`.

mod html;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::pipeline::Pipeline;

const MAX_REQUEST_BYTES: usize = 64 * 1024;

struct Request {
    method: String,
    path: String,
    query: String,
    body: String,
}

struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn html(body: String) -> Self {
        Self {
            status: 200,
            content_type: "text/html; charset=utf-8",
            body,
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

pub async fn serve(addr: SocketAddr, config: AppConfig) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("server started at http://{}", listener.local_addr()?);
    serve_listener(listener, Arc::new(config)).await
}

/// Accept connections forever; each one is handled on its own task.
pub async fn serve_listener(listener: TcpListener, config: Arc<AppConfig>) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_stream(stream, &config).await {
                warn!(%peer, error = %e, "connection error");
            }
        });
    }
}

async fn handle_stream(mut stream: TcpStream, config: &AppConfig) -> std::io::Result<()> {
    let response = match read_request(&mut stream).await? {
        Some(Ok(req)) => {
            info!(method = %req.method, path = %req.path, "request");
            route_request(&req, config).await
        }
        Some(Err(response)) => response,
        None => return Ok(()),
    };

    if response.status >= 500 {
        error!(status = response.status, body = %response.body, "request failed");
    } else if response.status >= 400 {
        warn!(status = response.status, body = %response.body, "request rejected");
    }

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        reason(response.status),
        response.content_type,
        response.body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(response.body.as_bytes()).await?;
    stream.shutdown().await
}

/// Read one request. `None` when the peer closed without sending anything.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<Option<Result<Request, Response>>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8 * 1024];

    let header_end = loop {
        if let Some(idx) = find(&buf, b"\r\n\r\n") {
            break idx;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Ok(Some(Err(Response::text(413, "request too large"))));
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Err(Response::text(400, "incomplete request"))));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut parts = lines.next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default();
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_REQUEST_BYTES {
        return Ok(Some(Err(Response::text(413, "request too large"))));
    }

    let mut body = buf.split_off(header_end + 4);
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(Some(Ok(Request {
        method,
        path: path.to_string(),
        query: query.to_string(),
        body: String::from_utf8_lossy(&body).into_owned(),
    })))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

async fn route_request(req: &Request, config: &AppConfig) -> Response {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/" | "/home") => Response::html(html::index()),
        ("GET" | "POST", "/imagedetails") => image_details(req, config).await,
        (_, "/" | "/home" | "/imagedetails") => Response::text(405, "method not allowed"),
        _ => Response::text(404, "route not found"),
    }
}

async fn image_details(req: &Request, config: &AppConfig) -> Response {
    let repo_url = form_value(&req.body, "repo_url").or_else(|| form_value(&req.query, "repo_url"));
    let Some(repo_url) = repo_url.filter(|u| !u.trim().is_empty()) else {
        return Response::text(400, "missing form field 'repo_url'");
    };

    match Pipeline::new(config).run(repo_url.trim()).await {
        Ok(info) => Response::html(html::image_details(&info)),
        Err(e) => Response::text(e.status(), e.to_string()),
    }
}

/// Look up `key` in an `application/x-www-form-urlencoded` string.
fn form_value(encoded: &str, key: &str) -> Option<String> {
    encoded
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| {
            urlencoding::decode(&v.replace('+', " "))
                .ok()
                .map(|decoded| decoded.into_owned())
        })
}
