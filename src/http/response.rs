//! Response generation.
//!
//! # Responsibilities
//! - Decide the status for a request (429 → 405 → 404 → 200)
//! - Build the fixed header block and the body
//! - Serve from, and populate, the shared response cache
//!
//! # Design Decisions
//! - Status and target kind are decided once ([`Decision`]) and a single
//!   match picks the body
//! - Cached responses are returned verbatim, headers included
//! - The login and media listing pages depend on the request or on uploads
//!   and are never cached, by the server or by browsers

use std::path::Path;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::ListenerConfig;
use crate::http::request::{Payload, Request, LOGIN_ENDPOINT, MEDIA_ENDPOINT};
use crate::observability::metrics;
use crate::resolver::{Content, Resolver, ResolverError};

/// Placeholder substituted in templates.
const PLACEHOLDER: &str = "{}";

/// Statuses this server produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    TooManyRequests,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::TooManyRequests => 429,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::TooManyRequests => "Too Many Requests",
        }
    }

    /// Fixed HTML body for error statuses.
    fn fragment(self) -> &'static str {
        match self {
            Status::Ok => "",
            Status::BadRequest => "<h1>400</h1><p>Bad request</p>\n",
            Status::NotFound => "<h1>404</h1><p>Not found</p>\n",
            Status::MethodNotAllowed => "<h1>405</h1><p>Method not allowed</p>\n",
            Status::TooManyRequests => "<h1>429</h1><p>Too many requests</p>\n",
        }
    }

    fn cacheable(self) -> bool {
        matches!(
            self,
            Status::Ok | Status::NotFound | Status::MethodNotAllowed
        )
    }
}

/// What a request targets, as far as body construction cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetKind {
    Login,
    MediaListing,
    Page,
}

impl TargetKind {
    fn of(request: &Request) -> Self {
        match request.resource.as_str() {
            LOGIN_ENDPOINT => TargetKind::Login,
            MEDIA_ENDPOINT => TargetKind::MediaListing,
            _ => TargetKind::Page,
        }
    }

    /// Content depends on the request or on server state.
    fn personalized(self) -> bool {
        !matches!(self, TargetKind::Page)
    }
}

#[derive(Debug, Clone, Copy)]
struct Decision {
    status: Status,
    kind: TargetKind,
}

/// A complete wire-format response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub bytes: Vec<u8>,
    pub status: u16,
}

/// Builds responses for parsed requests.
pub struct ResponseGenerator {
    resolver: Arc<dyn Resolver>,
    cache: Option<Arc<ResponseCache>>,
    browser_caching: bool,
    keep_alive: bool,
    keep_alive_timeout: u64,
    max_requests: usize,
}

impl ResponseGenerator {
    pub fn new(
        config: &ListenerConfig,
        resolver: Arc<dyn Resolver>,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        Self {
            resolver,
            cache,
            browser_caching: config.browser_caching,
            keep_alive: config.keep_alive,
            keep_alive_timeout: config.keep_alive_timeout,
            max_requests: config.keep_alive_max_requests,
        }
    }

    /// Produce the response for `request`.
    pub fn generate(&self, request: &Request) -> Result<Response, ResolverError> {
        let kind = TargetKind::of(request);
        let path = request.path();

        if request.rate_limited {
            let decision = Decision {
                status: Status::TooManyRequests,
                kind,
            };
            return self.render(decision, request);
        }

        if let Some(cache) = &self.cache {
            if let Some((bytes, status)) = cache.get(path) {
                metrics::record_cache_hit();
                tracing::trace!(path = %path, status, "Served from cache");
                return Ok(Response { bytes, status });
            }
        }

        let decision = self.decide(request, kind);
        let response = self.render(decision, request)?;

        if let Some(cache) = &self.cache {
            if decision.status.cacheable() && !kind.personalized() {
                cache.put(path, response.bytes.clone(), response.status);
            }
        }
        Ok(response)
    }

    /// `400 Bad Request` for a request whose body could not be decoded.
    pub fn bad_request(&self, request: &Request) -> Response {
        let decision = Decision {
            status: Status::BadRequest,
            kind: TargetKind::of(request),
        };
        let body = Status::BadRequest.fragment().as_bytes().to_vec();
        self.assemble(decision, request, body)
    }

    fn decide(&self, request: &Request, kind: TargetKind) -> Decision {
        let status = if request.method != "GET" && request.method != "POST" {
            Status::MethodNotAllowed
        } else if !self.resolver.contains(request.path()) {
            Status::NotFound
        } else {
            Status::Ok
        };
        Decision { status, kind }
    }

    fn render(&self, decision: Decision, request: &Request) -> Result<Response, ResolverError> {
        let body = match (decision.status, decision.kind) {
            (Status::Ok, TargetKind::Login) => {
                let page = self.resolver.content(request.path())?;
                match (&request.body, request.is_post()) {
                    (Payload::Login(user), true) => substitute(page, user),
                    _ => page.into_bytes(),
                }
            }
            (Status::Ok, TargetKind::MediaListing) => {
                let page = self.resolver.content(request.path())?;
                substitute(page, &self.media_list())
            }
            (Status::Ok, TargetKind::Page) => self.resolver.content(request.path())?.into_bytes(),
            (status, _) => status.fragment().as_bytes().to_vec(),
        };
        Ok(self.assemble(decision, request, body))
    }

    fn media_list(&self) -> String {
        self.resolver
            .media_links()
            .iter()
            .map(|url| {
                let name = url.rsplit('/').next().unwrap_or(url);
                format!("<a href=\"{}\">{}</a><br>", url, name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn assemble(&self, decision: Decision, request: &Request, body: Vec<u8>) -> Response {
        let status = decision.status;
        let mut head = format!("HTTP/1.1 {} {}\r\n", status.code(), status.reason());

        let content_type = if status == Status::Ok {
            content_type(request.path())
        } else {
            "text/html"
        };
        head.push_str(&format!("Content-Type: {}\r\n", content_type));

        let cache_control = if !self.browser_caching || decision.kind.personalized() {
            "no-store"
        } else {
            "public, max-age=86400"
        };
        head.push_str(&format!("Cache-Control: {}\r\n", cache_control));

        if !self.keep_alive || request.wants_close() || request.is_post() {
            head.push_str("Connection: close\r\n");
        } else {
            let remaining = self.max_requests.saturating_sub(request.sequence);
            head.push_str("Connection: keep-alive\r\n");
            head.push_str(&format!(
                "Keep-Alive: timeout={}, max={}\r\n",
                self.keep_alive_timeout, remaining
            ));
        }

        head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&body);
        Response {
            bytes,
            status: status.code(),
        }
    }
}

/// MIME type from the extension of `path`.
fn content_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        None => "text/html",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some(_) => "application/octet-stream",
    }
}

fn substitute(page: Content, value: &str) -> Vec<u8> {
    match page {
        Content::Text(text) => text.replacen(PLACEHOLDER, value, 1).into_bytes(),
        Content::Binary(bytes) => bytes,
    }
}
