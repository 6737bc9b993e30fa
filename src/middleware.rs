/* src/middleware.rs */

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request},
    http::{HeaderMap, HeaderName, HeaderValue, request::Parts},
    response::Response,
};
use futures_util::future::BoxFuture;
use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::{debug, info, warn};

use crate::lookup::{DEFAULT_DB_PATH, GeoResult, Lookup, UNKNOWN, open_lookup};

/// Country header name.
pub const COUNTRY_HEADER: HeaderName = HeaderName::from_static("x-geoip2-country");
/// Region header name.
pub const REGION_HEADER: HeaderName = HeaderName::from_static("x-geoip2-region");
/// City header name.
pub const CITY_HEADER: HeaderName = HeaderName::from_static("x-geoip2-city");
/// Latitude header name.
pub const LATITUDE_HEADER: HeaderName = HeaderName::from_static("x-geoip2-latitude");
/// Longitude header name.
pub const LONGITUDE_HEADER: HeaderName = HeaderName::from_static("x-geoip2-longitude");

/// Per-mount middleware configuration.
#[derive(Debug, Clone)]
pub struct GeoIpConfig {
    /// Path to the GeoIP2/GeoLite2 database file.
    pub db_path: String,
    /// Request header carrying the client's real IP, for deployments behind a
    /// trusted forwarding proxy. `None` means "always use the peer address".
    pub ip_header: Option<String>,
}

impl Default for GeoIpConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            ip_header: None,
        }
    }
}

/// Extension that holds the resolved geolocation result.
#[derive(Debug, Clone)]
pub struct GeoIp(pub GeoResult);

impl GeoIp {
    /// Get the resolved result.
    pub fn result(&self) -> &GeoResult {
        &self.0
    }
}

/// Layer that resolves the client IP against a local GeoIP2 database and
/// stamps the result into request headers.
///
/// Every request gets all five `X-GeoIP2-*` headers, each either a resolved
/// value or the sentinel `XX`. Client-supplied values of those headers are
/// always overwritten. No failure mode of this layer ever fails the request:
/// a missing or unreadable database, an unparseable client address, and an
/// address absent from the database all degrade to sentinel headers and a
/// log line.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use geostamp::{GeoIpConfig, GeoIpLayer};
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "hello" }))
///     .layer(GeoIpLayer::new(GeoIpConfig {
///         db_path: "GeoLite2-City.mmdb".to_string(),
///         ip_header: Some("X-Real-IP".to_string()),
///     }));
/// ```
#[derive(Clone)]
pub struct GeoIpLayer {
    lookup: Option<Arc<dyn Lookup>>,
    ip_header: Option<HeaderName>,
}

impl GeoIpLayer {
    /// Create a layer from configuration, opening the database once.
    ///
    /// A database that is missing, unreadable, or of an unrecognized schema
    /// is logged and the layer serves in no-adapter mode, stamping sentinel
    /// headers on every request.
    pub fn new(config: GeoIpConfig) -> Self {
        let lookup = match open_lookup(&config.db_path) {
            Ok(Some(lookup)) => {
                info!(db = %config.db_path, "geolocation database initialized");
                Some(lookup)
            }
            Ok(None) => {
                warn!(
                    db = %config.db_path,
                    "unrecognized database schema, serving without geolocation"
                );
                None
            }
            Err(err) => {
                warn!(
                    db = %config.db_path,
                    error = %err,
                    "unable to open geolocation database, serving without geolocation"
                );
                None
            }
        };

        Self {
            lookup,
            ip_header: parse_header_name(config.ip_header.as_deref()),
        }
    }

    /// Create a layer around an already constructed lookup.
    ///
    /// Useful for embedded databases and for substituting fakes in tests.
    pub fn with_lookup(lookup: Arc<dyn Lookup>) -> Self {
        Self {
            lookup: Some(lookup),
            ip_header: None,
        }
    }

    /// Set the request header consulted for the client IP before falling
    /// back to the peer address.
    pub fn ip_header(mut self, name: impl AsRef<str>) -> Self {
        self.ip_header = parse_header_name(Some(name.as_ref()));
        self
    }
}

impl Default for GeoIpLayer {
    fn default() -> Self {
        Self::new(GeoIpConfig::default())
    }
}

impl<S> Layer<S> for GeoIpLayer {
    type Service = GeoIpService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GeoIpService {
            inner,
            lookup: self.lookup.clone(),
            ip_header: self.ip_header.clone(),
        }
    }
}

/// Service that stamps geolocation headers.
#[derive(Clone)]
pub struct GeoIpService<S> {
    inner: S,
    lookup: Option<Arc<dyn Lookup>>,
    ip_header: Option<HeaderName>,
}

impl<S> GeoIpService<S> {
    /// Resolve the request's client address to a [`GeoResult`], absorbing
    /// every failure into the all-sentinel value.
    fn resolve(&self, req: &Request) -> GeoResult {
        let Some(lookup) = &self.lookup else {
            return GeoResult::unknown();
        };

        let Some(candidate) = self.client_address(req) else {
            debug!("no client address available");
            return GeoResult::unknown();
        };

        let Some(ip) = parse_client_ip(&candidate) else {
            debug!(addr = %candidate, "client address does not parse");
            return GeoResult::unknown();
        };

        match lookup.lookup(ip) {
            Ok(result) => result,
            Err(err) if err.is_not_found() => {
                debug!(ip = %ip, "address not present in database");
                GeoResult::unknown()
            }
            Err(err) => {
                warn!(ip = %ip, error = %err, "geolocation lookup failed");
                GeoResult::unknown()
            }
        }
    }

    /// The candidate client address string: the configured header when
    /// present and non-empty, the peer address otherwise.
    fn client_address(&self, req: &Request) -> Option<String> {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|connect_info| connect_info.0.to_string());

        if let Some(name) = &self.ip_header {
            match req.headers().get(name).and_then(|value| value.to_str().ok()) {
                Some(value) if !value.is_empty() => return Some(value.to_string()),
                _ => debug!(
                    header = %name,
                    peer = ?peer,
                    "client address header missing or empty, falling back to peer address"
                ),
            }
        }

        peer
    }
}

impl<S> Service<Request> for GeoIpService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let result = self.resolve(&req);

        write_headers(req.headers_mut(), &result);
        req.extensions_mut().insert(GeoIp(result));

        let future = self.inner.call(req);
        Box::pin(async move { future.await })
    }
}

/// Set all five geolocation headers, replacing any client-supplied values.
fn write_headers(headers: &mut HeaderMap, result: &GeoResult) {
    headers.insert(COUNTRY_HEADER, header_value(&result.country));
    headers.insert(REGION_HEADER, header_value(&result.region));
    headers.insert(CITY_HEADER, header_value(&result.city));
    headers.insert(LATITUDE_HEADER, header_value(&result.latitude));
    headers.insert(LONGITUDE_HEADER, header_value(&result.longitude));
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(UNKNOWN))
}

/// Parse a candidate client address, accepting both bare hosts and
/// `host:port` forms (including bracketed IPv6).
///
/// Splitting is its own step: the port is stripped syntactically before the
/// host is parsed, so a `host:port` candidate resolves even when the port
/// part is empty or out of range. A candidate with nothing to strip, or
/// whose stripped host does not parse, is parsed as-is.
fn parse_client_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim();
    if let Some(host) = split_port(raw) {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
    }
    raw.parse::<IpAddr>().ok()
}

/// Strip a trailing `:port` from `host:port` or `[host]:port`, returning the
/// host part. `None` means there is no port to strip; the port itself is
/// discarded unvalidated. A bare IPv6 address (more than one colon, no
/// brackets) is not split.
fn split_port(raw: &str) -> Option<&str> {
    if let Some(rest) = raw.strip_prefix('[') {
        rest.split_once(']').map(|(host, _)| host)
    } else if raw.matches(':').count() == 1 {
        raw.rsplit_once(':').map(|(host, _)| host)
    } else {
        None
    }
}

fn parse_header_name(name: Option<&str>) -> Option<HeaderName> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            warn!(header = %name, "invalid client address header name, using peer address");
            None
        }
    }
}

/// Axum extractor for the resolved geolocation.
///
/// Yields the all-sentinel result when the layer is not mounted, so handlers
/// observe the same degradation behavior as header consumers.
///
/// # Examples
///
/// ```rust,no_run
/// use axum::{Router, routing::get};
/// use geostamp::{GeoIp, GeoIpLayer};
///
/// async fn handler(geo: GeoIp) -> String {
///     format!("{} / {}", geo.result().country, geo.result().city)
/// }
///
/// let app: Router = Router::new()
///     .route("/", get(handler))
///     .layer(GeoIpLayer::default());
/// ```
impl<S> FromRequestParts<S> for GeoIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<GeoIp>()
            .cloned()
            .unwrap_or_else(|| GeoIp(GeoResult::unknown())))
    }
}
