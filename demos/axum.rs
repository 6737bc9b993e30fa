/* demos/axum.rs */

use axum::{Router, http::HeaderMap, routing::get};
use geostamp::{GeoIp, GeoIpConfig, GeoIpLayer};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GeoIpConfig {
        db_path: std::env::var("GEOIP_DB").unwrap_or_else(|_| "GeoLite2-City.mmdb".to_string()),
        ip_header: Some("X-Real-IP".to_string()),
    };

    let app = Router::new()
        .route("/", get(geo_handler))
        .route("/headers", get(headers_handler))
        .layer(GeoIpLayer::new(config));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();

    println!("Server starting on http://localhost:3000");
    println!("Test endpoints:");
    println!("  • GET /         - resolved geolocation via the extractor");
    println!("  • GET /headers  - the stamped X-GeoIP2-* request headers");
    println!();
    println!("Test with headers:");
    println!("  curl -H 'X-Real-IP: 188.193.88.199' http://localhost:3000/");
    println!("  curl -H 'X-Real-IP: qwerty' http://localhost:3000/headers");
    println!();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

/// Show the resolved result through the extractor.
async fn geo_handler(geo: GeoIp) -> String {
    let res = geo.result();
    format!(
        "country={} region={} city={} lat={} lon={}\n",
        res.country, res.region, res.city, res.latitude, res.longitude
    )
}

/// Show the stamped request headers, as a downstream service would see them.
async fn headers_handler(headers: HeaderMap) -> String {
    let mut out = String::new();
    for (name, value) in headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-geoip2-"))
    {
        out.push_str(&format!("{}: {}\n", name, value.to_str().unwrap_or("?")));
    }
    out
}
