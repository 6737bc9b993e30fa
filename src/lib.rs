/* src/lib.rs */

//! # Geostamp
//!
//! Middleware that resolves the client IP address against a local MaxMind
//! GeoIP2/GeoLite2 database and stamps the result into request headers
//! before delegating downstream.
//!
//! Every request leaves the middleware with all five headers set:
//! `X-GeoIP2-Country`, `X-GeoIP2-Region`, `X-GeoIP2-City`,
//! `X-GeoIP2-Latitude` and `X-GeoIP2-Longitude`. Each carries either a
//! resolved value or the sentinel `XX`. A missing database, an unparseable
//! address, or an address absent from the database never fails the request,
//! only degrades it.
//!
//! ## Features
//!
//! - Country-level and city-level databases behind one [`Lookup`] trait
//! - Schema detection from the database's own metadata, with a filename
//!   convention as fallback
//! - Client IP from a configurable trusted header, falling back to the peer
//!   address
//! - Client-supplied values of the output headers are always overwritten
//! - Optional Axum middleware and extractor integration via the `axum`
//!   feature (enabled by default)
//!
//! ## Examples
//!
//! ### Resolving an address directly
//!
//! ```rust,no_run
//! use geostamp::{Lookup, open_lookup};
//!
//! let lookup = open_lookup("GeoLite2-City.mmdb")?
//!     .expect("recognized database schema");
//! let result = lookup.lookup("188.193.88.199".parse().unwrap())?;
//! assert_eq!(result.country, "DE");
//! # Ok::<(), geostamp::GeoIpError>(())
//! ```
//!
//! ### As an Axum layer
//!
//! ```rust,no_run
//! use axum::{Router, routing::get};
//! use geostamp::{GeoIpConfig, GeoIpLayer};
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(GeoIpLayer::new(GeoIpConfig::default()));
//! ```

pub mod error;
pub mod lookup;

#[cfg(feature = "axum")]
pub mod middleware;

pub use error::{GeoIpError, Result};
pub use lookup::{
    CityLookup, CountryLookup, DEFAULT_DB_PATH, GeoResult, Lookup, Schema, UNKNOWN, open_lookup,
};

#[cfg(feature = "axum")]
pub use middleware::{
    CITY_HEADER, COUNTRY_HEADER, GeoIp, GeoIpConfig, GeoIpLayer, GeoIpService, LATITUDE_HEADER,
    LONGITUDE_HEADER, REGION_HEADER,
};

/// Re-export commonly used types
pub use std::net::IpAddr;
