/* src/error.rs */

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for operations that may fail with `GeoIpError`.
pub type Result<T> = std::result::Result<T, GeoIpError>;

/// Errors that can occur while opening a database or resolving an address.
///
/// None of these are ever fatal to request processing: construction errors
/// degrade the middleware to no-adapter mode, request-time errors degrade to
/// the all-sentinel [`GeoResult`](crate::GeoResult).
#[derive(Error, Debug)]
pub enum GeoIpError {
    /// The database file could not be opened or parsed.
    #[error("unable to open geolocation database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: maxminddb::MaxMindDBError,
    },

    /// The database lookup itself failed. Covers the common and expected
    /// address-not-found case for private and reserved ranges.
    #[error("database lookup failed: {0}")]
    Lookup(#[from] maxminddb::MaxMindDBError),
}

impl GeoIpError {
    /// Whether this is the expected "address not present in the database"
    /// condition rather than a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GeoIpError::Lookup(maxminddb::MaxMindDBError::AddressNotFoundError(_))
        )
    }
}
