/* src/lookup.rs */

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use maxminddb::{Reader, geoip2};
use tracing::debug;

use crate::error::{GeoIpError, Result};

/// Sentinel emitted whenever a real value cannot be determined.
pub const UNKNOWN: &str = "XX";

/// Default database path when none is configured.
pub const DEFAULT_DB_PATH: &str = "GeoLite2-Country.mmdb";

/// Geographic attributes resolved for a single address.
///
/// Every field is either a real resolved value or the sentinel [`UNKNOWN`];
/// fields are never empty strings. The struct is built fresh per lookup and
/// never mutated afterwards.
///
/// # Examples
///
/// ```rust
/// use geostamp::{GeoResult, UNKNOWN};
///
/// let unresolved = GeoResult::unknown();
/// assert_eq!(unresolved.country, UNKNOWN);
/// assert_eq!(unresolved.latitude, UNKNOWN);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoResult {
    /// ISO 3166-1 alpha-2 country code (e.g., "DE", "US").
    pub country: String,
    /// ISO code of the first subdivision entry, regardless of level.
    pub region: String,
    /// English city name.
    pub city: String,
    /// Latitude as a minimal decimal string.
    pub latitude: String,
    /// Longitude as a minimal decimal string.
    pub longitude: String,
}

impl GeoResult {
    /// The all-sentinel result, used whenever resolution fails at any stage.
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            latitude: UNKNOWN.to_string(),
            longitude: UNKNOWN.to_string(),
        }
    }
}

impl Default for GeoResult {
    fn default() -> Self {
        Self::unknown()
    }
}

/// A resolved database handle that maps addresses to [`GeoResult`]s.
///
/// Implementations are shared read-only across concurrent requests, so the
/// trait requires `Send + Sync`. The middleware never calls `lookup` with
/// anything it could not parse as an address; implementations only need to
/// handle not-found and reader failures, both of which the caller maps to
/// [`GeoResult::unknown`].
pub trait Lookup: Send + Sync {
    /// Resolve a single address to its geographic attributes.
    fn lookup(&self, ip: IpAddr) -> Result<GeoResult>;
}

impl std::fmt::Debug for dyn Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Lookup")
    }
}

/// Which of the two supported record shapes a database implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Country-only records: everything but `country` is [`UNKNOWN`].
    Country,
    /// City-level records: subdivisions, city names and coordinates.
    City,
}

impl Schema {
    /// Detect the schema of an opened database.
    ///
    /// The MMDB format is self-describing, so the metadata `database_type`
    /// (e.g., `"GeoLite2-City"`, `"GeoIP2-Country"`) is consulted first. The
    /// case-sensitive filename convention (`"City"` / `"Country"` as a path
    /// substring) is only a fallback for databases with a nonstandard type
    /// string.
    pub fn detect(database_type: &str, path_hint: &str) -> Option<Schema> {
        Self::from_marker(database_type).or_else(|| Self::from_marker(path_hint))
    }

    fn from_marker(s: &str) -> Option<Schema> {
        if s.contains("City") {
            Some(Schema::City)
        } else if s.contains("Country") {
            Some(Schema::Country)
        } else {
            None
        }
    }
}

/// Lookup over a city-level database.
pub struct CityLookup {
    reader: Reader<Vec<u8>>,
}

impl CityLookup {
    /// Wrap an already opened reader. The reader's schema is not re-checked.
    pub fn new(reader: Reader<Vec<u8>>) -> Self {
        Self { reader }
    }
}

impl Lookup for CityLookup {
    fn lookup(&self, ip: IpAddr) -> Result<GeoResult> {
        let record: geoip2::City = self.reader.lookup(ip)?;
        Ok(normalize_city(record))
    }
}

/// Lookup over a country-only database.
pub struct CountryLookup {
    reader: Reader<Vec<u8>>,
}

impl CountryLookup {
    /// Wrap an already opened reader. The reader's schema is not re-checked.
    pub fn new(reader: Reader<Vec<u8>>) -> Self {
        Self { reader }
    }
}

impl Lookup for CountryLookup {
    fn lookup(&self, ip: IpAddr) -> Result<GeoResult> {
        let record: geoip2::Country = self.reader.lookup(ip)?;
        Ok(normalize_country(record))
    }
}

/// Map a city-schema record to the fixed result shape.
fn normalize_city(record: geoip2::City<'_>) -> GeoResult {
    let country = record
        .country
        .and_then(|c| c.iso_code)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let city = record
        .city
        .and_then(|c| c.names)
        .and_then(|names| names.get("en").map(|s| s.to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string());

    // First subdivision entry wins, regardless of administrative level.
    let region = record
        .subdivisions
        .as_ref()
        .and_then(|subs| subs.first())
        .and_then(|sub| sub.iso_code)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());

    let (latitude, longitude) = record
        .location
        .map(|loc| (loc.latitude, loc.longitude))
        .unwrap_or((None, None));

    GeoResult {
        country,
        region,
        city,
        latitude: format_coordinate(latitude),
        longitude: format_coordinate(longitude),
    }
}

/// Map a country-schema record to the fixed result shape. Everything below
/// the country code is sentinel, the schema carries no finer data.
fn normalize_country(record: geoip2::Country<'_>) -> GeoResult {
    let country = record
        .country
        .and_then(|c| c.iso_code)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());

    GeoResult {
        country,
        ..GeoResult::unknown()
    }
}

/// Open a database and wrap it in the schema-appropriate [`Lookup`].
///
/// Returns `Ok(None)` when the file opens but matches neither schema; callers
/// are expected to log and serve without geolocation in that case. An open
/// failure (missing file, bad magic, truncated data) is an error, which
/// callers degrade to the same no-adapter mode.
///
/// # Examples
///
/// ```rust,no_run
/// use geostamp::{Lookup, open_lookup};
///
/// let lookup = open_lookup("GeoLite2-City.mmdb")?
///     .expect("database schema should be recognized");
/// let result = lookup.lookup("188.193.88.199".parse().unwrap())?;
/// println!("{} / {}", result.country, result.city);
/// # Ok::<(), geostamp::GeoIpError>(())
/// ```
pub fn open_lookup(path: impl AsRef<Path>) -> Result<Option<Arc<dyn Lookup>>> {
    let path = path.as_ref();
    let reader = Reader::open_readfile(path).map_err(|source| GeoIpError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let database_type = reader.metadata.database_type.clone();
    let schema = Schema::detect(&database_type, &path.to_string_lossy());
    debug!(
        db = %path.display(),
        database_type = %database_type,
        ?schema,
        "opened geolocation database"
    );

    Ok(match schema {
        Some(Schema::City) => Some(Arc::new(CityLookup::new(reader))),
        Some(Schema::Country) => Some(Arc::new(CountryLookup::new(reader))),
        None => None,
    })
}

/// Render a coordinate as a minimal decimal string.
///
/// An absent or exactly zero value renders as [`UNKNOWN`]: real-world "no
/// location" records encode as 0.0, and emitting a false equator position is
/// worse than losing the one legitimate point at (0, 0).
fn format_coordinate(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => v.to_string(),
        _ => UNKNOWN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_unknown_result_is_all_sentinel() {
        let res = GeoResult::unknown();
        assert_eq!(res.country, "XX");
        assert_eq!(res.region, "XX");
        assert_eq!(res.city, "XX");
        assert_eq!(res.latitude, "XX");
        assert_eq!(res.longitude, "XX");
        assert_eq!(GeoResult::default(), res);
    }

    #[test]
    fn test_schema_from_metadata() {
        assert_eq!(
            Schema::detect("GeoLite2-City", "some.mmdb"),
            Some(Schema::City)
        );
        assert_eq!(
            Schema::detect("GeoIP2-Country", "some.mmdb"),
            Some(Schema::Country)
        );
        assert_eq!(
            Schema::detect("DBIP-City-Lite", "some.mmdb"),
            Some(Schema::City)
        );
    }

    #[test]
    fn test_schema_filename_fallback() {
        assert_eq!(
            Schema::detect("Custom", "/var/lib/GeoLite2-City.mmdb"),
            Some(Schema::City)
        );
        assert_eq!(
            Schema::detect("Custom", "GeoLite2-Country.mmdb"),
            Some(Schema::Country)
        );
    }

    #[test]
    fn test_schema_marker_is_case_sensitive() {
        assert_eq!(Schema::detect("geolite2-city", "geolite2-city.mmdb"), None);
        assert_eq!(Schema::detect("Custom", "asn.mmdb"), None);
    }

    #[test]
    fn test_metadata_takes_precedence_over_filename() {
        // Misleadingly named file, honest metadata.
        assert_eq!(
            Schema::detect("GeoLite2-City", "Country.mmdb"),
            Some(Schema::City)
        );
    }

    #[test]
    fn test_open_missing_file_is_error() {
        let err = open_lookup("/nonexistent/GeoLite2-City.mmdb").unwrap_err();
        assert!(matches!(err, GeoIpError::Open { .. }));
    }

    #[test]
    fn test_open_corrupt_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not an mmdb file").unwrap();
        let err = open_lookup(file.path()).unwrap_err();
        assert!(matches!(err, GeoIpError::Open { .. }));
    }

    #[test]
    fn test_format_coordinate() {
        assert_eq!(format_coordinate(Some(48.1663)), "48.1663");
        assert_eq!(format_coordinate(Some(-122.08)), "-122.08");
        assert_eq!(format_coordinate(Some(11.0)), "11");
    }

    #[test]
    fn test_zero_or_absent_coordinate_is_sentinel() {
        assert_eq!(format_coordinate(Some(0.0)), "XX");
        assert_eq!(format_coordinate(Some(-0.0)), "XX");
        assert_eq!(format_coordinate(None), "XX");
    }

    fn city_record(json: &'static str) -> geoip2::City<'static> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_city_full_record() {
        let record = city_record(
            r#"{
                "country": {"iso_code": "DE"},
                "city": {"names": {"de": "München", "en": "Munich"}},
                "subdivisions": [{"iso_code": "BY"}, {"iso_code": "09"}],
                "location": {"latitude": 48.1663, "longitude": 11.5683}
            }"#,
        );

        assert_eq!(
            normalize_city(record),
            GeoResult {
                country: "DE".to_string(),
                region: "BY".to_string(),
                city: "Munich".to_string(),
                latitude: "48.1663".to_string(),
                longitude: "11.5683".to_string(),
            }
        );
    }

    #[test]
    fn test_normalize_city_first_subdivision_wins() {
        let record = city_record(
            r#"{
                "country": {"iso_code": "US"},
                "subdivisions": [{"iso_code": "CA"}, {"iso_code": "075"}]
            }"#,
        );
        assert_eq!(normalize_city(record).region, "CA");
    }

    #[test]
    fn test_normalize_city_without_subdivisions() {
        let record = city_record(r#"{"country": {"iso_code": "SG"}}"#);
        let result = normalize_city(record);
        assert_eq!(result.country, "SG");
        assert_eq!(result.region, "XX");

        let record = city_record(r#"{"country": {"iso_code": "SG"}, "subdivisions": []}"#);
        assert_eq!(normalize_city(record).region, "XX");
    }

    #[test]
    fn test_normalize_city_without_english_name() {
        let record = city_record(r#"{"city": {"names": {"de": "München"}}}"#);
        assert_eq!(normalize_city(record).city, "XX");
    }

    #[test]
    fn test_normalize_city_without_country() {
        // Record present but countryless, and a country entry with no code.
        assert_eq!(normalize_city(city_record("{}")).country, "XX");
        let record = city_record(r#"{"country": {"geoname_id": 2921044}}"#);
        assert_eq!(normalize_city(record).country, "XX");
    }

    #[test]
    fn test_normalize_city_zero_coordinates_are_sentinel() {
        let record = city_record(
            r#"{
                "country": {"iso_code": "DE"},
                "location": {"latitude": 0.0, "longitude": 11.5683}
            }"#,
        );
        let result = normalize_city(record);
        assert_eq!(result.latitude, "XX");
        assert_eq!(result.longitude, "11.5683");
    }

    #[test]
    fn test_normalize_city_without_location() {
        let record = city_record(r#"{"country": {"iso_code": "DE"}}"#);
        let result = normalize_city(record);
        assert_eq!(result.latitude, "XX");
        assert_eq!(result.longitude, "XX");
    }

    #[test]
    fn test_normalize_country_record() {
        let record: geoip2::Country =
            serde_json::from_str(r#"{"country": {"iso_code": "DE"}}"#).unwrap();
        assert_eq!(
            normalize_country(record),
            GeoResult {
                country: "DE".to_string(),
                ..GeoResult::unknown()
            }
        );

        let record: geoip2::Country = serde_json::from_str("{}").unwrap();
        assert_eq!(normalize_country(record), GeoResult::unknown());
    }

    #[test]
    fn test_not_found_error_classification() {
        let err = GeoIpError::Lookup(maxminddb::MaxMindDBError::AddressNotFoundError(
            "no record".to_string(),
        ));
        assert!(err.is_not_found());

        let err = GeoIpError::Lookup(maxminddb::MaxMindDBError::InvalidDatabaseError(
            "bad data".to_string(),
        ));
        assert!(!err.is_not_found());
    }
}
