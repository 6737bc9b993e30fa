/* demos/lookup.rs */

use geostamp::{DEFAULT_DB_PATH, open_lookup};
use std::env;
use std::net::IpAddr;

fn main() {
    let mut args = env::args().skip(1);
    let db = args.next().unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

    let lookup = match open_lookup(&db) {
        Ok(Some(lookup)) => lookup,
        Ok(None) => {
            eprintln!("unrecognized database schema: {db}");
            return;
        }
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };

    for raw in args {
        match raw.parse::<IpAddr>() {
            Ok(ip) => match lookup.lookup(ip) {
                Ok(res) => println!(
                    "{raw}: country={} region={} city={} lat={} lon={}",
                    res.country, res.region, res.city, res.latitude, res.longitude
                ),
                Err(err) => println!("{raw}: {err}"),
            },
            Err(_) => println!("{raw}: not an IP address"),
        }
    }
}
