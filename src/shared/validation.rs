use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for IANA time zone names as accepted by calendar providers
    /// - Valid: "UTC", "Europe/Berlin", "America/Argentina/Buenos_Aires", "Etc/GMT+5"
    /// - Invalid: "New York", "/Europe", "Europe/", "+05:00"
    pub static ref TIME_ZONE_REGEX: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_+\-]*(?:/[A-Za-z0-9_+\-]+)*$").unwrap();
}
