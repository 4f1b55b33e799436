use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for reporter phone numbers
    /// Optional leading '+', then 7-20 digits separated by at most one space or hyphen
    /// - Valid: "+62 812-3456-7890", "081234567"
    /// - Invalid: "phone", "12", "+62--812345"
    pub static ref PHONE_REGEX: Regex =
        Regex::new(r"^\+?[0-9](?:[ -]?[0-9]){6,19}$").unwrap();

    /// Regex for zone identifiers
    /// Alphanumeric with hyphens or underscores, 1-64 chars
    /// - Valid: "default", "north", "jakarta-selatan", "zone_7"
    /// - Invalid: "", "north zone", "zone/7"
    pub static ref ZONE_ID_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
}
