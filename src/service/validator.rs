use regex::Regex;
use std::sync::LazyLock;

// One octet: 250-255, 200-249, 100-199, 10-99, 0-9. No leading zeros.
static IPV4_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])$")
        .expect("IPv4 pattern is valid")
});

/// Strict dotted-quad IPv4 check. The whole string must match.
pub fn validate(ip: &str) -> bool {
    IPV4_PATTERN.is_match(ip)
}
