//! Lock name validation and node identity

use std::sync::LazyLock;

use if_addrs::IfAddr;

use crate::MAX_LOCK_NAME_LEN;

static LOCK_NAME_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new("^[a-zA-Z0-9_.:-]+$").expect("Invalid regex pattern"));

/// Check a lock name before it is written to the key column
///
/// A name is 1 to [`MAX_LOCK_NAME_LEN`] characters of alphanumerics,
/// underscore, dot, colon and hyphen.
///
/// ```
/// use clusterlock_common::is_valid_lock_name;
///
/// assert!(is_valid_lock_name("job-a"));
/// assert!(is_valid_lock_name("report:daily_v1"));
/// assert!(!is_valid_lock_name(""));
/// assert!(!is_valid_lock_name("reports/daily"));
/// ```
pub fn is_valid_lock_name(name: &str) -> bool {
    name.len() <= MAX_LOCK_NAME_LEN && LOCK_NAME_PATTERN.is_match(name)
}

/// Default owner identity: the first non-loopback IPv4 address, else 127.0.0.1
pub fn local_ip() -> String {
    if_addrs::get_if_addrs()
        .ok()
        .and_then(|addrs| {
            addrs
                .into_iter()
                .find(|iface| !iface.is_loopback() && matches!(iface.addr, IfAddr::V4(_)))
                .and_then(|iface| match iface.addr {
                    IfAddr::V4(addr) => Some(addr.ip.to_string()),
                    _ => None,
                })
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}
