//! Loads the neighbor file: one address per line, whitespace-trimmed,
//! blank lines ignored. A missing file is non-fatal — the node starts with
//! an empty neighbor set, per spec.md §6.

use std::net::IpAddr;
use std::path::Path;

/// Read neighbor addresses from `path`. Lines that don't parse as an IP
/// address are logged and skipped rather than aborting the whole load; a
/// missing file is logged as a warning and yields an empty set.
pub fn load_neighbors(path: &Path) -> Vec<IpAddr> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "neighbor file not found, starting with no configured neighbors");
            return Vec::new();
        }
    };

    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<IpAddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                tracing::warn!(line, %err, "skipping malformed neighbor address");
                None
            }
        })
        .collect()
}
