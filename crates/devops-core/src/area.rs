//! Area path canonicalization.
//!
//! Classification-node APIs report area paths as `\Project\Area\Team`,
//! while WIQL `UNDER` clauses expect `Project\Team`.

/// Canonicalize an area path for use in a WIQL `UNDER` clause.
///
/// Leading separators are stripped and a redundant `Area` second segment is
/// removed. Any other path is returned unchanged. Never fails.
#[must_use]
pub fn normalize_area_path(path: &str) -> String {
    let trimmed = path.trim().trim_start_matches(['\\', '/']);
    let mut segments: Vec<&str> = trimmed.split('\\').collect();

    if segments.len() >= 2 && segments[1].eq_ignore_ascii_case("Area") {
        segments.remove(1);
    }

    segments.join("\\")
}
