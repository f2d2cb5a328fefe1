//! Remote URL construction.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Gs,
    S3,
    File,
}

impl Scheme {
    pub fn prefix(self) -> &'static str {
        match self {
            Scheme::Gs => "gs://",
            Scheme::S3 => "s3://",
            Scheme::File => "file:///",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scheme::Gs => "gs",
            Scheme::S3 => "s3",
            Scheme::File => "file",
        };
        f.write_str(name)
    }
}

/// Join `parts` into a canonical slash-separated path: empty and `.`
/// segments are dropped and `..` removes the previous segment.
pub fn normalize_path<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut segments: Vec<&str> = Vec::new();
    for part in parts {
        for segment in part.split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                s => segments.push(s),
            }
        }
    }
    segments.join("/")
}

/// Canonical form of a storage directory claimed by a storage target or a
/// backup. `None` when it is empty once normalized, or when a `..` would
/// climb above the directory it is rooted at.
pub fn canonical_dirstorage(dirstorage: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in dirstorage.split(['/', '\\']) {
        match segment.trim() {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Build `scheme://bucket/part/part/...`. The parts are normalized on
/// their own, so a `..` among them never climbs into the bucket.
pub fn build_url<'a, I>(scheme: Scheme, bucket: &'a str, parts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let bucket = normalize_path([bucket]);
    let path = normalize_path(parts);
    if path.is_empty() {
        format!("{}{}", scheme.prefix(), bucket)
    } else {
        format!("{}{}/{}", scheme.prefix(), bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_joins_segments() {
        assert_eq!(
            build_url(Scheme::Gs, "bucket", ["backups/photos", "2026", "a.jpg"]),
            "gs://bucket/backups/photos/2026/a.jpg"
        );
    }

    #[test]
    fn test_build_url_normalizes() {
        assert_eq!(
            build_url(Scheme::S3, "bucket/", ["/photos//./raw/", "../edited/", ""]),
            "s3://bucket/photos/edited"
        );
    }

    #[test]
    fn test_leading_parent_segments_are_dropped() {
        assert_eq!(normalize_path(["..", "..", "a"]), "a");
    }

    #[test]
    fn test_file_scheme_is_absolute() {
        assert_eq!(
            build_url(Scheme::File, "/mnt/backup", ["photos"]),
            "file:///mnt/backup/photos"
        );
    }

    #[test]
    fn test_parts_cannot_climb_into_bucket() {
        assert_eq!(
            build_url(Scheme::File, "/mnt/backup", ["../../../etc", "passwd"]),
            "file:///mnt/backup/etc/passwd"
        );
    }

    #[test]
    fn test_canonical_dirstorage() {
        assert_eq!(canonical_dirstorage("docs").as_deref(), Some("docs"));
        assert_eq!(canonical_dirstorage("./docs/").as_deref(), Some("docs"));
        assert_eq!(canonical_dirstorage("x/../docs").as_deref(), Some("docs"));
        assert_eq!(canonical_dirstorage("/hosts//web01").as_deref(), Some("hosts/web01"));
        assert_eq!(canonical_dirstorage(""), None);
        assert_eq!(canonical_dirstorage(" / ./"), None);
        assert_eq!(canonical_dirstorage("x/.."), None);
        assert_eq!(canonical_dirstorage("../../../etc"), None);
        assert_eq!(canonical_dirstorage("docs/../../etc"), None);
    }
}
