//! Finding the application resource directory inside an archive listing.
//!
//! The listing format belongs to whatever tool produced it, so the parsing
//! sits behind [`ResourceLocator`]. [`SevenZipListing`] understands the
//! column table printed by `7z l`.

use crate::error::RepackError;

/// Path suffix of the application archive inside a macOS bundle.
pub const APP_ARCHIVE_MARKER: &str = ".app/Contents/Resources/app.asar";

/// A marker match: the archive path is `prefix` followed by `marker`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedResource {
    /// Text preceding the marker, with the listing's own separators.
    pub prefix: String,
    /// The marker as it appeared in the listing.
    pub marker: String,
}

impl LocatedResource {
    /// Full archive path of the located file.
    pub fn archive_path(&self) -> String {
        format!("{}{}", self.prefix, self.marker)
    }

    /// Archive path of the directory holding the located file, including the
    /// trailing separator. This is the extraction filter prefix.
    pub fn resource_dir(&self) -> String {
        let full = self.archive_path();
        match full.rfind(['/', '\\']) {
            Some(idx) => full[..=idx].to_string(),
            None => String::new(),
        }
    }
}

/// Turns an archive listing into the location of a marker file.
pub trait ResourceLocator {
    /// Must be pure: the same listing and marker always give the same answer.
    fn locate(&self, listing: &str, marker: &str) -> Result<LocatedResource, RepackError>;
}

/// Locator for the table printed by `7z l`.
///
/// Columns are separated by runs of spaces but their widths vary with the
/// archive, so the path is taken to be the trailing run after the last
/// double space before the marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct SevenZipListing;

impl ResourceLocator for SevenZipListing {
    fn locate(&self, listing: &str, marker: &str) -> Result<LocatedResource, RepackError> {
        let variants = marker_variants(marker);

        for line in listing.lines() {
            for variant in &variants {
                if let Some(found) = match_line(line, variant) {
                    tracing::debug!(prefix = %found.prefix, "located resource in listing");
                    return Ok(found);
                }
            }
        }

        Err(RepackError::ResourceNotFound {
            marker: marker.to_string(),
        })
    }
}

fn match_line(line: &str, marker: &str) -> Option<LocatedResource> {
    let marker_idx = line.find(marker)?;
    let column_start = line[..marker_idx].rfind("  ").unwrap_or(0);
    let full_path = line[column_start..].trim();
    // Anything after the marker means this line names some other file.
    if !full_path.ends_with(marker) {
        return None;
    }
    let prefix = &full_path[..full_path.len() - marker.len()];
    if prefix.is_empty() {
        return None;
    }
    Some(LocatedResource {
        prefix: prefix.to_string(),
        marker: marker.to_string(),
    })
}

/// The marker as given plus its backslash-separated form.
fn marker_variants(marker: &str) -> Vec<String> {
    let backslashed = marker.replace('/', "\\");
    if backslashed == marker {
        vec![marker.to_string()]
    } else {
        vec![marker.to_string(), backslashed]
    }
}
