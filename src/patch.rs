//! Invariant-checked text patching.
//!
//! A patch names an anchor token, a pattern, and a replacement. The anchor
//! finds the neighbourhood of the patch site; the pattern must then occur
//! exactly the expected number of times (normally once) in scope, or the
//! patch fails. Nothing is ever replaced on a count mismatch.
//!
//! The engine works on opaque text. It does not know whether the blob is a
//! minified bundle, a JSON file or anything else.

use anyhow::{Context, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::RepackError;
use crate::filesystem::write_atomic;

/// What to search for inside the scoped text.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    /// Replacement text may refer to capture groups (`$1`, `${name}`).
    Regex(Regex),
}

impl Pattern {
    pub fn regex(source: &str) -> Result<Self> {
        let re = Regex::new(source).with_context(|| format!("invalid patch regex '{source}'"))?;
        Ok(Self::Regex(re))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Literal(text) => text,
            Self::Regex(re) => re.as_str(),
        }
    }

    /// Non-overlapping matches in `haystack`, in order, each paired with
    /// its expanded replacement.
    fn find_all(&self, haystack: &str, replacement: &str) -> Vec<(Range<usize>, String)> {
        match self {
            Self::Literal(text) => haystack
                .match_indices(text.as_str())
                .map(|(start, m)| (start..start + m.len(), replacement.to_string()))
                .collect(),
            Self::Regex(re) => re
                .captures_iter(haystack)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let mut expanded = String::new();
                    caps.expand(replacement, &mut expanded);
                    Some((whole.range(), expanded))
                })
                .collect(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One patch operation. Built per use, never persisted.
#[derive(Debug, Clone)]
pub struct PatchSpec {
    pub name: String,
    pub anchor: String,
    pub pattern: Pattern,
    pub replacement: String,
    pub expected: usize,
    /// Restrict the pattern search to this many bytes either side of the
    /// anchor. `None` searches the whole blob.
    pub context_radius: Option<usize>,
}

impl PatchSpec {
    pub fn new(
        name: impl Into<String>,
        anchor: impl Into<String>,
        pattern: Pattern,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            anchor: anchor.into(),
            pattern,
            replacement: replacement.into(),
            expected: 1,
            context_radius: None,
        }
    }

    pub fn with_expected(mut self, expected: usize) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_context_radius(mut self, radius: usize) -> Self {
        self.context_radius = Some(radius);
        self
    }
}

/// Outcome of patching one blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedBlob {
    pub text: String,
    pub occurrences: usize,
}

/// Outcome of patching a file tree, kept for the build manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub name: String,
    pub path: PathBuf,
    pub occurrences: usize,
}

/// Which files a patch may touch, relative to the tree root.
#[derive(Debug, Clone)]
pub enum PatchTarget {
    File(PathBuf),
    /// Direct children of `dir` whose file name matches `file_name`.
    Glob { dir: PathBuf, file_name: Regex },
}

impl PatchTarget {
    /// Candidate files in the order they are tried.
    fn candidates(&self, root: &Path) -> Result<Vec<PathBuf>> {
        match self {
            Self::File(rel) => {
                let path = root.join(rel);
                Ok(if path.is_file() { vec![path] } else { Vec::new() })
            }
            Self::Glob { dir, file_name } => {
                let dir = root.join(dir);
                if !dir.is_dir() {
                    return Ok(Vec::new());
                }
                let mut found = Vec::new();
                for entry in fs::read_dir(&dir)
                    .with_context(|| format!("Failed to read directory: {}", dir.display()))?
                {
                    let entry = entry?;
                    let name = entry.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if entry.file_type()?.is_file() && file_name.is_match(name) {
                        found.push(entry.path());
                    }
                }
                found.sort();
                Ok(found)
            }
        }
    }

    fn search_root(&self, root: &Path) -> PathBuf {
        match self {
            Self::File(rel) => root.join(rel),
            Self::Glob { dir, .. } => root.join(dir),
        }
    }
}

/// Apply `spec` to `blob`. `origin` only labels errors.
pub fn apply_patch(blob: &str, spec: &PatchSpec, origin: &Path) -> Result<PatchedBlob, RepackError> {
    let scope = search_window(blob, &spec.anchor, spec.context_radius);
    let matches: Vec<(Range<usize>, String)> = match &scope {
        Some(window) => spec
            .pattern
            .find_all(&blob[window.clone()], &spec.replacement)
            .into_iter()
            .map(|(m, with)| (m.start + window.start..m.end + window.start, with))
            .collect(),
        None => Vec::new(),
    };

    if matches.len() != spec.expected {
        return Err(RepackError::PatchInvariantViolated {
            patch: spec.name.clone(),
            file: origin.to_path_buf(),
            pattern: spec.pattern.to_string(),
            expected: spec.expected,
            actual: matches.len(),
        });
    }

    let mut text = String::with_capacity(blob.len());
    let mut cursor = 0;
    for (range, with) in &matches {
        text.push_str(&blob[cursor..range.start]);
        text.push_str(with);
        cursor = range.end;
    }
    text.push_str(&blob[cursor..]);

    Ok(PatchedBlob {
        text,
        occurrences: matches.len(),
    })
}

/// Patch the first candidate under `root` (in sorted order) that contains
/// the anchor, and write it back in place.
pub fn apply_patch_in_tree(root: &Path, target: &PatchTarget, spec: &PatchSpec) -> Result<PatchResult> {
    let candidates = target.candidates(root)?;
    tracing::debug!(patch = %spec.name, candidates = candidates.len(), "searching patch target");

    for path in candidates {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if !content.contains(&spec.anchor) {
            continue;
        }

        let patched = apply_patch(&content, spec, &path)?;
        write_atomic(&path, patched.text.as_bytes())?;
        tracing::info!(
            "Applied patch '{}' to {} ({} occurrence(s))",
            spec.name,
            path.display(),
            patched.occurrences
        );
        return Ok(PatchResult {
            name: spec.name.clone(),
            path,
            occurrences: patched.occurrences,
        });
    }

    Err(RepackError::PatchTargetNotFound {
        patch: spec.name.clone(),
        root: target.search_root(root),
        anchor: spec.anchor.clone(),
    }
    .into())
}

/// Byte range to search: the whole blob, the anchor's neighbourhood, or
/// nothing when the anchor is absent.
fn search_window(blob: &str, anchor: &str, radius: Option<usize>) -> Option<Range<usize>> {
    let anchor_start = blob.find(anchor)?;
    let Some(radius) = radius else {
        return Some(0..blob.len());
    };
    let anchor_end = anchor_start + anchor.len();
    let mut start = anchor_start.saturating_sub(radius);
    let mut end = anchor_end.saturating_add(radius).min(blob.len());
    while !blob.is_char_boundary(start) {
        start -= 1;
    }
    while !blob.is_char_boundary(end) {
        end += 1;
    }
    Some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use tempfile::TempDir;

    const GATE_REGEX: &str = r"const s=[A-Za-z_$][\w$]*\(i\);if\(r\)\{";

    fn gate_spec() -> PatchSpec {
        PatchSpec::new(
            "feature-gate",
            "if(r){",
            Pattern::regex(GATE_REGEX).unwrap(),
            "const s=!1;if(r){",
        )
    }

    fn actual_count(err: RepackError) -> usize {
        match err {
            RepackError::PatchInvariantViolated { actual, .. } => actual,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn single_occurrence_is_replaced() {
        let blob = "a();const s=f(i);if(r){b()}";
        let patched = apply_patch(blob, &gate_spec(), Path::new("index.js")).unwrap();
        assert_eq!(patched.occurrences, 1);
        assert_eq!(patched.text, "a();const s=!1;if(r){b()}");
    }

    #[test]
    fn duplicate_pattern_reports_two() {
        let blob = "const s=f(i);if(r){x}const s=Xs(i);if(r){y}";
        let err = apply_patch(blob, &gate_spec(), Path::new("index.js")).unwrap_err();
        assert_eq!(actual_count(err), 2);
    }

    #[test]
    fn missing_pattern_reports_zero() {
        let blob = "const t=f(i);if(r){x}";
        let err = apply_patch(blob, &gate_spec(), Path::new("index.js")).unwrap_err();
        assert_eq!(actual_count(err), 0);
    }

    #[test]
    fn missing_anchor_reports_zero() {
        let err = apply_patch("nothing here", &gate_spec(), Path::new("index.js")).unwrap_err();
        assert_eq!(actual_count(err), 0);
    }

    #[test]
    fn patched_blob_does_not_patch_again() {
        let blob = "a();const s=f(i);if(r){b()}";
        let once = apply_patch(blob, &gate_spec(), Path::new("index.js")).unwrap();
        let err = apply_patch(&once.text, &gate_spec(), Path::new("index.js")).unwrap_err();
        assert_eq!(actual_count(err), 0);
    }

    #[test]
    fn window_ignores_matches_far_from_anchor() {
        let far = "x".repeat(500);
        let blob = format!("shell:\"/bin/zsh\"{far}ANCHOR shell:\"/bin/zsh\"");
        let spec = PatchSpec::new(
            "shell",
            "ANCHOR",
            Pattern::Literal("shell:\"/bin/zsh\"".to_string()),
            "shell:\"powershell.exe\"",
        )
        .with_context_radius(64);

        let patched = apply_patch(&blob, &spec, Path::new("main.js")).unwrap();
        assert_eq!(patched.occurrences, 1);
        assert!(patched.text.starts_with("shell:\"/bin/zsh\""));
        assert!(patched.text.ends_with("ANCHOR shell:\"powershell.exe\""));
    }

    #[test]
    fn whole_blob_search_sees_both_matches() {
        let far = "x".repeat(500);
        let blob = format!("shell{far}ANCHOR shell");
        let spec = PatchSpec::new("shell", "ANCHOR", Pattern::Literal("shell".into()), "pwsh");
        let err = apply_patch(&blob, &spec, Path::new("main.js")).unwrap_err();
        assert_eq!(actual_count(err), 2);
    }

    #[test]
    fn window_is_clamped_and_char_aligned() {
        let blob = "ééANCHORéé";
        let spec = PatchSpec::new("accent", "ANCHOR", Pattern::Literal("é".into()), "e")
            .with_context_radius(1);
        // One byte either side lands inside a two-byte char; the window widens.
        let err = apply_patch(blob, &spec, Path::new("x")).unwrap_err();
        assert_eq!(actual_count(err), 2);

        let spec = spec.with_context_radius(10_000).with_expected(4);
        let patched = apply_patch(blob, &spec, Path::new("x")).unwrap();
        assert_eq!(patched.text, "eeANCHORee");
    }

    #[test]
    fn regex_replacement_expands_captures() {
        let spec = PatchSpec::new(
            "sep",
            "pathSep",
            Pattern::regex(r#"pathSep:"(/)""#).unwrap(),
            r#"pathSep:"\\",was:"$1""#,
        );
        let patched = apply_patch(r#"{pathSep:"/"}"#, &spec, Path::new("x")).unwrap();
        assert_eq!(patched.text, r#"{pathSep:"\\",was:"/"}"#);
    }

    #[test]
    fn invariant_error_names_file_and_pattern() {
        let err = apply_patch("", &gate_spec(), Path::new("assets/index-b.js")).unwrap_err();
        match err {
            RepackError::PatchInvariantViolated {
                file, pattern, expected, ..
            } => {
                assert_eq!(file, PathBuf::from("assets/index-b.js"));
                assert_eq!(pattern, GATE_REGEX);
                assert_eq!(expected, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn assets_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let assets = temp.path().join("webview/assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("index-c.js"), "appSunset.title;const s=Zz(i);if(r){}").unwrap();
        fs::write(assets.join("index-a.js"), "no anchor in here").unwrap();
        fs::write(assets.join("index-b.js"), "appSunset.title;const s=Xs(i);if(r){}").unwrap();
        fs::write(assets.join("vendor.js"), "appSunset.title;const s=Q(i);if(r){}").unwrap();
        temp
    }

    fn tree_spec() -> (PatchTarget, PatchSpec) {
        let target = PatchTarget::Glob {
            dir: PathBuf::from("webview/assets"),
            file_name: Regex::new(r"(?i)^index-.*\.js$").unwrap(),
        };
        let spec = PatchSpec::new(
            "feature-gate",
            "appSunset.title",
            Pattern::regex(GATE_REGEX).unwrap(),
            "const s=!1;if(r){",
        );
        (target, spec)
    }

    #[test]
    fn tree_patch_takes_first_sorted_file_with_anchor() {
        let temp = assets_tree();
        let (target, spec) = tree_spec();

        let result = apply_patch_in_tree(temp.path(), &target, &spec).unwrap();

        assert_eq!(result.path, temp.path().join("webview/assets/index-b.js"));
        assert_eq!(result.occurrences, 1);
        let b = fs::read_to_string(temp.path().join("webview/assets/index-b.js")).unwrap();
        assert_eq!(b, "appSunset.title;const s=!1;if(r){}");
        let c = fs::read_to_string(temp.path().join("webview/assets/index-c.js")).unwrap();
        assert!(c.contains("Zz(i)"));
    }

    #[test]
    fn independent_passes_over_same_tree() {
        let temp = assets_tree();
        let (target, spec) = tree_spec();
        apply_patch_in_tree(temp.path(), &target, &spec).unwrap();

        let second = PatchSpec::new(
            "title",
            "appSunset.title",
            Pattern::Literal("appSunset.title".into()),
            "appSunset.heading",
        );
        let result = apply_patch_in_tree(temp.path(), &target, &second).unwrap();
        assert_eq!(result.path, temp.path().join("webview/assets/index-b.js"));
    }

    #[test]
    fn tree_without_anchor_is_target_not_found() {
        let temp = assets_tree();
        let (target, mut spec) = tree_spec();
        spec.anchor = "appSunset.subtitle".to_string();

        let err = apply_patch_in_tree(temp.path(), &target, &spec).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(RepackError::PatchTargetNotFound { .. })
        ));
    }

    #[test]
    fn missing_directory_is_target_not_found() {
        let temp = TempDir::new().unwrap();
        let (target, spec) = tree_spec();
        let err = apply_patch_in_tree(temp.path(), &target, &spec).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(RepackError::PatchTargetNotFound { .. })
        ));
    }

    #[test]
    fn tree_mismatch_leaves_file_untouched() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("main.js");
        let original = "ANCHOR;const s=a(i);if(r){};const s=b(i);if(r){}";
        fs::write(&file, original).unwrap();
        let spec = PatchSpec::new(
            "gate",
            "ANCHOR",
            Pattern::regex(GATE_REGEX).unwrap(),
            "const s=!1;if(r){",
        );

        let err =
            apply_patch_in_tree(temp.path(), &PatchTarget::File("main.js".into()), &spec).unwrap_err();

        match classify(&err) {
            Some(RepackError::PatchInvariantViolated { file: f, actual, .. }) => {
                assert_eq!(f, &file);
                assert_eq!(*actual, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), original);
    }
}
