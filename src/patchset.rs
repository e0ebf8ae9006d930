//! Registered patches and the order they run in.
//!
//! Patches run by stage: runtime-environment fixes to the startup script
//! first, then path normalisation in the UI bundle, then feature gates.
//! Within a stage they keep registration order. The built-in feature gate is
//! always the last patch of its stage.

use anyhow::{bail, Result};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::patch::{apply_patch_in_tree, Pattern, PatchResult, PatchSpec, PatchTarget};

pub const FEATURE_GATE_PATCH: &str = "sunset-upgrade-gate";
const FEATURE_GATE_ANCHOR: &str = "appSunset.title";
const FEATURE_GATE_PATTERN: &str = r"const s=[A-Za-z_$][\w$]*\(i\);if\(r\)\{";
const FEATURE_GATE_REPLACEMENT: &str = "const s=!1;if(r){";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStage {
    RuntimeEnvironment,
    PathNormalization,
    FeatureGate,
}

#[derive(Debug, Clone)]
pub struct RegisteredPatch {
    pub stage: PatchStage,
    pub target: PatchTarget,
    pub spec: PatchSpec,
}

/// Disables the upgrade gate that blocks the app once the build is
/// considered sunset. Lives in the webview `index-*.js` bundle.
pub fn feature_gate_patch() -> Result<RegisteredPatch> {
    Ok(RegisteredPatch {
        stage: PatchStage::FeatureGate,
        target: PatchTarget::Glob {
            dir: PathBuf::from("webview").join("assets"),
            file_name: RegexBuilder::new(r"^index-.*\.js$")
                .case_insensitive(true)
                .build()?,
        },
        spec: PatchSpec::new(
            FEATURE_GATE_PATCH,
            FEATURE_GATE_ANCHOR,
            Pattern::regex(FEATURE_GATE_PATTERN)?,
            FEATURE_GATE_REPLACEMENT,
        ),
    })
}

/// Built-in patches plus `extra`, in application order.
pub fn ordered_patches(extra: &[RegisteredPatch]) -> Result<Vec<RegisteredPatch>> {
    let mut patches = extra.to_vec();
    patches.push(feature_gate_patch()?);
    // Stable sort, so the built-in gate stays behind any extra feature gates.
    patches.sort_by_key(|patch| patch.stage);
    Ok(patches)
}

/// Apply every patch to the tree at `root`. Stops at the first failure.
pub fn apply_all(root: &Path, patches: &[RegisteredPatch]) -> Result<Vec<PatchResult>> {
    patches
        .iter()
        .map(|patch| apply_patch_in_tree(root, &patch.target, &patch.spec))
        .collect()
}

/// A `[[patches]]` entry from `repack.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchToml {
    pub name: String,
    pub stage: PatchStage,
    pub file: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub file_pattern: Option<String>,
    pub anchor: String,
    pub literal: Option<String>,
    pub regex: Option<String>,
    pub replacement: String,
    pub expected: Option<usize>,
    pub context_radius: Option<usize>,
}

impl PatchToml {
    pub fn into_registered(self) -> Result<RegisteredPatch> {
        if self.anchor.is_empty() {
            bail!("patch '{}': anchor must not be empty", self.name);
        }

        let target = match (self.file, self.dir, self.file_pattern) {
            (Some(file), None, None) => PatchTarget::File(file),
            (None, Some(dir), Some(pattern)) => PatchTarget::Glob {
                dir,
                file_name: Regex::new(&pattern)?,
            },
            _ => bail!(
                "patch '{}': set either `file`, or both `dir` and `file_pattern`",
                self.name
            ),
        };

        let pattern = match (self.literal, self.regex) {
            (Some(text), None) if !text.is_empty() => Pattern::Literal(text),
            (None, Some(source)) => {
                let pattern = Pattern::regex(&source)?;
                // Zero-width matches would make the occurrence count meaningless.
                if matches!(&pattern, Pattern::Regex(re) if re.is_match("")) {
                    bail!(
                        "patch '{}': regex `{source}` matches the empty string",
                        self.name
                    );
                }
                pattern
            }
            _ => bail!(
                "patch '{}': set exactly one non-empty `literal` or `regex`",
                self.name
            ),
        };

        let expected = self.expected.unwrap_or(1);
        if expected == 0 {
            bail!("patch '{}': expected count must be at least 1", self.name);
        }

        let mut spec = PatchSpec::new(self.name, self.anchor, pattern, self.replacement)
            .with_expected(expected);
        spec.context_radius = self.context_radius;

        Ok(RegisteredPatch {
            stage: self.stage,
            target,
            spec,
        })
    }
}
