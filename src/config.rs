//! The declarative pipeline configuration and its on-disk form.
//!
//! A [`DataConfig`] fully determines a training input pipeline: frame
//! source, derived weighting variables, column groups, transform chains,
//! split sizes and seed. Its canonical serialization (sorted keys,
//! four-space indent) doubles as the identity of a training run: saving
//! into a directory that already holds a *different* config is a hard
//! error, with a line diff in the message so the collision is obvious.

use crate::consts::DEF_SEED;
use crate::error::Error;
use crate::frame::{FrameSpec, SplitSize, VarSpec};
use crate::transforms::TransformSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use tracing::info;

pub const CONFIG_FNAME: &str = "config.json";

fn default_seed() -> u64 {
    DEF_SEED
}

fn default_shuffle() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Where the rows come from.
    pub frame: FrameSpec,

    /// Derived columns computed on the full frame before splitting,
    /// e.g. flat sample weights.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_vars: Option<BTreeMap<String, VarSpec>>,

    /// Scalar input groups, each a list of frame columns.
    #[serde(default)]
    pub input_groups_scalar: BTreeMap<String, Vec<String>>,

    /// Vlarr input groups, each a list of frame columns.
    #[serde(default)]
    pub input_groups_vlarr: BTreeMap<String, Vec<String>>,

    /// Target labels, each a list of scalar frame columns.
    pub target_groups: BTreeMap<String, Vec<String>>,

    /// Per-group prong caps applied after the transform chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlarr_limits: Option<BTreeMap<String, usize>>,

    /// Transform chain for the training split.
    #[serde(default)]
    pub transform_train: Vec<TransformSpec>,

    /// Transform chain for the validation and test splits.
    #[serde(default)]
    pub transform_test: Vec<TransformSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_size: Option<SplitSize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_size: Option<SplitSize>,

    /// Maps a target label to the frame column serving as its sample
    /// weight. Unmapped labels weigh every sample equally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, String>>,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Shuffle rows (seeded) before splitting.
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

impl DataConfig {
    /// Canonical serialized form: sorted keys, four-space indent,
    /// trailing newline. Byte-stable across runs and platforms.
    pub fn to_json(&self) -> Result<String> {
        // BTreeMap fields and struct field order make serde_json output
        // deterministic already; going through Value sorts the struct
        // keys themselves as well.
        let value = serde_json::to_value(self).context("Failed to serialize configuration")?;
        let value = sort_value(value);

        let mut buffer = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        value
            .serialize(&mut serializer)
            .context("Failed to render configuration")?;
        buffer.push(b'\n');

        String::from_utf8(buffer).context("Configuration rendered as non-utf8")
    }

    /// Short stable digest of the canonical form, for run directories
    /// and log lines.
    pub fn content_hash(&self) -> Result<String> {
        let json = self.to_json()?;
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        Ok(format!("{:016x}", hasher.finish()))
    }

    /// Persists the config into `dir` as [`CONFIG_FNAME`].
    ///
    /// Re-saving an identical config is a no-op; saving over a different
    /// one fails with the line diff. Silent overwrites would detach a
    /// run directory from the configuration that produced it.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let path = dir.join(CONFIG_FNAME);
        let json = self.to_json()?;

        if path.exists() {
            let existing = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read existing {}", path.display()))?;

            if existing == json {
                return Ok(());
            }

            return Err(Error::config(format!(
                "Refusing to overwrite {} with a different configuration:\n{}",
                path.display(),
                diff_lines(&existing, &json)
            )));
        }

        fs::write(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), hash = %self.content_hash()?, "Saved configuration");
        Ok(())
    }

    /// Loads the config previously saved into `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FNAME);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn sort_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            // serde_json maps are BTreeMap-backed here, so re-inserting
            // sorted entries keeps key order canonical at every level.
            let sorted: serde_json::Map<String, serde_json::Value> = map
                .into_iter()
                .map(|(key, value)| (key, sort_value(value)))
                .collect();
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(values) => {
            serde_json::Value::Array(values.into_iter().map(sort_value).collect())
        }
        other => other,
    }
}

// Minimal unified-style line diff for the collision error message.
fn diff_lines(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut out = String::new();
    let n = old_lines.len().max(new_lines.len());
    for i in 0..n {
        match (old_lines.get(i), new_lines.get(i)) {
            (Some(a), Some(b)) if a == b => {}
            (a, b) => {
                if let Some(a) = a {
                    out.push_str(&format!("- {}\n", a));
                }
                if let Some(b) = b {
                    out.push_str(&format!("+ {}\n", b));
                }
            }
        }
    }

    out
}
