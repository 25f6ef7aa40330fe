//! Where run artifacts land under the output root

use std::path::{Path, PathBuf};

/// Suffix shared by every statistics file
pub const STATS_SUFFIX: &str = ".stats.json";

/// Directory tree receiving models and statistics
///
/// ```text
/// <root>/models/<model>
/// <root>/stats/training/<basename(model)>.stats.json
/// <root>/stats/evaluation/<model_file>/<source_id>.stats.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn model_path(&self, model: impl AsRef<Path>) -> PathBuf {
        self.root.join("models").join(model)
    }

    pub fn training_stats_path(&self, model: impl AsRef<Path>) -> PathBuf {
        let name = file_name(model.as_ref());
        self.root
            .join("stats")
            .join("training")
            .join(format!("{name}{STATS_SUFFIX}"))
    }

    pub fn evaluation_stats_path(&self, model_file: &str, source_id: &str) -> PathBuf {
        self.root
            .join("stats")
            .join("evaluation")
            .join(model_file)
            .join(format!("{source_id}{STATS_SUFFIX}"))
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self::new("output")
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
