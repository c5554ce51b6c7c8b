//! Canonical file locations inside `.waypoint/`.

use std::path::{Path, PathBuf};

use crate::doc::DocKind;

pub const WORKSPACE_DIR: &str = ".waypoint";

/// All canonical paths for a repository root.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub state_path: PathBuf,
    pub plan_path: PathBuf,
    pub history_path: PathBuf,
    pub context_path: PathBuf,
    pub feedback_path: PathBuf,
    pub config_path: PathBuf,
    pub loop_log_path: PathBuf,
}

impl WorkspacePaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let dir = root.join(WORKSPACE_DIR);
        Self {
            root: root.clone(),
            state_path: dir.join(DocKind::State.file_name()),
            plan_path: dir.join(DocKind::Plan.file_name()),
            history_path: dir.join(DocKind::History.file_name()),
            context_path: dir.join(DocKind::Context.file_name()),
            feedback_path: dir.join(DocKind::Feedback.file_name()),
            config_path: dir.join(DocKind::Config.file_name()),
            loop_log_path: dir.join(DocKind::LoopLog.file_name()),
            dir,
        }
    }

    pub fn path_of(&self, kind: DocKind) -> &Path {
        match kind {
            DocKind::State => &self.state_path,
            DocKind::Plan => &self.plan_path,
            DocKind::History => &self.history_path,
            DocKind::Context => &self.context_path,
            DocKind::Feedback => &self.feedback_path,
            DocKind::Config => &self.config_path,
            DocKind::LoopLog => &self.loop_log_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_live_under_workspace_dir() {
        let paths = WorkspacePaths::new("/repo");
        assert_eq!(paths.state_path, Path::new("/repo/.waypoint/STATE.md"));
        assert_eq!(
            paths.path_of(DocKind::LoopLog),
            Path::new("/repo/.waypoint/loop_results.jsonl")
        );
    }
}
