use serde::{Deserialize, Serialize};

/// How a task's working copy of the project was provisioned.
///
/// The provisioning itself (cloning a worktree, starting a container) is
/// an external collaborator's job; the core only observes the tag and
/// path so it can make `preserveOnFailure` decisions on task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStrategy {
    Directory,
    Worktree,
    Container,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub strategy: WorkspaceStrategy,
    pub path: String,
    #[serde(default)]
    pub preserve_on_failure: Option<bool>,
}

impl Workspace {
    /// Evaluate whether the workspace should survive a task failure,
    /// per the precedence rule in the error-handling design: an explicit
    /// per-task flag wins, then a worktree-specific config default,
    /// then clean up.
    pub fn should_preserve_on_failure(&self, worktree_preserve_on_failure_config: bool) -> bool {
        if let Some(explicit) = self.preserve_on_failure {
            return explicit;
        }
        self.strategy == WorkspaceStrategy::Worktree && worktree_preserve_on_failure_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws(strategy: WorkspaceStrategy, preserve: Option<bool>) -> Workspace {
        Workspace {
            strategy,
            path: "/tmp/ws".into(),
            preserve_on_failure: preserve,
        }
    }

    #[test]
    fn explicit_flag_wins_over_config() {
        let w = ws(WorkspaceStrategy::Directory, Some(true));
        assert!(w.should_preserve_on_failure(false));
    }

    #[test]
    fn worktree_falls_back_to_config() {
        let w = ws(WorkspaceStrategy::Worktree, None);
        assert!(w.should_preserve_on_failure(true));
        assert!(!w.should_preserve_on_failure(false));
    }

    #[test]
    fn directory_without_explicit_flag_never_preserves() {
        let w = ws(WorkspaceStrategy::Directory, None);
        assert!(!w.should_preserve_on_failure(true));
    }

    #[test]
    fn explicit_false_overrides_worktree_config() {
        let w = ws(WorkspaceStrategy::Worktree, Some(false));
        assert!(!w.should_preserve_on_failure(true));
    }
}
