//! Branch rules and matching of remote branch names against them

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::template::HookTemplate;
use crate::{Error, Result};

/// A validated branch rule
#[derive(Debug, Clone)]
pub struct BranchRule {
    /// Rule id (its key in the configuration)
    pub id: String,
    /// Pattern as written in the configuration
    pub pattern: String,
    /// Directory under which matched branches are materialized
    pub holder_path: PathBuf,
    /// Hooks run after every sync of a workspace
    pub scripts: Vec<HookTemplate>,
    regex: Regex,
}

impl BranchRule {
    /// Compile a rule, rejecting patterns with more than one capturing group
    pub fn new(
        id: impl Into<String>,
        pattern: &str,
        holder_path: impl Into<PathBuf>,
        scripts: Vec<HookTemplate>,
    ) -> Result<Self> {
        let id = id.into();

        // Anchor at the start only; a pattern may match a prefix of the name.
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            Error::Config(format!("Invalid pattern for branch rule '{}': {}", id, e))
        })?;

        let groups = regex.captures_len() - 1;
        if groups > 1 {
            return Err(Error::Config(format!(
                "Pattern '{}' for branch rule '{}' has {} capturing groups; at most one is allowed",
                pattern, id, groups
            )));
        }

        Ok(Self {
            id,
            pattern: pattern.to_string(),
            holder_path: holder_path.into(),
            scripts,
            regex,
        })
    }

    /// Whether the pattern has a capturing group
    pub fn has_group(&self) -> bool {
        self.regex.captures_len() > 1
    }

    /// Match a branch name, returning the derived path segment
    pub fn segment_for(&self, branch_name: &str) -> Option<String> {
        let caps = self.regex.captures(branch_name)?;
        let segment = caps.get(1).or_else(|| caps.get(0))?;
        Some(segment.as_str().to_string())
    }

    /// Resolve the workspace path for a path segment
    ///
    /// A segment equal to the holder's own directory name (or an empty one)
    /// deploys into the holder itself.
    pub fn workspace_path(&self, segment: &str) -> PathBuf {
        workspace_path(&self.holder_path, segment)
    }
}

/// Join a holder directory and a path segment
pub fn workspace_path(holder: &Path, segment: &str) -> PathBuf {
    let shares_holder = segment.is_empty()
        || holder
            .file_name()
            .is_some_and(|name| name.to_str() == Some(segment));

    if shares_holder {
        holder.to_path_buf()
    } else {
        holder.join(segment)
    }
}

/// A remote branch matched by a branch rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchMatch {
    /// Id of the rule that matched
    pub rule_id: String,
    /// Path segment derived from the pattern
    pub path_segment: String,
    /// Normalized remote branch name
    pub remote_branch_name: String,
}

/// Match a branch name against every rule, in rule order
///
/// A name may match any number of rules; each match is returned.
pub fn match_branch(branch_name: &str, rules: &[BranchRule]) -> Vec<BranchMatch> {
    rules
        .iter()
        .filter_map(|rule| {
            rule.segment_for(branch_name).map(|path_segment| BranchMatch {
                rule_id: rule.id.clone(),
                path_segment,
                remote_branch_name: branch_name.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, pattern: &str, holder: &str) -> BranchRule {
        BranchRule::new(id, pattern, holder, Vec::new()).unwrap()
    }

    #[test]
    fn test_no_group_uses_full_match() {
        let r = rule("release", r"release-\d+\.\d+", "/work/releases");
        assert_eq!(r.segment_for("release-1.2").as_deref(), Some("release-1.2"));
    }

    #[test]
    fn test_group_uses_capture() {
        let r = rule("features", "^feature/(.+)$", "/work/features");
        assert_eq!(r.segment_for("feature/login").as_deref(), Some("login"));
    }

    #[test]
    fn test_prefix_anchored() {
        let r = rule("features", "feature/", "/work/features");
        assert_eq!(r.segment_for("feature/login").as_deref(), Some("feature/"));
        assert_eq!(r.segment_for("old-feature/login"), None);
    }

    #[test]
    fn test_full_match_is_prefix_only() {
        let r = rule("hotfix", r"hotfix-\d+", "/work/hotfix");
        assert_eq!(r.segment_for("hotfix-12-urgent").as_deref(), Some("hotfix-12"));
    }

    #[test]
    fn test_alternation_is_anchored_as_a_whole() {
        let r = rule("main", "main|master", "/work/main");
        assert!(r.segment_for("master").is_some());
        assert!(r.segment_for("not-master").is_none());
    }

    #[test]
    fn test_unparticipating_group_falls_back_to_full_match() {
        let r = rule("opt", "dev(-x)?", "/work/dev");
        assert_eq!(r.segment_for("dev").as_deref(), Some("dev"));
        assert_eq!(r.segment_for("dev-x").as_deref(), Some("-x"));
    }

    #[test]
    fn test_two_groups_rejected() {
        let err = BranchRule::new("bad", "(a)/(b)", "/work", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_non_capturing_groups_allowed() {
        let r = rule("ok", "(?:feature|bugfix)/(.+)", "/work/x");
        assert!(r.has_group());
        assert_eq!(r.segment_for("bugfix/crash").as_deref(), Some("crash"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        assert!(BranchRule::new("bad", "feature/(", "/work", Vec::new()).is_err());
    }

    #[test]
    fn test_match_returns_one_entry_per_matching_rule() {
        let rules = vec![
            rule("features", "feature/(.+)", "/work/features"),
            rule("all", "(.+)", "/work/all"),
            rule("releases", "release/(.+)", "/work/releases"),
        ];

        let matches = match_branch("feature/a", &rules);
        assert_eq!(
            matches,
            vec![
                BranchMatch {
                    rule_id: "features".to_string(),
                    path_segment: "a".to_string(),
                    remote_branch_name: "feature/a".to_string(),
                },
                BranchMatch {
                    rule_id: "all".to_string(),
                    path_segment: "feature/a".to_string(),
                    remote_branch_name: "feature/a".to_string(),
                },
            ]
        );

        assert!(match_branch("main", &rules[..1]).is_empty());
    }

    #[test]
    fn test_workspace_path_joins_segment() {
        let r = rule("features", "feature/(.+)", "/work/features");
        assert_eq!(r.workspace_path("login"), PathBuf::from("/work/features/login"));
    }

    #[test]
    fn test_workspace_path_shares_holder() {
        let r = rule("main", "(main)", "/work/main");
        assert_eq!(r.workspace_path("main"), PathBuf::from("/work/main"));
        assert_eq!(r.workspace_path(""), PathBuf::from("/work/main"));
    }
}
