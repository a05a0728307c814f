//! Parsing of `git branch -r` output into normalized branch names

use std::collections::BTreeSet;

/// Normalize the lines printed by `git branch -r` / `git branch -a`
///
/// Keeps only branches of `remote`: strips whitespace, the `*` marker, a
/// `remotes/` prefix and the `<remote>/` prefix, and drops every line without
/// that prefix (local branches and other remotes). Symbolic refs
/// (`origin/HEAD -> origin/main`) are dropped; duplicates collapse.
pub fn normalize_branch_listing(output: &str, remote: &str) -> BTreeSet<String> {
    let remote_prefix = format!("{}/", remote);

    output
        .lines()
        .filter(|line| !line.contains("->"))
        .filter_map(|line| {
            let name: String = line
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '*')
                .collect();
            let name = name.strip_prefix("remotes/").unwrap_or(&name);
            let name = name.strip_prefix(&remote_prefix)?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}
