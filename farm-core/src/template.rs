//! Hook script templates
//!
//! A hook is an argument vector whose arguments may embed a fixed set of
//! `$__NAME__` placeholders. Templates are parsed once when the configuration
//! is validated; unknown placeholders are rejected there. Substitution is
//! literal and happens per argument after splitting, so substituted values are
//! never re-split or interpreted by a shell.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::exec::CommandSpec;
use crate::{Error, Result};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$__([A-Z0-9]+(?:_[A-Z0-9]+)*)__").expect("placeholder regex is valid")
});

/// Variables a hook template may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Derived path segment of the workspace
    RemoteBranchPath,
    /// Normalized remote branch name
    RemoteBranchName,
    /// Absolute workspace path
    ProjectFullpath,
    /// Id of the branch rule that matched
    BranchConfigName,
}

impl Placeholder {
    /// Every placeholder, for branch rule hooks
    pub const ALL: [Placeholder; 4] = [
        Placeholder::RemoteBranchPath,
        Placeholder::RemoteBranchName,
        Placeholder::ProjectFullpath,
        Placeholder::BranchConfigName,
    ];

    /// Placeholders available to repository bootstrap scripts
    pub const BOOTSTRAP: [Placeholder; 1] = [Placeholder::ProjectFullpath];

    /// Name as written between `$__` and `__`
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::RemoteBranchPath => "REMOTE_BRANCH_PATH",
            Placeholder::RemoteBranchName => "REMOTE_BRANCH_NAME",
            Placeholder::ProjectFullpath => "PROJECT_FULLPATH",
            Placeholder::BranchConfigName => "BRANCH_CONFIG_NAME",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$__{}__", self.name())
    }
}

/// A script as written in the configuration file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ScriptSpec {
    /// A command line, split on whitespace with quote handling
    Line(String),
    /// An explicit argument vector
    Argv(Vec<String>),
}

impl fmt::Display for ScriptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptSpec::Line(line) => write!(f, "{}", line),
            ScriptSpec::Argv(argv) => write!(f, "{}", argv.join(" ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(Placeholder),
}

/// Values substituted into a [`HookTemplate`]
#[derive(Debug, Clone, Default)]
pub struct HookVars {
    pub remote_branch_path: String,
    pub remote_branch_name: String,
    pub project_fullpath: String,
    pub branch_config_name: String,
}

impl HookVars {
    fn get(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::RemoteBranchPath => &self.remote_branch_path,
            Placeholder::RemoteBranchName => &self.remote_branch_name,
            Placeholder::ProjectFullpath => &self.project_fullpath,
            Placeholder::BranchConfigName => &self.branch_config_name,
        }
    }
}

/// A parsed hook command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTemplate {
    source: String,
    argv: Vec<Vec<Segment>>,
}

impl HookTemplate {
    /// Parse a script allowing every placeholder
    pub fn parse(script: &ScriptSpec) -> Result<Self> {
        Self::parse_with(script, &Placeholder::ALL)
    }

    /// Parse a script, rejecting placeholders outside `allowed`
    pub fn parse_with(script: &ScriptSpec, allowed: &[Placeholder]) -> Result<Self> {
        let words = match script {
            ScriptSpec::Line(line) => split_words(line)?,
            ScriptSpec::Argv(argv) => argv.clone(),
        };

        if words.is_empty() {
            return Err(Error::Config("Empty hook script".to_string()));
        }

        let argv = words
            .iter()
            .map(|word| parse_word(word, allowed))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: script.to_string(),
            argv,
        })
    }

    /// The script as written in the configuration
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Substitute placeholders, producing the argument vector
    pub fn render(&self, vars: &HookVars) -> Vec<String> {
        self.argv
            .iter()
            .map(|word| {
                word.iter()
                    .map(|segment| match segment {
                        Segment::Literal(text) => text.as_str(),
                        Segment::Var(p) => vars.get(*p),
                    })
                    .collect::<String>()
            })
            .collect()
    }

    /// Build the command to run this hook inside `workdir`
    pub fn command(&self, vars: &HookVars, workdir: &Path) -> CommandSpec {
        let mut argv = self.render(vars).into_iter();
        // parse() guarantees at least one word
        let program = argv.next().unwrap_or_default();
        CommandSpec::new(program, workdir).args(argv)
    }
}

fn parse_word(word: &str, allowed: &[Placeholder]) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(word) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let placeholder = Placeholder::from_name(name.as_str())
            .filter(|p| allowed.contains(p))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unknown placeholder '{}' in hook script argument '{}'",
                    whole.as_str(),
                    word
                ))
            })?;

        if whole.start() > last {
            segments.push(Segment::Literal(word[last..whole.start()].to_string()));
        }
        segments.push(Segment::Var(placeholder));
        last = whole.end();
    }

    if last < word.len() || segments.is_empty() {
        segments.push(Segment::Literal(word[last..].to_string()));
    }

    Ok(segments)
}

/// Split a command line into words
///
/// Whitespace separates words; single quotes preserve everything literally,
/// double quotes allow `\"` and `\\` escapes, and a backslash outside quotes
/// escapes the next character. No other shell syntax is recognised.
fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err(unterminated(line)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\')) => current.push(c),
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err(unterminated(line)),
                        },
                        Some(c) => current.push(c),
                        None => return Err(unterminated(line)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    current.push(c);
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }

    Ok(words)
}

fn unterminated(line: &str) -> Error {
    Error::Config(format!("Unterminated quote in hook script: {}", line))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HookVars {
        HookVars {
            remote_branch_path: "login".to_string(),
            remote_branch_name: "feature/login".to_string(),
            project_fullpath: "/work/features/login".to_string(),
            branch_config_name: "features".to_string(),
        }
    }

    #[test]
    fn test_render_all_placeholders() {
        let script = ScriptSpec::Line(
            "deploy $__REMOTE_BRANCH_PATH__ $__REMOTE_BRANCH_NAME__ $__PROJECT_FULLPATH__ $__BRANCH_CONFIG_NAME__"
                .to_string(),
        );
        let template = HookTemplate::parse(&script).unwrap();
        assert_eq!(
            template.render(&vars()),
            vec![
                "deploy",
                "login",
                "feature/login",
                "/work/features/login",
                "features"
            ]
        );
    }

    #[test]
    fn test_placeholder_inside_word() {
        let script = ScriptSpec::Line("docker build -t app:$__REMOTE_BRANCH_PATH__-latest .".to_string());
        let template = HookTemplate::parse(&script).unwrap();
        assert_eq!(
            template.render(&vars()),
            vec!["docker", "build", "-t", "app:login-latest", "."]
        );
    }

    #[test]
    fn test_substituted_value_is_not_split() {
        let script = ScriptSpec::Line("echo $__REMOTE_BRANCH_NAME__".to_string());
        let template = HookTemplate::parse(&script).unwrap();
        let mut v = vars();
        v.remote_branch_name = "a b; rm -rf /".to_string();
        assert_eq!(template.render(&v), vec!["echo", "a b; rm -rf /"]);
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let script = ScriptSpec::Line("echo $__REMOTE_BRANCH__".to_string());
        let err = HookTemplate::parse(&script).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("$__REMOTE_BRANCH__"));
    }

    #[test]
    fn test_bootstrap_rejects_branch_placeholders() {
        let script = ScriptSpec::Line("echo $__REMOTE_BRANCH_NAME__".to_string());
        assert!(HookTemplate::parse_with(&script, &Placeholder::BOOTSTRAP).is_err());

        let script = ScriptSpec::Line("make -C $__PROJECT_FULLPATH__".to_string());
        assert!(HookTemplate::parse_with(&script, &Placeholder::BOOTSTRAP).is_ok());
    }

    #[test]
    fn test_plain_dollar_text_is_literal() {
        let script = ScriptSpec::Line("echo $HOME $__lower__".to_string());
        let template = HookTemplate::parse(&script).unwrap();
        assert_eq!(template.render(&vars()), vec!["echo", "$HOME", "$__lower__"]);
    }

    #[test]
    fn test_quotes() {
        let words = split_words(r#"sh -c 'echo "hi there"' "a \"b\"" c\ d"#).unwrap();
        assert_eq!(words, vec!["sh", "-c", "echo \"hi there\"", "a \"b\"", "c d"]);
    }

    #[test]
    fn test_empty_quotes_make_empty_word() {
        let words = split_words("printf '' x").unwrap();
        assert_eq!(words, vec!["printf", "", "x"]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(split_words("echo 'oops").is_err());
    }

    #[test]
    fn test_argv_form() {
        let script = ScriptSpec::Argv(vec![
            "npm".to_string(),
            "run".to_string(),
            "preview -- $__REMOTE_BRANCH_PATH__".to_string(),
        ]);
        let template = HookTemplate::parse(&script).unwrap();
        assert_eq!(
            template.render(&vars()),
            vec!["npm", "run", "preview -- login"]
        );
    }

    #[test]
    fn test_empty_script_rejected() {
        assert!(HookTemplate::parse(&ScriptSpec::Line("   ".to_string())).is_err());
        assert!(HookTemplate::parse(&ScriptSpec::Argv(vec![])).is_err());
    }

    #[test]
    fn test_command_spec() {
        let script = ScriptSpec::Line("make preview".to_string());
        let template = HookTemplate::parse(&script).unwrap();
        let spec = template.command(&vars(), Path::new("/work/features/login"));
        assert_eq!(spec.program, "make");
        assert_eq!(spec.args, vec!["preview"]);
        assert_eq!(spec.cwd, Path::new("/work/features/login"));
    }
}
