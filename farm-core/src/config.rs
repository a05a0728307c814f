//! Configuration management for branchfarm
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (BRANCHFARM_*)
//! 3. Config file (~/.config/branchfarm/config.toml, or config.yml / config.yaml)
//! 4. Default values
//!
//! The file is deserialized into [`Config`], which mirrors the document as
//! written. [`Config::validate`] turns it into a [`Farm`]: compiled patterns,
//! parsed hook templates and absolute paths. Every structural problem is
//! reported there, before any repository is touched.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::matcher::BranchRule;
use crate::template::{HookTemplate, Placeholder, ScriptSpec};
use crate::{Error, Result};

/// File names looked up in the config directory, in order
const CONFIG_FILE_NAMES: [&str; 3] = ["config.toml", "config.yml", "config.yaml"];

/// Run-wide settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the remote whose branches are mirrored
    pub remote: String,

    /// Timeout for each git invocation
    #[serde(with = "humantime_serde")]
    pub git_timeout: Duration,

    /// Timeout for each hook script
    #[serde(with = "humantime_serde")]
    pub hook_timeout: Duration,

    /// How many repositories are synchronized at once
    pub max_parallel_repositories: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            git_timeout: Duration::from_secs(10 * 60),
            hook_timeout: Duration::from_secs(30 * 60),
            max_parallel_repositories: 4,
        }
    }
}

/// A branch rule as written in the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BranchRuleConfig {
    /// Rule id, taken from the map key
    #[serde(skip)]
    pub id: String,

    /// Regular expression, at most one capturing group
    pub pattern: String,

    /// Holder directory for matched branches
    pub path: PathBuf,

    /// Hook scripts run after each sync
    #[serde(default)]
    pub scripts: Vec<ScriptSpec>,
}

/// A repository as written in the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryConfig {
    /// Repository id, taken from the map key
    #[serde(skip)]
    pub id: String,

    /// Clone URL
    pub repo_url: String,

    /// Root checkout used to list remote branches
    #[serde(alias = "project")]
    pub base_project_path: PathBuf,

    /// Scripts run once after the root checkout is first cloned
    #[serde(default)]
    pub scripts: Vec<ScriptSpec>,

    /// Branch rules, in document order
    #[serde(default, deserialize_with = "named_entries")]
    pub branches: Vec<BranchRuleConfig>,
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run-wide settings
    pub settings: Settings,

    /// Repositories, in document order
    #[serde(deserialize_with = "named_entries")]
    pub repositories: Vec<RepositoryConfig>,

    /// File this configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

/// Entries of a map keyed by id
trait Named {
    fn set_id(&mut self, id: String);
}

impl Named for RepositoryConfig {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Named for BranchRuleConfig {
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Deserialize a map into a `Vec`, keeping document order and storing each
/// key as the entry's id
fn named_entries<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Named,
{
    struct NamedVisitor<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for NamedVisitor<T>
    where
        T: Deserialize<'de> + Named,
    {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of named entries")
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((id, mut entry)) = map.next_entry::<String, T>()? {
                entry.set_id(id);
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(NamedVisitor(PhantomData))
}

/// A validated repository
#[derive(Debug, Clone)]
pub struct Repository {
    /// Repository id
    pub id: String,
    /// Clone URL
    pub repo_url: String,
    /// Absolute root checkout path
    pub base_project_path: PathBuf,
    /// Bootstrap scripts
    pub scripts: Vec<HookTemplate>,
    /// Branch rules, in document order
    pub rules: Vec<BranchRule>,
}

impl Repository {
    /// Look up a rule by id
    pub fn rule(&self, id: &str) -> Option<&BranchRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// A validated configuration, ready to run
#[derive(Debug, Clone)]
pub struct Farm {
    /// Run-wide settings
    pub settings: Settings,
    /// Repositories, in document order
    pub repositories: Vec<Repository>,
}

impl Farm {
    /// Keep only the repositories whose id is in `ids` (all when empty)
    pub fn retain_repositories(mut self, ids: &[String]) -> Result<Self> {
        if ids.is_empty() {
            return Ok(self);
        }

        if let Some(unknown) = ids
            .iter()
            .find(|id| !self.repositories.iter().any(|r| &r.id == *id))
        {
            return Err(Error::Config(format!("Unknown repository '{}'", unknown)));
        }

        self.repositories.retain(|r| ids.contains(&r.id));
        Ok(self)
    }
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if no file exists
    pub fn load() -> Result<Self> {
        match Self::find_default_config() {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    ///
    /// `.yml` / `.yaml` files are parsed as YAML, everything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        let mut config = Self::parse(&contents, path)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"));

        if is_yaml {
            serde_yaml::from_str(contents)
                .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
        } else {
            toml::from_str(contents)
                .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
        }
    }

    /// Get the default config directory
    ///
    /// Returns `~/.config/branchfarm` on Unix
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("branchfarm"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|p| p.join(CONFIG_FILE_NAMES[0]))
    }

    /// First existing config file in the default config directory
    pub fn find_default_config() -> Option<PathBuf> {
        let dir = Self::default_config_dir()?;
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - BRANCHFARM_REMOTE: remote name
    /// - BRANCHFARM_GIT_TIMEOUT: timeout per git command (e.g. "5m")
    /// - BRANCHFARM_HOOK_TIMEOUT: timeout per hook script
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(remote) = std::env::var("BRANCHFARM_REMOTE") {
            self.settings.remote = remote;
        }

        if let Ok(value) = std::env::var("BRANCHFARM_GIT_TIMEOUT") {
            self.settings.git_timeout = parse_duration("BRANCHFARM_GIT_TIMEOUT", &value)?;
        }

        if let Ok(value) = std::env::var("BRANCHFARM_HOOK_TIMEOUT") {
            self.settings.hook_timeout = parse_duration("BRANCHFARM_HOOK_TIMEOUT", &value)?;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, jobs: Option<usize>) -> Self {
        if let Some(jobs) = jobs {
            self.settings.max_parallel_repositories = jobs;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(path: Option<&Path>, jobs: Option<usize>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };

        Ok(config.with_env_overrides()?.with_cli_overrides(jobs))
    }

    /// Directory relative paths are resolved against
    fn base_dir(&self) -> Result<PathBuf> {
        match self.source.as_deref().and_then(Path::parent) {
            Some(dir) if !dir.as_os_str().is_empty() => Ok(absolutize(dir, &std::env::current_dir()?)),
            _ => Ok(std::env::current_dir()?),
        }
    }

    /// Check the configuration and compile it into a [`Farm`]
    pub fn validate(&self) -> Result<Farm> {
        let base_dir = self.base_dir()?;
        let mut settings = self.settings.clone();
        if settings.max_parallel_repositories == 0 {
            settings.max_parallel_repositories = 1;
        }

        let mut roots: HashMap<PathBuf, &str> = HashMap::new();
        let mut repositories = Vec::with_capacity(self.repositories.len());

        for repo in &self.repositories {
            if repo.repo_url.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Repository '{}' has an empty repo_url",
                    repo.id
                )));
            }

            let base_project_path = absolutize(&repo.base_project_path, &base_dir);
            if let Some(other) = roots.insert(base_project_path.clone(), &repo.id) {
                return Err(Error::Config(format!(
                    "Repositories '{}' and '{}' share base_project_path {}",
                    other,
                    repo.id,
                    base_project_path.display()
                )));
            }

            let scripts = repo
                .scripts
                .iter()
                .map(|s| HookTemplate::parse_with(s, &Placeholder::BOOTSTRAP))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| in_context(e, &format!("repository '{}'", repo.id)))?;

            let mut rules: Vec<BranchRule> = Vec::with_capacity(repo.branches.len());
            for rule in &repo.branches {
                if rules.iter().any(|r| r.id == rule.id) {
                    return Err(Error::Config(format!(
                        "Repository '{}' defines branch rule '{}' twice",
                        repo.id, rule.id
                    )));
                }

                let holder_path = absolutize(&rule.path, &base_dir);

                let context = format!("branch rule '{}' of repository '{}'", rule.id, repo.id);
                let templates = rule
                    .scripts
                    .iter()
                    .map(HookTemplate::parse)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| in_context(e, &context))?;

                rules.push(BranchRule::new(&rule.id, &rule.pattern, holder_path, templates)?);
            }

            repositories.push(Repository {
                id: repo.id.clone(),
                repo_url: repo.repo_url.clone(),
                base_project_path,
                scripts,
                rules,
            });
        }

        check_holder_overlaps(&repositories)?;

        Ok(Farm {
            settings,
            repositories,
        })
    }
}

/// Reject a holder that equals, contains or sits inside a holder or base
/// checkout of another repository
///
/// A repository prunes everything under its holders that its own run did
/// not deploy, so another repository's holder or base checkout in there
/// would be deleted.
fn check_holder_overlaps(repositories: &[Repository]) -> Result<()> {
    for repo in repositories {
        for rule in &repo.rules {
            let holder = &rule.holder_path;

            for other in repositories.iter().filter(|o| o.id != repo.id) {
                let owned = other
                    .rules
                    .iter()
                    .map(|r| ("holder path", &r.holder_path))
                    .chain(std::iter::once(("base_project_path", &other.base_project_path)));

                for (kind, path) in owned {
                    if path.starts_with(holder) || holder.starts_with(path) {
                        return Err(Error::Config(format!(
                            "Holder path {} of repository '{}' overlaps {} {} of repository '{}'",
                            holder.display(),
                            repo.id,
                            kind,
                            path.display(),
                            other.id
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn in_context(err: Error, context: &str) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("{} in {}", msg, context)),
        other => other,
    }
}

fn parse_duration(var: &str, value: &str) -> Result<Duration> {
    humantime_serde::re::humantime::parse_duration(value)
        .map_err(|e| Error::Config(format!("Invalid duration in {}: {}", var, e)))
}

/// Make `path` absolute: expands a leading `~` and joins relative paths
/// onto `base`
fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let expanded = match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    };

    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
