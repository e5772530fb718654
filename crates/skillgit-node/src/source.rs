//! Where skill content comes from.
//!
//! The server never stores repositories; every request looks the skill up
//! here and synthesizes its repository from scratch.

use parking_lot::RwLock;
use skillgit_git::PRIMARY_FILE_NAME;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

/// The content of one skill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skill {
    /// Identifier used in URLs and as the commit message.
    pub identifier: String,
    /// Content of `SKILL.md`.
    pub primary: String,
    /// Other files keyed by `/`-separated relative path.
    pub files: BTreeMap<String, String>,
    /// Paths of `files` committed with mode `100755`.
    pub executables: BTreeSet<String>,
    /// Commit time; `None` uses the reproducible default.
    pub timestamp: Option<i64>,
}

impl Skill {
    /// Creates a skill with only primary content.
    pub fn new(identifier: impl Into<String>, primary: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            primary: primary.into(),
            files: BTreeMap::new(),
            executables: BTreeSet::new(),
            timestamp: None,
        }
    }

    /// Adds an additional file.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Adds an additional file with the executable bit set.
    pub fn with_executable(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        self.executables.insert(path.clone());
        self.files.insert(path, content.into());
        self
    }
}

/// Lookup of skill content by identifier.
pub trait SkillSource: Send + Sync {
    /// Returns the skill, if it exists.
    fn get(&self, identifier: &str) -> Option<Skill>;

    /// Number of skills available.
    fn len(&self) -> usize;

    /// Returns true if no skill is available.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory skill source.
#[derive(Debug, Default)]
pub struct MemorySkillSource {
    skills: RwLock<HashMap<String, Skill>>,
}

impl MemorySkillSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a skill.
    pub fn insert(&self, skill: Skill) {
        self.skills.write().insert(skill.identifier.clone(), skill);
    }

    /// Loads every subdirectory of `root` holding a `SKILL.md` as a skill.
    ///
    /// With `use_file_timestamps`, the commit time is the newest
    /// modification time among the skill's files.
    pub fn load_dir(root: &Path, use_file_timestamps: bool) -> std::io::Result<Self> {
        let source = Self::new();

        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let identifier = entry.file_name().to_string_lossy().into_owned();
            if identifier.starts_with('.') {
                continue;
            }

            match load_skill(&entry.path(), &identifier, use_file_timestamps)? {
                Some(skill) => source.insert(skill),
                None => tracing::warn!(
                    skill = %identifier,
                    "Skipping directory without {}",
                    PRIMARY_FILE_NAME
                ),
            }
        }

        tracing::info!(root = %root.display(), skills = source.len(), "Loaded skills");
        Ok(source)
    }
}

impl SkillSource for MemorySkillSource {
    fn get(&self, identifier: &str) -> Option<Skill> {
        self.skills.read().get(identifier).cloned()
    }

    fn len(&self) -> usize {
        self.skills.read().len()
    }
}

fn load_skill(dir: &Path, identifier: &str, use_file_timestamps: bool) -> std::io::Result<Option<Skill>> {
    let primary_path = dir.join(PRIMARY_FILE_NAME);
    if !primary_path.is_file() {
        return Ok(None);
    }

    let mut skill = Skill::new(identifier, std::fs::read_to_string(&primary_path)?);
    let mut newest = None;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(std::io::Error::other)?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        newest = newest.max(Some(modified));

        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if path == PRIMARY_FILE_NAME {
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(content) => {
                if is_executable(&metadata) {
                    skill.executables.insert(path.clone());
                }
                skill.files.insert(path, content);
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                tracing::warn!(skill = %identifier, path = %path, "Skipping non-UTF-8 file");
            }
            Err(e) => return Err(e),
        }
    }

    if use_file_timestamps {
        skill.timestamp = newest;
    }

    Ok(Some(skill))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}
