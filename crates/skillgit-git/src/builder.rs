//! Builds a minimal commit graph from in-memory content.
//!
//! Objects are created strictly in dependency order (blobs, then trees,
//! then the commit) and kept in a map keyed by their content hash.

use crate::object::{EntryMode, GitObject, ObjectId, ObjectType, TreeEntry};
use crate::{GitError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the blob holding the primary content at the root of the tree.
pub const PRIMARY_FILE_NAME: &str = "SKILL.md";
/// The only branch.
pub const MAIN_REF: &str = "refs/heads/main";
/// Symbolic HEAD.
pub const HEAD_REF: &str = "HEAD";
/// Commit time used by [`create_git_pack`] (2023-11-14T22:13:20Z).
pub const DEFAULT_COMMIT_TIMESTAMP: i64 = 1_700_000_000;

/// Author and committer identity written into commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Signature {
    /// Creates a new signature.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    fn format(&self, timestamp: i64) -> String {
        format!("{} <{}> {} +0000", self.name, self.email, timestamp)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self::new("skillgit", "skillgit@localhost")
    }
}

/// A synthesized single-branch repository.
#[derive(Debug, Clone)]
pub struct GitPack {
    /// Every object of the repository, keyed by id.
    pub objects: HashMap<ObjectId, GitObject>,
    /// `HEAD` and `refs/heads/main`, both at `head_commit`.
    pub refs: BTreeMap<String, ObjectId>,
    /// The single commit.
    pub head_commit: ObjectId,
}

impl GitPack {
    /// Number of objects in the repository.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the repository holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Accumulates objects for one repository.
#[derive(Debug, Default)]
pub struct ObjectBuilder {
    objects: HashMap<ObjectId, GitObject>,
    referenced: HashSet<ObjectId>,
    signature: Signature,
}

impl ObjectBuilder {
    /// Creates an empty builder with the default signature.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `signature` as author and committer of every commit.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Objects created so far.
    pub fn objects(&self) -> &HashMap<ObjectId, GitObject> {
        &self.objects
    }

    fn store(&mut self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId> {
        let object = GitObject::new(object_type, content)?;
        let id = object.id;
        self.objects.entry(id).or_insert(object);
        Ok(id)
    }

    /// Stores `content` as a blob. Content is hashed byte for byte; no
    /// newline conversion happens here.
    pub fn create_blob(&mut self, content: impl AsRef<[u8]>) -> Result<ObjectId> {
        self.store(ObjectType::Blob, content.as_ref())
    }

    /// Stores a tree made of `entries`, sorted by name.
    pub fn create_tree(&mut self, mut entries: Vec<TreeEntry>) -> Result<ObjectId> {
        let mut names = HashSet::with_capacity(entries.len());
        for entry in &entries {
            validate_segment(&entry.name).map_err(GitError::InvalidTreeEntry)?;
            if !names.insert(entry.name.as_str()) {
                return Err(GitError::InvalidTreeEntry(format!(
                    "duplicate name: {}",
                    entry.name
                )));
            }
        }

        entries.sort_by(|a, b| a.git_cmp(b));

        let mut content = Vec::with_capacity(entries.len() * 48);
        for entry in &entries {
            entry.encode_into(&mut content);
        }
        self.referenced.extend(entries.iter().map(|e| e.id));

        self.store(ObjectType::Tree, &content)
    }

    /// Stores a root commit of `tree`. `timestamp` defaults to now.
    pub fn create_commit(
        &mut self,
        tree: ObjectId,
        message: &str,
        timestamp: Option<i64>,
    ) -> Result<ObjectId> {
        let timestamp = timestamp.unwrap_or_else(now);
        let signature = self.signature.format(timestamp);
        let content = [
            format!("tree {}", tree),
            format!("author {}", signature),
            format!("committer {}", signature),
            String::new(),
            message.to_string(),
        ]
        .join("\n");

        self.referenced.insert(tree);
        self.store(ObjectType::Commit, content.as_bytes())
    }

    /// Finishes the repository with both refs pointing at `head`.
    ///
    /// Fails if any tree entry or commit references an object that was
    /// never created.
    pub fn finish(self, head: ObjectId) -> Result<GitPack> {
        if let Some(missing) = self
            .referenced
            .iter()
            .chain(std::iter::once(&head))
            .find(|id| !self.objects.contains_key(*id))
        {
            return Err(GitError::InvalidObject(format!(
                "referenced object {} was never created",
                missing
            )));
        }

        let refs = BTreeMap::from([(HEAD_REF.to_string(), head), (MAIN_REF.to_string(), head)]);

        Ok(GitPack {
            objects: self.objects,
            refs,
            head_commit: head,
        })
    }
}

/// Builds the repository for one skill with a reproducible commit time.
///
/// `additional_files` maps `/`-separated paths to file content; paths with
/// directories produce nested trees.
pub fn create_git_pack(
    identifier: &str,
    primary_content: &str,
    additional_files: Option<&BTreeMap<String, String>>,
) -> Result<GitPack> {
    create_git_pack_at(
        identifier,
        primary_content,
        additional_files,
        &BTreeSet::new(),
        DEFAULT_COMMIT_TIMESTAMP,
    )
}

/// Like [`create_git_pack`] with an explicit commit timestamp.
///
/// Paths of `additional_files` listed in `executables` get mode `100755`;
/// entries naming no additional file are ignored.
pub fn create_git_pack_at(
    identifier: &str,
    primary_content: &str,
    additional_files: Option<&BTreeMap<String, String>>,
    executables: &BTreeSet<String>,
    timestamp: i64,
) -> Result<GitPack> {
    let mut builder = ObjectBuilder::new();
    let mut root = Dir::default();

    let primary = builder.create_blob(primary_content)?;
    root.insert(&[PRIMARY_FILE_NAME], primary, EntryMode::Regular, PRIMARY_FILE_NAME)?;

    for (path, content) in additional_files.into_iter().flatten() {
        let segments: Vec<&str> = path.split('/').collect();
        for segment in &segments {
            validate_segment(segment)
                .map_err(|reason| GitError::InvalidPath(format!("{}: {}", path, reason)))?;
        }
        let blob = builder.create_blob(content)?;
        let mode = if executables.contains(path) {
            EntryMode::Executable
        } else {
            EntryMode::Regular
        };
        root.insert(&segments, blob, mode, path)?;
    }

    let tree = root.write(&mut builder)?;
    let commit = builder.create_commit(tree, &format!("{}\n", identifier), Some(timestamp))?;
    let pack = builder.finish(commit)?;

    tracing::debug!(
        identifier,
        objects = pack.len(),
        head = %pack.head_commit,
        "built git pack"
    );

    Ok(pack)
}

/// In-progress directory used to lay out nested paths.
#[derive(Default)]
struct Dir {
    children: BTreeMap<String, Node>,
}

enum Node {
    File(ObjectId, EntryMode),
    Dir(Dir),
}

impl Dir {
    fn insert(&mut self, segments: &[&str], blob: ObjectId, mode: EntryMode, path: &str) -> Result<()> {
        let conflict = || GitError::InvalidPath(format!("{}: conflicts with another path", path));

        match segments {
            [] => Err(GitError::InvalidPath("empty path".to_string())),
            [name] => {
                if self.children.contains_key(*name) {
                    return Err(conflict());
                }
                self.children.insert(name.to_string(), Node::File(blob, mode));
                Ok(())
            }
            [name, rest @ ..] => {
                let child = self
                    .children
                    .entry(name.to_string())
                    .or_insert_with(|| Node::Dir(Dir::default()));
                match child {
                    Node::Dir(dir) => dir.insert(rest, blob, mode, path),
                    Node::File(..) => Err(conflict()),
                }
            }
        }
    }

    fn write(self, builder: &mut ObjectBuilder) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.children.len());
        for (name, node) in self.children {
            let entry = match node {
                Node::File(id, mode) => TreeEntry::new(mode, name, id),
                Node::Dir(dir) => TreeEntry::new(EntryMode::Directory, name, dir.write(builder)?),
            };
            entries.push(entry);
        }
        builder.create_tree(entries)
    }
}

fn validate_segment(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        Err("empty name".to_string())
    } else if name == "." || name == ".." {
        Err(format!("reserved name: {}", name))
    } else if name.contains('/') || name.contains('\0') {
        Err(format!("name contains '/' or NUL: {:?}", name))
    } else {
        Ok(())
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_sha(s: &str) -> bool {
        s.len() == 40 && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn test_create_blob_is_content_addressed() {
        let mut builder = ObjectBuilder::new();
        let a = builder.create_blob("same").unwrap();
        let b = builder.create_blob("same").unwrap();
        let c = builder.create_blob("other").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(builder.objects().len(), 2);
    }

    #[test]
    fn test_create_tree_sorts_entries() {
        let mut builder = ObjectBuilder::new();
        let blob_a = builder.create_blob("a").unwrap();
        let blob_b = builder.create_blob("b").unwrap();

        let tree = builder
            .create_tree(vec![
                TreeEntry::new(EntryMode::Regular, "b", blob_b),
                TreeEntry::new(EntryMode::Regular, "a", blob_a),
            ])
            .unwrap();

        let content = builder.objects()[&tree].content().unwrap();
        let pos_a = content.windows(9).position(|w| w == b"100644 a\0").unwrap();
        let pos_b = content.windows(9).position(|w| w == b"100644 b\0").unwrap();
        assert!(pos_a < pos_b);

        // Raw id bytes follow each name.
        assert_eq!(&content[pos_a + 9..pos_a + 29], blob_a.as_bytes());
    }

    #[test]
    fn test_create_tree_order_independent() {
        let mut builder = ObjectBuilder::new();
        let x = builder.create_blob("x").unwrap();
        let y = builder.create_blob("y").unwrap();

        let first = builder
            .create_tree(vec![
                TreeEntry::new(EntryMode::Regular, "x", x),
                TreeEntry::new(EntryMode::Executable, "y", y),
            ])
            .unwrap();
        let second = builder
            .create_tree(vec![
                TreeEntry::new(EntryMode::Executable, "y", y),
                TreeEntry::new(EntryMode::Regular, "x", x),
            ])
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_create_tree_known_hash() {
        let mut builder = ObjectBuilder::new();
        let blob = builder.create_blob("hello\n").unwrap();
        let tree = builder
            .create_tree(vec![TreeEntry::new(EntryMode::Regular, "hello.txt", blob)])
            .unwrap();

        // `git write-tree` for a repository containing only hello.txt
        assert_eq!(tree.to_hex(), "aaa96ced2d9a1c8e72c56b253a0e2fe78393feb7");
    }

    #[test]
    fn test_create_tree_rejects_bad_names() {
        let mut builder = ObjectBuilder::new();
        let blob = builder.create_blob("x").unwrap();

        for name in ["", ".", "..", "a/b", "nul\0"] {
            let result = builder.create_tree(vec![TreeEntry::new(EntryMode::Regular, name, blob)]);
            assert!(matches!(result, Err(GitError::InvalidTreeEntry(_))), "{:?}", name);
        }

        let duplicate = builder.create_tree(vec![
            TreeEntry::new(EntryMode::Regular, "a", blob),
            TreeEntry::new(EntryMode::Executable, "a", blob),
        ]);
        assert!(matches!(duplicate, Err(GitError::InvalidTreeEntry(_))));
    }

    #[test]
    fn test_create_commit_format() {
        let mut builder = ObjectBuilder::new().with_signature(Signature::new("Bot", "bot@example.com"));
        let blob = builder.create_blob("x").unwrap();
        let tree = builder
            .create_tree(vec![TreeEntry::new(EntryMode::Regular, "x", blob)])
            .unwrap();
        let commit = builder.create_commit(tree, "hello\n", Some(1234567890)).unwrap();

        let content = builder.objects()[&commit].content().unwrap();
        let expected = format!(
            "tree {}\nauthor Bot <bot@example.com> 1234567890 +0000\ncommitter Bot <bot@example.com> 1234567890 +0000\n\nhello\n",
            tree
        );
        assert_eq!(String::from_utf8(content).unwrap(), expected);
    }

    #[test]
    fn test_create_commit_defaults_to_now() {
        let mut builder = ObjectBuilder::new();
        let blob = builder.create_blob("x").unwrap();
        let tree = builder
            .create_tree(vec![TreeEntry::new(EntryMode::Regular, "x", blob)])
            .unwrap();
        let before = now();
        let commit = builder.create_commit(tree, "msg", None).unwrap();

        let content = String::from_utf8(builder.objects()[&commit].content().unwrap()).unwrap();
        let author = content.lines().nth(1).unwrap();
        let ts: i64 = author.split(' ').rev().nth(1).unwrap().parse().unwrap();
        assert!(ts >= before);
    }

    #[test]
    fn test_finish_rejects_dangling_reference() {
        let mut builder = ObjectBuilder::new();
        let ghost = ObjectId::from_bytes([7u8; 20]);
        let tree = builder
            .create_tree(vec![TreeEntry::new(EntryMode::Regular, "ghost", ghost)])
            .unwrap();
        let commit = builder.create_commit(tree, "msg", Some(0)).unwrap();

        assert!(builder.finish(commit).is_err());
    }

    #[test]
    fn test_create_git_pack_minimal() {
        let pack = create_git_pack("hello", "# Hello\n", None).unwrap();

        assert_eq!(pack.objects.len(), 3);
        assert_eq!(pack.refs[MAIN_REF], pack.head_commit);
        assert_eq!(pack.refs[HEAD_REF], pack.head_commit);
        assert!(is_sha(&pack.head_commit.to_hex()));
        for id in pack.objects.keys() {
            assert!(is_sha(&id.to_hex()));
        }
    }

    #[test]
    fn test_create_git_pack_is_deterministic() {
        let files = BTreeMap::from([("notes.md".to_string(), "notes".to_string())]);
        let first = create_git_pack("skill", "# Skill\n", Some(&files)).unwrap();
        let second = create_git_pack("skill", "# Skill\n", Some(&files)).unwrap();
        let other = create_git_pack("skill", "# Other\n", Some(&files)).unwrap();

        assert_eq!(first.head_commit, second.head_commit);
        assert_ne!(first.head_commit, other.head_commit);
    }

    #[test]
    fn test_create_git_pack_timestamp_changes_commit() {
        let a = create_git_pack_at("skill", "# Skill\n", None, &BTreeSet::new(), 1).unwrap();
        let b = create_git_pack_at("skill", "# Skill\n", None, &BTreeSet::new(), 2).unwrap();
        assert_ne!(a.head_commit, b.head_commit);
    }

    #[test]
    fn test_create_git_pack_counts_additional_files() {
        let files = BTreeMap::from([
            ("a.md".to_string(), "a".to_string()),
            ("b.md".to_string(), "b".to_string()),
        ]);
        let pack = create_git_pack("skill", "# Skill\n", Some(&files)).unwrap();

        assert!(pack.objects.len() >= files.len() + 3);
        for object in pack.objects.values() {
            let raw = object.inflate().unwrap();
            assert!(raw.starts_with(format!("{} ", object.object_type).as_bytes()));
        }
    }

    #[test]
    fn test_create_git_pack_nested_paths() {
        let files = BTreeMap::from([
            ("scripts/run.sh".to_string(), "echo hi\n".to_string()),
            ("scripts/lib/util.py".to_string(), "pass\n".to_string()),
        ]);
        let pack = create_git_pack("skill", "# Skill\n", Some(&files)).unwrap();

        // 3 blobs + root, scripts and scripts/lib trees + commit
        assert_eq!(pack.objects.len(), 7);
        let trees = pack
            .objects
            .values()
            .filter(|o| o.object_type == ObjectType::Tree)
            .count();
        assert_eq!(trees, 3);
    }

    #[test]
    fn test_create_git_pack_rejects_conflicts() {
        let primary_clash = BTreeMap::from([(PRIMARY_FILE_NAME.to_string(), "x".to_string())]);
        assert!(matches!(
            create_git_pack("skill", "# Skill\n", Some(&primary_clash)),
            Err(GitError::InvalidPath(_))
        ));

        let file_dir_clash = BTreeMap::from([
            ("docs".to_string(), "x".to_string()),
            ("docs/a.md".to_string(), "y".to_string()),
        ]);
        assert!(matches!(
            create_git_pack("skill", "# Skill\n", Some(&file_dir_clash)),
            Err(GitError::InvalidPath(_))
        ));

        let traversal = BTreeMap::from([("../etc/passwd".to_string(), "x".to_string())]);
        assert!(matches!(
            create_git_pack("skill", "# Skill\n", Some(&traversal)),
            Err(GitError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_create_git_pack_executable_files() {
        let files = BTreeMap::from([
            ("scripts/run.sh".to_string(), "#!/bin/sh\n".to_string()),
            ("notes.md".to_string(), "notes\n".to_string()),
        ]);
        let executables = BTreeSet::from(["scripts/run.sh".to_string(), "missing.sh".to_string()]);

        let plain = create_git_pack("skill", "# Skill\n", Some(&files)).unwrap();
        let pack =
            create_git_pack_at("skill", "# Skill\n", Some(&files), &executables, DEFAULT_COMMIT_TIMESTAMP)
                .unwrap();
        assert_ne!(plain.head_commit, pack.head_commit);

        let tree_with = |needle: &[u8]| {
            pack.objects
                .values()
                .filter(|o| o.object_type == ObjectType::Tree)
                .any(|o| o.content().unwrap().windows(needle.len()).any(|w| w == needle))
        };
        assert!(tree_with(b"100755 run.sh\0"));
        assert!(tree_with(b"100644 notes.md\0"));
        assert!(tree_with(b"100644 SKILL.md\0"));
    }
}
