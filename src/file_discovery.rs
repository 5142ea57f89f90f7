use crate::config::Config;
use crate::ignore_filter::IgnoreFilter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Walks a project directory, pruning ignored entries before descending.
pub struct FileDiscovery {
    root: PathBuf,
    extensions: Vec<String>,
    filter: IgnoreFilter,
}

impl FileDiscovery {
    pub fn new(config: &Config, filter: IgnoreFilter) -> Self {
        Self {
            root: config.target_directory.clone(),
            extensions: config
                .file_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            filter,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yields candidate source files, relative to the root, in file-name order.
    ///
    /// Ignored directories are pruned, so nothing below them is ever read. The
    /// iterator is lazy on purpose: the caller stops pulling once its cap is hit.
    pub fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.walk(|_| {})
            .filter(move |entry| entry.file_type().is_file() && self.has_source_extension(entry.path()))
            .filter_map(move |entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .ok()
                    .map(Path::to_path_buf)
            })
    }

    /// Every non-ignored entry under the root. `visit` sees each entry the
    /// walker considers, before the ignore rules decide whether to descend.
    fn walk<'a, F>(&'a self, mut visit: F) -> impl Iterator<Item = DirEntry> + 'a
    where
        F: FnMut(&DirEntry) + 'a,
    {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                visit(entry);
                entry.depth() == 0 || !self.is_ignored(entry)
            })
            .filter_map(|result| match result {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {}", err);
                    None
                }
            })
    }

    pub fn discover_files(&self) -> Vec<PathBuf> {
        self.candidates().collect()
    }

    /// Nested view of every non-ignored entry under the root.
    pub fn tree(&self) -> crate::Result<DirTree> {
        self.tree_at(&self.root)
    }

    fn tree_at(&self, dir: &Path) -> crate::Result<DirTree> {
        let mut entries = BTreeMap::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if self.filter.should_ignore(&name) {
                continue;
            }

            // file_type() does not follow symlinks
            let subtree = if entry.file_type()?.is_dir() {
                match self.tree_at(&entry.path()) {
                    Ok(tree) => Some(tree),
                    Err(err) => {
                        tracing::warn!("cannot list {}: {}", entry.path().display(), err);
                        Some(DirTree::default())
                    }
                }
            } else {
                None
            };
            entries.insert(name, subtree);
        }

        Ok(DirTree(entries))
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        entry
            .file_name()
            .to_str()
            .map(|name| self.filter.should_ignore(name))
            .unwrap_or(false)
    }

    fn has_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

/// Directory listing keyed by entry name; files map to `None`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DirTree(pub BTreeMap<String, Option<DirTree>>);

impl DirTree {
    pub fn get(&self, name: &str) -> Option<&Option<DirTree>> {
        self.0.get(name)
    }

    pub fn file_count(&self) -> usize {
        self.0
            .values()
            .map(|child| match child {
                Some(subtree) => subtree.file_count(),
                None => 1,
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn discovery_for(root: &Path) -> FileDiscovery {
        let mut config = Config::default();
        config.target_directory = root.to_path_buf();
        let filter = IgnoreFilter::from_config(&config.ignore).unwrap();
        FileDiscovery::new(&config, filter)
    }

    #[test]
    fn test_finds_python_files_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("main.py"), "print('hi')\n").unwrap();
        fs::write(root.join("notes.txt"), "text").unwrap();
        fs::write(root.join("pkg").join("util.py"), "x = 1\n").unwrap();

        let files = discovery_for(root).discover_files();

        assert_eq!(files, vec![PathBuf::from("main.py"), PathBuf::from("pkg").join("util.py")]);
    }

    #[test]
    fn test_prunes_ignored_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for dir in [".git", "venv", "node_modules", "__pycache__"] {
            fs::create_dir_all(root.join(dir).join("deep")).unwrap();
            fs::write(root.join(dir).join("deep").join("hidden.py"), "def f(\n").unwrap();
        }
        fs::write(root.join("kept.py"), "x = 1\n").unwrap();

        let files = discovery_for(root).discover_files();

        assert_eq!(files, vec![PathBuf::from("kept.py")]);
    }

    #[test]
    fn test_ignored_directory_contents_are_never_visited() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let objects = root.join(".git").join("objects");
        fs::create_dir_all(&objects).unwrap();
        for i in 0..50 {
            fs::write(objects.join(format!("blob_{}.py", i)), "").unwrap();
        }
        fs::write(root.join("kept.py"), "x = 1\n").unwrap();

        let discovery = discovery_for(root);
        let mut visited = Vec::new();
        let yielded = discovery.walk(|entry| visited.push(entry.path().to_path_buf())).count();

        assert!(visited.contains(&root.join(".git")));
        assert!(visited.iter().all(|path| !path.starts_with(root.join(".git").join("objects"))));
        // root and kept.py
        assert_eq!(yielded, 2);
    }

    #[test]
    fn test_ignores_files_by_name_and_pattern() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("a.py"), "").unwrap();
        fs::write(root.join("a.pyc"), "").unwrap();
        fs::write(root.join(".env"), "SECRET=1").unwrap();

        let mut config = Config::default();
        config.target_directory = root.to_path_buf();
        config.ignore.patterns.push("a.*".to_string());
        let filter = IgnoreFilter::from_config(&config.ignore).unwrap();

        let files = FileDiscovery::new(&config, filter).discover_files();
        assert!(files.is_empty());
    }

    #[test]
    fn test_root_is_never_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("venv");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("inside.py"), "").unwrap();

        let files = discovery_for(&root).discover_files();
        assert_eq!(files, vec![PathBuf::from("inside.py")]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["c.py", "a.py", "b.py"] {
            fs::write(root.join(name), "").unwrap();
        }

        let discovery = discovery_for(root);
        let first = discovery.discover_files();
        let second = discovery.discover_files();

        assert_eq!(first, second);
        assert_eq!(first, vec![PathBuf::from("a.py"), PathBuf::from("b.py"), PathBuf::from("c.py")]);
    }

    #[test]
    fn test_tree_skips_ignored_entries() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join(".git").join("HEAD"), "ref").unwrap();
        fs::write(root.join("src").join("app.py"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let tree = discovery_for(root).tree().unwrap();

        assert!(tree.get(".git").is_none());
        assert_eq!(tree.get("README.md"), Some(&None));
        let src = tree.get("src").unwrap().as_ref().unwrap();
        assert_eq!(src.get("app.py"), Some(&None));
        assert_eq!(tree.file_count(), 2);

        let json = serde_json::to_value(&tree).unwrap();
        assert!(json["README.md"].is_null());
        assert!(json["src"]["app.py"].is_null());
    }
}
