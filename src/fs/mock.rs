// src/fs/mock.rs

use super::FileSystem;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
}

/// In-memory filesystem shared between clones.
///
/// Tests use it to stand in for the directory holding the watched file:
/// files can be created, rewritten, removed and renamed while the state
/// machine is running against the same instance.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    /// Create or overwrite a file, creating parent directories implicitly.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut files = self.lock();
        if let Some(parent) = path.parent() {
            ensure_dir_entry(&mut files, parent);
            link_child(&mut files, parent, &path);
        }
        files.insert(path, MockEntry::File(content.into()));
    }

    /// Create an empty directory (and its parents).
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut files = self.lock();
        ensure_dir_entry(&mut files, path.as_ref());
    }

    /// Remove a file or a directory subtree. Returns whether anything was removed.
    pub fn remove(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut files = self.lock();
        if files.remove(path).is_none() {
            return false;
        }
        files.retain(|p, _| !p.starts_with(path));
        if let Some(parent) = path.parent() {
            unlink_child(&mut files, parent, path);
        }
        true
    }

    /// Move a single file. Fails with `NotFound` if `from` is not a file.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> io::Result<()> {
        let content = {
            let files = self.lock();
            match files.get(from.as_ref()) {
                Some(MockEntry::File(content)) => content.clone(),
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no such file: {:?}", from.as_ref()),
                    ));
                }
            }
        };
        self.remove(from);
        self.add_file(to, content);
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        // A poisoned lock only happens after a panicking test; keep going.
        self.files.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if files.contains_key(path) {
        return;
    }
    files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
    if let Some(parent) = path.parent() {
        ensure_dir_entry(files, parent);
        link_child(files, parent, path);
    }
}

fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (files.get_mut(parent), child.file_name().and_then(|n| n.to_str()))
    {
        if !children.iter().any(|c| c == name) {
            children.push(name.to_string());
        }
    }
}

fn unlink_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (files.get_mut(parent), child.file_name().and_then(|n| n.to_str()))
    {
        children.retain(|c| c != name);
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("File not found: {:?}", path))
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::other(format!("Is a directory: {:?}", path))
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let files = self.lock();
        match files.get(path) {
            Some(MockEntry::File(content)) => String::from_utf8(content.clone())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Some(MockEntry::Dir(_)) => Err(is_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    fn open_read(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        let files = self.lock();
        match files.get(path) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(MockEntry::Dir(_)) => Err(is_a_directory(path)),
            None => Err(not_found(path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File(_)))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir(_)))
    }
}
