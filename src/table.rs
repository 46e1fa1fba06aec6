//! File table: the ordered `(name, size)` index that also fixes payload order.
//!
//! Names always use `/` separators regardless of the host; [`resolve`] maps
//! a stored name back onto a host path below an explicit base directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    /// Exact number of payload bytes that follow for this record.
    pub size: u64,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self { name: name.into(), size }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTable {
    pub records: Vec<FileRecord>,
}

impl FileTable {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, record: FileRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, FileRecord> {
        self.records.iter()
    }

    /// Sum of all payload sizes; this is what the tuner sees as payload size.
    pub fn payload_size(&self) -> u64 {
        self.records.iter().fold(0u64, |acc, r| acc.saturating_add(r.size))
    }

    /// Encoded length of signature + table + payloads.
    pub fn container_size(&self) -> u64 {
        let table: u64 = self.records.iter()
            .map(|r| 16 + r.name.len() as u64)
            .sum();
        crate::signature::SIGNATURE_SIZE as u64 + 8 + table + self.payload_size()
    }
}

impl FromIterator<FileRecord> for FileTable {
    fn from_iter<I: IntoIterator<Item = FileRecord>>(iter: I) -> Self {
        Self { records: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a FileTable {
    type Item = &'a FileRecord;
    type IntoIter = std::slice::Iter<'a, FileRecord>;

    fn into_iter(self) -> Self::IntoIter { self.records.iter() }
}

/// Convert a host-relative path into a stored name (`/`-separated).
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a stored name below `base`. Empty, absolute and `..` names are
/// rejected so extraction can never escape the base directory.
pub fn resolve(base: &Path, name: &str) -> Result<PathBuf> {
    let unsafe_name = || Error::UnsafeName { name: name.to_owned() };
    if name.is_empty() || name.starts_with('/') {
        return Err(unsafe_name());
    }
    let mut out = base.to_path_buf();
    for part in name.split('/') {
        match Path::new(part).components().next() {
            None => continue,
            Some(Component::Normal(_)) if Path::new(part).components().count() == 1 => out.push(part),
            Some(Component::CurDir) => continue,
            _ => return Err(unsafe_name()),
        }
    }
    if out == base {
        return Err(unsafe_name());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        let table: FileTable = vec![
            FileRecord::new("a.txt", 3),
            FileRecord::new("sub/b.txt", 0),
        ].into_iter().collect();
        assert_eq!(table.payload_size(), 3);
        // 16 + 8 + (16 + 5) + (16 + 9) + 3
        assert_eq!(table.container_size(), 73);
    }

    #[test]
    fn resolve_nested_name() {
        let base = Path::new("out");
        assert_eq!(resolve(base, "sub/b.txt").unwrap(), base.join("sub").join("b.txt"));
        assert_eq!(resolve(base, "./a.txt").unwrap(), base.join("a.txt"));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let base = Path::new("out");
        for name in ["", "/etc/passwd", "../x", "a/../../x", ".", "a/.."] {
            assert!(
                matches!(resolve(base, name), Err(Error::UnsafeName { .. })),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn to_slash_joins_components() {
        let p: PathBuf = ["sub", "dir", "f.bin"].iter().collect();
        assert_eq!(to_slash(&p), "sub/dir/f.bin");
    }
}
