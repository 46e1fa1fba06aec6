//! File discovery below a base directory.
//!
//! Patterns are matched against `/`-separated names relative to the base.
//! `*` matches any run of characters, `/` included; `?` matches exactly one
//! character; everything else matches itself.  Matching is anchored at both
//! ends.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::table::{to_slash, FileRecord, FileTable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    pattern: Vec<char>,
}

impl Glob {
    pub fn new(pattern: &str) -> Self {
        // Host separators are normalized so `sub\*.txt` works on Windows.
        let pattern = pattern.chars()
            .map(|c| if std::path::is_separator(c) { '/' } else { c })
            .collect();
        Self { pattern }
    }

    pub fn matches(&self, name: &str) -> bool {
        let name: Vec<char> = name.chars().collect();
        let (p, n) = (&self.pattern, &name);
        let (mut pi, mut ni) = (0, 0);
        // Position of the last `*` and the name index it is currently
        // absorbing up to; on mismatch the star swallows one more char.
        let mut star: Option<(usize, usize)> = None;

        while ni < n.len() {
            match p.get(pi) {
                Some('*') => {
                    star = Some((pi, ni));
                    pi += 1;
                }
                Some(&c) if c == '?' || c == n[ni] => {
                    pi += 1;
                    ni += 1;
                }
                _ => match star {
                    Some((sp, sn)) => {
                        pi = sp + 1;
                        ni = sn + 1;
                        star = Some((sp, sn + 1));
                    }
                    None => return false,
                },
            }
        }
        p[pi..].iter().all(|&c| c == '*')
    }
}

impl FromStr for Glob {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(Glob::new(s)) }
}

/// What to pick up below a base directory.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub include: Vec<Glob>,
    pub exclude: Vec<Glob>,
    /// A file that must never be packed, normally the archive being written.
    pub skip:    Option<PathBuf>,
}

impl Selection {
    pub fn wants(&self, name: &str) -> bool {
        self.include.iter().any(|g| g.matches(name))
            && !self.exclude.iter().any(|g| g.matches(name))
    }
}

/// Walk `base` in sorted order and collect every regular file `sel` wants.
pub fn collect(base: &Path, sel: &Selection) -> Result<FileTable> {
    let skip = match &sel.skip {
        Some(p) => fs::canonicalize(p).ok(),
        None => None,
    };

    let mut table = FileTable::new();
    for entry in jwalk::WalkDir::new(base).sort(true).skip_hidden(false) {
        let entry = entry.map_err(|e| Error::path(base, e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let rel = match path.strip_prefix(base) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        // A lossy name would no longer open the file it came from.
        if rel.to_str().is_none() {
            warn!("skipping {}: name is not valid UTF-8", path.display());
            continue;
        }
        let name = to_slash(rel);
        if !sel.wants(&name) {
            trace!("walk: skip {name}");
            continue;
        }
        if skip.is_some() && fs::canonicalize(&path).ok() == skip {
            debug!("walk: not packing the archive itself ({name})");
            continue;
        }
        let size = entry.metadata().map_err(|e| Error::path(&path, e.into()))?.len();
        table.push(FileRecord::new(name, size));
    }
    Ok(table)
}
