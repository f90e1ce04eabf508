use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: a byte-span replacement in original-source
/// coordinates.
///
/// Every rule in every pass compiles down to this single primitive. An
/// insertion is a replacement of length zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Starting byte offset in the original text (inclusive)
    pub offset: usize,
    /// Number of original bytes replaced
    pub length: usize,
    /// Text written in place of `[offset, offset + length)`
    pub text: String,
}

impl Replacement {
    pub fn new(offset: usize, length: usize, text: impl Into<String>) -> Self {
        Self {
            offset,
            length,
            text: text.into(),
        }
    }

    /// Zero-length replacement at `offset`.
    pub fn insertion(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, 0, text)
    }

    /// End of the replaced original range (exclusive).
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    pub fn is_insertion(&self) -> bool {
        self.length == 0
    }

    /// Size change this replacement causes when applied.
    pub fn delta(&self) -> isize {
        self.text.len() as isize - self.length as isize
    }
}

/// Fingerprint of file contents taken at parse time.
///
/// Write-back refuses to overwrite a file whose contents changed since the
/// replacements were computed against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(text: &str) -> Self {
        Fingerprint(xxh3_64(text.as_bytes()))
    }

    pub fn matches(&self, text: &str) -> bool {
        xxh3_64(text.as_bytes()) == self.0
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{file} changed on disk since it was parsed")]
    StaleSource { file: PathBuf },

    #[error("Invalid byte range: [{byte_start}, {byte_end}) in file of length {file_len}")]
    InvalidByteRange {
        byte_start: usize,
        byte_end: usize,
        file_len: usize,
    },

    #[error("Replacements out of order or overlapping at offset {offset}")]
    Unordered { offset: usize },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("UTF-8 validation error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Invalid edit would create malformed UTF-8")]
    InvalidUtf8Edit,
}

/// Result of writing a rewritten file.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "WriteResult should be checked for written/unchanged"]
pub enum WriteResult {
    /// File was atomically replaced
    Written { file: PathBuf, bytes: usize },
    /// New content equals the current content; nothing written
    Unchanged { file: PathBuf },
}

/// Apply a sorted, non-overlapping list of replacements to `source` in one
/// step.
///
/// Replacements must be ordered by offset; an insertion may share its offset
/// with the replacement that follows it.
pub fn apply_replacements(source: &str, replacements: &[Replacement]) -> Result<String, EditError> {
    let growth: isize = replacements.iter().map(Replacement::delta).sum();
    let capacity = (source.len() as isize + growth).max(0) as usize;
    let mut out = String::with_capacity(capacity);
    let mut cursor = 0usize;

    for r in replacements {
        if r.end() > source.len() {
            return Err(EditError::InvalidByteRange {
                byte_start: r.offset,
                byte_end: r.end(),
                file_len: source.len(),
            });
        }
        if r.offset < cursor {
            return Err(EditError::Unordered { offset: r.offset });
        }
        if !source.is_char_boundary(r.offset) || !source.is_char_boundary(r.end()) {
            return Err(EditError::InvalidUtf8Edit);
        }
        out.push_str(&source[cursor..r.offset]);
        out.push_str(&r.text);
        cursor = r.end();
    }

    out.push_str(&source[cursor..]);
    Ok(out)
}

/// Overwrite `path` with `content`, provided the file still matches the
/// fingerprint taken when it was parsed.
///
/// Uses tempfile + fsync + rename so a file is either fully rewritten or left
/// untouched.
pub fn write_back(
    path: &Path,
    expected: Fingerprint,
    content: &str,
) -> Result<WriteResult, EditError> {
    let current = fs::read(path)?;
    let current = std::str::from_utf8(&current)?;

    if current == content {
        return Ok(WriteResult::Unchanged {
            file: path.to_path_buf(),
        });
    }

    if !expected.matches(current) {
        return Err(EditError::StaleSource {
            file: path.to_path_buf(),
        });
    }

    atomic_write(path, content.as_bytes())?;

    // Bump mtime so build systems notice the rewrite
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(path, now)?;

    Ok(WriteResult::Written {
        file: path.to_path_buf(),
        bytes: content.len(),
    })
}

/// Atomic file write using tempfile + fsync + rename.
fn atomic_write(path: &Path, content: &[u8]) -> Result<(), EditError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Preserve the original permissions when the target exists
    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(temp.path(), metadata.permissions())?;
    }

    temp.persist(path).map_err(|e| EditError::Io(e.error))?;

    Ok(())
}
