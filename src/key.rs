use crate::error::StorageError;

/// Lexically normalizes a logical file name into POSIX form.
///
/// Platform separators become `/`, empty and `.` segments are dropped and
/// `..` segments pop their parent. A leading `/` is ignored so every name
/// stays relative to the storage root. The root itself normalizes to `""`.
pub fn normalize_name(name: &str) -> Result<String, StorageError> {
    let name = name.replace(std::path::MAIN_SEPARATOR, "/");
    let mut segments: Vec<&str> = Vec::new();

    for segment in name.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::InvalidPath { name: name.clone() });
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Joins a logical name onto a directory path with POSIX semantics.
pub fn join_path(dir: &str, name: &str) -> String {
    match (dir.trim_end_matches('/'), name) {
        ("", name) => name.to_owned(),
        (dir, "") => dir.to_owned(),
        (dir, name) => format!("{dir}/{name}"),
    }
}

/// Maps logical file names to object keys under a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyMapper {
    prefix: String,
}

impl KeyMapper {
    /// Creates a mapper for `prefix`, normalizing it first.
    pub fn new(prefix: &str) -> Result<Self, StorageError> {
        Ok(Self {
            prefix: normalize_name(prefix)?,
        })
    }

    /// Returns the normalized key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the object key for a logical name.
    pub fn key(&self, name: &str) -> Result<String, StorageError> {
        Ok(join_path(&self.prefix, &normalize_name(name)?))
    }

    /// Strips the prefix from an object key, returning the logical name.
    ///
    /// Returns `None` for keys outside the prefix.
    pub fn name<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.prefix.is_empty() {
            return Some(key);
        }
        match key.strip_prefix(self.prefix.as_str())? {
            "" => Some(""),
            rest => rest.strip_prefix('/'),
        }
    }
}

/// Percent-escapes a path for use in a URL, keeping `/` separators.
pub fn escape_uri_path(path: &str) -> String {
    escape(path, |byte| {
        is_unreserved(byte) || matches!(byte, b'/' | b'!' | b'*' | b'(' | b')' | b'\'')
    })
}

/// Percent-escapes a value for use in a URL query string.
pub(crate) fn escape_query_value(value: &str) -> String {
    escape(value, is_unreserved)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

fn escape(value: &str, keep: impl Fn(u8) -> bool) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut out = String::with_capacity(value.len());
    for &byte in value.as_bytes() {
        if keep(byte) {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0x0f)]));
        }
    }
    out
}
