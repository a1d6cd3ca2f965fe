//! Logical series name -> physical artifact name, per storage engine.
//!
//! - hierarchical: `<name>.h5`
//! - columnar: `<name>.bcolz`, with escaped column names
//! - document: basename with `.` replaced by `_`

use std::path::Path;

pub const H5_EXTENSION: &str = ".h5";
pub const COLUMNAR_EXTENSION: &str = ".bcolz";

/// Prefix put in front of every escaped column name in the columnar store.
pub const COLUMNAR_PREFIX: &str = "A_";

/// Column holding the index in the columnar store.
pub const COLUMNAR_INDEX: &str = "DTS_";

/// Characters the columnar store cannot carry in a column name, and the
/// token each one is written as. `_` is escaped too so decoding is exact.
const SUBSTITUTIONS: [(char, char); 10] = [
    ('_', 'u'),
    ('&', 'a'),
    ('.', 'd'),
    ('-', 'h'),
    ('(', 'o'),
    (')', 'c'),
    ('/', 's'),
    ('%', 'p'),
    ('=', 'e'),
    (' ', 'w'),
];

pub fn h5_filename(name: &str) -> String {
    if name.ends_with(H5_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{H5_EXTENSION}")
    }
}

pub fn columnar_dirname(name: &str) -> String {
    if name.ends_with(COLUMNAR_EXTENSION) {
        name.to_string()
    } else {
        format!("{name}{COLUMNAR_EXTENSION}")
    }
}

/// Document-store library for a logical name.
pub fn library_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
        .replace('.', "_")
}

/// Escape a column name for the columnar store: each special character
/// becomes `_<code>_`.
pub fn escape_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match SUBSTITUTIONS.iter().find(|(c, _)| *c == ch) {
            Some((_, code)) => {
                out.push('_');
                out.push(*code);
                out.push('_');
            }
            None => out.push(ch),
        }
    }
    out
}

/// Inverse of [`escape_column_name`]. `None` if `name` is not a valid
/// escaped name.
pub fn unescape_column_name(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(ch) = chars.next() {
        if ch != '_' {
            out.push(ch);
            continue;
        }
        let code = chars.next()?;
        if chars.next()? != '_' {
            return None;
        }
        let (original, _) = SUBSTITUTIONS.iter().find(|(_, c)| *c == code)?;
        out.push(*original);
    }
    Some(out)
}

/// Stored column name for a series column in the columnar store.
pub fn columnar_column_name(name: &str) -> String {
    format!("{COLUMNAR_PREFIX}{}", escape_column_name(name))
}

/// Series column name for a stored columnar column.
pub fn series_column_name(stored: &str) -> Option<String> {
    unescape_column_name(stored.strip_prefix(COLUMNAR_PREFIX)?)
}
