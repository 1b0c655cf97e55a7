//! Path canonicalization shared by the loaders and storage adapters
//!
//! A canonical path is slash-joined, has no empty, `.` or `..` segments and
//! never ascends above its root.

use crate::error::{Result, RuntimeError};

/// Resolve `path` into its canonical segments.
///
/// `..` above the root fails instead of being truncated.
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.pop().is_none() {
                    return Err(illegal(path));
                }
            }
            name => stack.push(name),
        }
    }
    Ok(stack)
}

/// Canonicalize a path naming an entry; the root itself is rejected.
pub fn canonicalize(path: &str) -> Result<String> {
    let stack = segments(path)?;
    if stack.is_empty() {
        return Err(illegal(path));
    }
    Ok(stack.join("/"))
}

/// Canonicalize a folder path; an empty result names the root.
pub fn canonicalize_dir(path: &str) -> Result<String> {
    Ok(segments(path)?.join("/"))
}

/// Join a directory and a relative path without canonicalizing.
pub fn join(dir: &str, path: &str) -> String {
    if dir.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", dir, path)
    }
}

/// Directory part of a canonical path (`a/b/c.js` -> `a/b`, `c.js` -> ``).
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn illegal(path: &str) -> RuntimeError {
    RuntimeError::Path(format!("Code path \"{}\" is illegal", path))
}
