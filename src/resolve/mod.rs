//! Maps a decoded request path to a file or directory under the document
//! root (§4.7). Grounded on `io/file.cpp`/`io/file_tools.cpp`.

use crate::config::mime;
use crate::errors::ServerError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The result of resolving a request path against the document root.
#[derive(Debug)]
pub(crate) struct Resolved {
    /// Canonicalized filesystem path. A directory resolution has a trailing
    /// `/` and, if an index file was found, points at that file instead.
    pub(crate) path: PathBuf,
    pub(crate) is_directory: bool,
    pub(crate) mime: String,
}

/// Resolves `decoded_path` (e.g. `/a/b.html`, no query string) against
/// `document_root`.
///
/// - Bare `/` resolves straight to the document root without touching the
///   filesystem beyond that — canonicalizing an empty suffix is pointless
///   and would reject a root that happens not to canonicalize cleanly.
/// - Anything else is canonicalized as `document_root.join(path)`; a
///   nonexistent path is [`ServerError::NotFound`], any other filesystem
///   failure is [`ServerError::Io`].
/// - A resolved directory gets its first existing, non-directory entry from
///   `index_files` appended; absent that, it's served as a directory
///   listing by the caller.
/// - A symlink (file or directory) anywhere in the final resolved path is
///   rejected as [`ServerError::LinkRejected`] — checked last, after index
///   resolution, matching the original's order of operations.
pub(crate) fn resolve(
    document_root: &Path,
    decoded_path: &str,
    index_files: &[String],
    mimes: &HashMap<String, String>,
) -> Result<Resolved, ServerError> {
    let mut path = if decoded_path == "/" || decoded_path.is_empty() {
        document_root.to_path_buf()
    } else {
        let relative = decoded_path.trim_start_matches('/');
        let joined = document_root.join(relative);
        fs::canonicalize(&joined).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ServerError::NotFound,
            _ => ServerError::from(e),
        })?
    };

    if !path.starts_with(document_root) {
        // A canonicalized `..` escape landed outside the document root.
        return Err(ServerError::DisallowedPath);
    }

    let mut is_directory = path.is_dir();
    if is_directory {
        for index in index_files {
            let candidate = path.join(index);
            if candidate.is_file() {
                path = candidate;
                is_directory = false;
                break;
            }
        }
    }

    if is_symlinked(&path)? {
        return Err(ServerError::LinkRejected);
    }

    let mime = if is_directory {
        "text/html".to_string()
    } else {
        if !path.is_file() {
            return Err(ServerError::NotFound);
        }
        let ext = path.extension().and_then(|e| e.to_str());
        mime::lookup(mimes, ext).to_string()
    };

    Ok(Resolved { path, is_directory, mime })
}

/// Rejects both symlinks and hardlinked files: a file with more than one
/// directory entry pointing at it can be swapped out from under a path
/// check just as easily as a symlink can.
fn is_symlinked(path: &Path) -> Result<bool, ServerError> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_symlink() || has_extra_hardlinks(&meta)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ServerError::from(e)),
    }
}

#[cfg(unix)]
fn has_extra_hardlinks(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    meta.is_file() && meta.nlink() > 1
}

#[cfg(not(unix))]
fn has_extra_hardlinks(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mimes() -> HashMap<String, String> {
        HashMap::from([("html".to_string(), "text/html".to_string())])
    }

    #[test]
    fn root_resolves_to_document_root_as_directory() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve(dir.path(), "/", &[], &mimes()).unwrap();
        assert!(resolved.is_directory);
    }

    #[test]
    fn resolves_a_plain_file_and_looks_up_mime() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("index.html")).unwrap();
        file.write_all(b"<html></html>").unwrap();

        let resolved = resolve(dir.path(), "/index.html", &[], &mimes()).unwrap();
        assert!(!resolved.is_directory);
        assert_eq!(resolved.mime, "text/html");
    }

    #[test]
    fn directory_picks_first_existing_index_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::File::create(dir.path().join("sub/index.html")).unwrap();

        let resolved = resolve(
            dir.path(),
            "/sub",
            &["index.htm".to_string(), "index.html".to_string()],
            &mimes(),
        )
        .unwrap();
        assert!(!resolved.is_directory);
        assert!(resolved.path.ends_with("index.html"));
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), "/nope.html", &[], &mimes()).unwrap_err();
        assert!(matches!(err, ServerError::NotFound));
    }

    #[test]
    fn directory_without_index_file_stays_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let resolved = resolve(dir.path(), "/empty", &[], &mimes()).unwrap();
        assert!(resolved.is_directory);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.html");
        fs::File::create(&target).unwrap();
        let link = dir.path().join("link.html");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = resolve(dir.path(), "/link.html", &[], &mimes()).unwrap_err();
        assert!(matches!(err, ServerError::LinkRejected));
    }

    #[cfg(unix)]
    #[test]
    fn hardlinked_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("real.html");
        fs::File::create(&original).unwrap();
        let hardlink = dir.path().join("hard.html");
        fs::hard_link(&original, &hardlink).unwrap();

        let err = resolve(dir.path(), "/hard.html", &[], &mimes()).unwrap_err();
        assert!(matches!(err, ServerError::LinkRejected));
    }
}
