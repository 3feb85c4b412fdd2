//! Directory listing and error document HTML (§6).
//!
//! Grounded on `util/toolbox.cpp`'s byte-size formatter and
//! `http/response.cpp`'s error template substitution.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// The error document template: `%title%`/`%status%` are substituted with the
/// reason phrase and numeric status.
const ERROR_TEMPLATE: &str = "<!DOCTYPE html>\n<html>\n<head><title>%status% %title%</title></head>\n<body>\n<h1>%status% %title%</h1>\n</body>\n</html>\n";

pub(crate) fn error_document(status: u16, reason: &str) -> String {
    ERROR_TEMPLATE
        .replace("%status%", &status.to_string())
        .replace("%title%", reason)
}

/// One row of a directory listing.
struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
    modified: SystemTime,
}

/// Renders an HTML table of `dir`'s entries: name, human-readable size, and
/// local-time last-modified. `request_path` (the URL path that resolved to
/// `dir`, always ending in `/`) is used to build each row's link and to
/// decide whether a `..` row is shown (anything above the document root).
pub(crate) fn directory_listing(dir: &Path, request_path: &str) -> std::io::Result<String> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push(Entry {
            name,
            is_dir: meta.is_dir(),
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head><title>Index of ");
    out.push_str(request_path);
    out.push_str("</title></head>\n<body>\n<h1>Index of ");
    out.push_str(request_path);
    out.push_str("</h1>\n<table>\n");
    out.push_str("<tr><th>Name</th><th>Size</th><th>Last Modified</th></tr>\n");

    if request_path != "/" {
        out.push_str("<tr><td><a href=\"../\">../</a></td><td>-</td><td>-</td></tr>\n");
    }

    for entry in &entries {
        let suffix = if entry.is_dir { "/" } else { "" };
        let href = format!("{}{suffix}", percent_encode_path_segment(&entry.name));
        let display_name = format!("{}{suffix}", html_escape(&entry.name));
        let size = if entry.is_dir { "-".to_string() } else { human_size(entry.size) };
        out.push_str(&format!(
            "<tr><td><a href=\"{href}\">{display_name}</a></td><td>{size}</td><td>{}</td></tr>\n",
            local_timestamp(entry.modified)
        ));
    }

    out.push_str("</table>\n</body>\n</html>\n");
    Ok(out)
}

/// Formats a byte count as `B`/`KB`/`MB`/`GB`/`TB`, two decimal places above
/// the base unit.
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[0])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Formats a modification time as local "MM/DD/YY, hh:mm:ss AM/PM" (§6).
fn local_timestamp(time: SystemTime) -> String {
    let datetime: chrono::DateTime<chrono::Local> = time.into();
    datetime.format("%m/%d/%y, %I:%M:%S %p").to_string()
}

/// Escapes a file name for safe inclusion in HTML text content. A file
/// named e.g. `<script>` must not be interpreted as markup by the listing.
fn html_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Percent-encodes a single path segment so names containing spaces, `?`,
/// `#`, or quotes still produce a working, attribute-safe `href`.
fn percent_encode_path_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for &b in name.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn human_size_picks_the_right_unit() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.50 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn error_document_substitutes_status_and_title() {
        let doc = error_document(404, "Not Found");
        assert!(doc.contains("404 Not Found"));
    }

    #[test]
    fn listing_includes_parent_row_except_at_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::File::create(dir.path().join("a.txt")).unwrap().write_all(b"x").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let root_listing = directory_listing(dir.path(), "/").unwrap();
        assert!(!root_listing.contains("../"));
        assert!(root_listing.contains("a.txt"));
        assert!(root_listing.contains("sub/"));

        let nested_listing = directory_listing(dir.path(), "/sub/").unwrap();
        assert!(nested_listing.contains("../"));
    }

    #[test]
    fn entry_names_are_escaped_and_percent_encoded() {
        let dir = tempfile::tempdir().unwrap();
        fs::File::create(dir.path().join("<script>.txt")).unwrap().write_all(b"x").unwrap();
        fs::File::create(dir.path().join("a b.txt")).unwrap().write_all(b"x").unwrap();

        let listing = directory_listing(dir.path(), "/").unwrap();
        assert!(!listing.contains("<script>"));
        assert!(listing.contains("&lt;script&gt;.txt"));
        assert!(listing.contains("a%20b.txt"));
    }
}
