//! MIME type table (`ext -> type`), loaded from a simple `<ext> <mime>`
//! text file — one pair per line, malformed lines skipped. Grounded on
//! `conf.cpp`'s `loadMIMES`.

use std::collections::HashMap;
use std::path::Path;

pub(crate) const MIME_UNSET: &str = "application/octet-stream";

pub(crate) fn load(path: &Path) -> std::io::Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse(&content))
}

fn parse(content: &str) -> HashMap<String, String> {
    let mut mimes = HashMap::new();
    for line in content.lines() {
        let Some(space) = line.find(' ') else { continue };
        let ext = line[..space].trim();
        let mime = line[space + 1..].trim();
        if ext.is_empty() || mime.is_empty() {
            continue;
        }
        mimes.insert(ext.to_string(), mime.to_string());
    }
    mimes
}

/// Looks up the MIME type for a file extension (without the leading `.`),
/// falling back to [`MIME_UNSET`] for unknown or missing extensions.
pub(crate) fn lookup<'a>(mimes: &'a HashMap<String, String>, extension: Option<&str>) -> &'a str {
    extension
        .and_then(|ext| mimes.get(ext))
        .map(String::as_str)
        .unwrap_or(MIME_UNSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines_and_skips_malformed() {
        let mimes = parse("html text/html\ncss text/css\nnotaline\njs  application/javascript\n");
        assert_eq!(mimes.get("html").map(String::as_str), Some("text/html"));
        assert_eq!(mimes.get("css").map(String::as_str), Some("text/css"));
        assert_eq!(mimes.get("js").map(String::as_str), Some("application/javascript"));
        assert_eq!(mimes.len(), 3);
    }

    #[test]
    fn unknown_extension_falls_back_to_unset() {
        let mimes = parse("html text/html\n");
        assert_eq!(lookup(&mimes, Some("pdf")), MIME_UNSET);
        assert_eq!(lookup(&mimes, None), MIME_UNSET);
        assert_eq!(lookup(&mimes, Some("html")), "text/html");
    }
}
