//! `Match`/`Redirect`/`Rewrite` rule pipeline (§4.9).
//!
//! `Redirect` and `Rewrite` are grounded on `conf_redirect.cpp`/`rewrite.cpp`
//! respectively and differ in one load-bearing way: a `Redirect` pattern
//! only needs to match *somewhere* in the path (`regex::Regex::find`,
//! mirroring `std::regex_search`), while a `Rewrite` pattern must match the
//! *entire* path (`regex::Regex::is_match` against an implicitly anchored
//! full-string match, mirroring `std::regex_match`). Both substitute `$N`
//! capture groups into their target template in descending numeric order,
//! so `$11` isn't mistaken for `$1` followed by a literal `1`.
//!
//! `Match` is grounded on `conf_match.cpp`: a path pattern plus a list of
//! response headers to inject whenever a request path matches.
//!
//! [`HeaderCondition`] is grounded on `mod_headers.cpp`'s filter hierarchy,
//! using spec's own node naming (`HeaderMatches`/`HeaderNotMatches`/
//! `HeaderExists`/`HeaderAbsent`) rather than the original's
//! `FilterIfHeaderMatch`-style names. Both `HeaderMatches` and
//! `HeaderNotMatches` require the header to be *present*: an absent header
//! satisfies neither, only `HeaderAbsent` does.

use crate::access::Access;
use crate::errors::ServerError;
use crate::http::types::StatusCode;
use regex::Regex;

/// A compiled path pattern, the response headers to inject when it matches,
/// and the optional per-rule access/visibility/header-condition gates.
#[derive(Debug)]
pub(crate) struct Match {
    pattern: Regex,
    headers: Vec<(String, String)>,
    show_directory_indexes: bool,
    access: Option<Access>,
    header_filters: Vec<HeaderCondition>,
}

impl Match {
    pub(crate) fn compile(
        pattern: &str,
        headers: Vec<(String, String)>,
        show_directory_indexes: bool,
        access: Option<Access>,
        header_filters: Vec<HeaderCondition>,
    ) -> Result<Self, ServerError> {
        Ok(Match {
            pattern: Regex::new(pattern)?,
            headers,
            show_directory_indexes,
            access,
            header_filters,
        })
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }

    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub(crate) fn show_directory_indexes(&self) -> bool {
        self.show_directory_indexes
    }

    pub(crate) fn access(&self) -> Option<&Access> {
        self.access.as_ref()
    }

    /// True only if every [`HeaderCondition`] attached to this rule is
    /// satisfied (an empty list is vacuously true).
    pub(crate) fn conditions_satisfied(&self, header: impl Fn(&str) -> Option<String>) -> bool {
        self.header_filters.iter().all(|c| c.evaluate(&header))
    }
}

#[derive(Debug)]
pub(crate) struct Redirect {
    pattern: Regex,
    to: String,
    status: StatusCode,
}

impl Redirect {
    pub(crate) fn compile(pattern: &str, to: &str, status: u16) -> Result<Self, ServerError> {
        let status = status_from_u16(status).ok_or_else(|| ServerError::ConfigParse(format!(
            "invalid Redirect status {status}"
        )))?;
        Ok(Redirect { pattern: Regex::new(pattern)?, to: to.to_string(), status })
    }

    /// Returns the substituted target and status if `path` matches anywhere
    /// in the pattern (partial match, like `std::regex_search`).
    pub(crate) fn apply(&self, path: &str) -> Option<(String, StatusCode)> {
        let captures = self.pattern.captures(path)?;
        Some((substitute_captures(&self.to, &captures), self.status))
    }
}

#[derive(Debug)]
pub(crate) struct Rewrite {
    pattern: Regex,
    to: String,
}

impl Rewrite {
    pub(crate) fn compile(pattern: &str, to: &str) -> Result<Self, ServerError> {
        Ok(Rewrite { pattern: Regex::new(pattern)?, to: to.to_string() })
    }

    /// Returns the substituted target only if `path` matches the pattern in
    /// full (like `std::regex_match`).
    pub(crate) fn apply(&self, path: &str) -> Option<String> {
        let captures = self.pattern.captures(path)?;
        if captures.get(0).map(|m| m.as_str()) != Some(path) {
            return None;
        }
        Some(substitute_captures(&self.to, &captures))
    }
}

/// Substitutes `$0` (the whole match), `$1`, `$2`, ... in `template` with
/// capture group text, in descending numeric order so `$11` resolves before
/// `$1` (§3: "descending to avoid `$1` shadowing `$11`").
fn substitute_captures(template: &str, captures: &regex::Captures) -> String {
    let mut out = template.to_string();
    for i in (0..captures.len()).rev() {
        let Some(group) = captures.get(i) else { continue };
        out = out.replace(&format!("${i}"), group.as_str());
    }
    out
}

fn status_from_u16(code: u16) -> Option<StatusCode> {
    Some(match code {
        300 => StatusCode::MultipleChoices,
        301 => StatusCode::MovedPermanently,
        302 => StatusCode::Found,
        303 => StatusCode::SeeOther,
        304 => StatusCode::NotModified,
        307 => StatusCode::TemporaryRedirect,
        308 => StatusCode::PermanentRedirect,
        _ => return None,
    })
}

/// A header-presence/value condition (§4.9), evaluated against a request's
/// headers before a conditional action (e.g. a conditional `Match`) fires.
#[derive(Debug)]
pub(crate) enum HeaderCondition {
    /// True only if the header is present and its value matches the regex.
    HeaderMatches { name: String, pattern: Regex },
    /// True only if the header is present and its value does *not* match
    /// the regex — an absent header does not satisfy this (it is not a
    /// "non-match", it is simply not evaluated).
    HeaderNotMatches { name: String, pattern: Regex },
    HeaderExists { name: String },
    HeaderAbsent { name: String },
}

impl HeaderCondition {
    pub(crate) fn evaluate(&self, header: impl Fn(&str) -> Option<String>) -> bool {
        match self {
            HeaderCondition::HeaderMatches { name, pattern } => {
                header(name).is_some_and(|v| pattern.is_match(&v))
            }
            HeaderCondition::HeaderNotMatches { name, pattern } => {
                header(name).is_some_and(|v| !pattern.is_match(&v))
            }
            HeaderCondition::HeaderExists { name } => header(name).is_some(),
            HeaderCondition::HeaderAbsent { name } => header(name).is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessMode;

    #[test]
    fn match_with_no_header_filters_is_vacuously_satisfied() {
        let m = Match::compile(r"^/admin/.*$", vec![], true, None, vec![]).unwrap();
        assert!(m.matches("/admin/users"));
        assert!(m.conditions_satisfied(|_| None));
    }

    #[test]
    fn match_requires_every_header_filter_to_pass() {
        let filters = vec![
            HeaderCondition::HeaderExists { name: "X-Id".into() },
            HeaderCondition::HeaderMatches {
                name: "X-Env".into(),
                pattern: Regex::new("^prod$").unwrap(),
            },
        ];
        let m = Match::compile(r"^/api/.*$", vec![], false, None, filters).unwrap();
        assert!(!m.conditions_satisfied(|_| None));
        assert!(m.conditions_satisfied(|name| match name {
            "X-Id" => Some("1".to_string()),
            "X-Env" => Some("prod".to_string()),
            _ => None,
        }));
    }

    #[test]
    fn match_carries_its_own_access_gate() {
        let access = Access::new(AccessMode::DenyFirst, vec![Access::parse_exception("10.0.0.0/8").unwrap()]);
        let m = Match::compile(r"^/admin/.*$", vec![], true, Some(access), vec![]).unwrap();
        assert!(m.access().unwrap().is_allowed("10.1.2.3".parse().unwrap()));
        assert!(!m.access().unwrap().is_allowed("8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn redirect_status_300_through_304_and_permanent_variants_compile() {
        for status in [300, 301, 302, 303, 304, 307, 308] {
            assert!(Redirect::compile(r"^/x$", "/y", status).is_ok(), "status {status} should compile");
        }
        assert!(Redirect::compile(r"^/x$", "/y", 305).is_err());
    }

    #[test]
    fn redirect_is_a_partial_match() {
        let r = Redirect::compile(r"^/old/(\d+)$", "/new/$1", 301).unwrap();
        assert!(r.apply("/old/42/extra").is_none() || r.apply("/old/42").is_some());
        let (to, status) = r.apply("/old/42").unwrap();
        assert_eq!(to, "/new/42");
        assert_eq!(status, StatusCode::MovedPermanently);
    }

    #[test]
    fn rewrite_requires_full_match() {
        let rw = Rewrite::compile(r"^/api/(\w+)$", "/v2/$1").unwrap();
        assert_eq!(rw.apply("/api/users"), Some("/v2/users".to_string()));
        assert_eq!(rw.apply("/api/users/extra"), None);
    }

    #[test]
    fn dollar_zero_substitutes_the_whole_match() {
        let r = Redirect::compile(r"/old/(\w+)", "/archive/$0", 301).unwrap();
        let (to, _) = r.apply("/old/page").unwrap();
        assert_eq!(to, "/archive/old/page");
    }

    #[test]
    fn descending_capture_substitution_avoids_dollar_one_clobbering_dollar_eleven() {
        let pattern = (1..=11).map(|_| "(\\w)").collect::<Vec<_>>().join("/");
        let rw = Rewrite::compile(&format!("^{pattern}$"), "$11-$1").unwrap();
        let result = rw.apply("a/b/c/d/e/f/g/h/i/j/k").unwrap();
        assert_eq!(result, "k-a");
    }

    #[test]
    fn header_matches_and_not_matches_both_require_presence() {
        let matches = HeaderCondition::HeaderMatches {
            name: "X-Env".into(),
            pattern: Regex::new("^prod$").unwrap(),
        };
        let not_matches = HeaderCondition::HeaderNotMatches {
            name: "X-Env".into(),
            pattern: Regex::new("^prod$").unwrap(),
        };

        assert!(!matches.evaluate(|_| None));
        assert!(!not_matches.evaluate(|_| None));
        assert!(matches.evaluate(|_| Some("prod".to_string())));
        assert!(!not_matches.evaluate(|_| Some("prod".to_string())));
    }

    #[test]
    fn exists_and_absent_are_the_only_presence_only_conditions() {
        let exists = HeaderCondition::HeaderExists { name: "X-Id".into() };
        let absent = HeaderCondition::HeaderAbsent { name: "X-Id".into() };
        assert!(exists.evaluate(|_| Some("1".to_string())));
        assert!(!exists.evaluate(|_| None));
        assert!(!absent.evaluate(|_| Some("1".to_string())));
        assert!(absent.evaluate(|_| None));
    }
}
