//! Repository and release tag normalization.
//!
//! Both helpers are total: malformed input never panics. An invalid
//! repository yields `None`, which callers report as a validation failure.

const GITHUB_PREFIXES: [&str; 2] = ["https://github.com/", "http://github.com/"];

/// A validated `owner/repo` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedRepository {
    owner: String,
    repo: String,
}

impl NormalizedRepository {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl std::fmt::Display for NormalizedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let tail = text.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &text[..split])
}

/// Normalize a repository reference into `owner/repo`.
///
/// Accepts bare `owner/repo` as well as GitHub URLs with an optional `.git`
/// suffix. Segments past the second are ignored.
pub fn normalize_repository(raw: &str) -> Option<NormalizedRepository> {
    let mut text = raw.trim();
    for prefix in GITHUB_PREFIXES {
        if let Some(rest) = strip_prefix_ignore_case(text, prefix) {
            text = rest;
            break;
        }
    }
    if let Some(rest) = strip_suffix_ignore_case(text, ".git") {
        text = rest;
    }
    let text = text.trim_matches('/');

    let mut parts = text.split('/').filter(|part| !part.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;
    if !is_valid_segment(owner) || !is_valid_segment(repo) {
        return None;
    }

    Some(NormalizedRepository {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Normalize a release tag: empty means "latest", anything else starts with `v`.
pub fn normalize_release_tag(raw: &str) -> String {
    let tag = raw.trim();
    if tag.is_empty() {
        String::new()
    } else if tag.starts_with('v') {
        tag.to_string()
    } else {
        format!("v{tag}")
    }
}
