//! Path classification for the virtual filesystem namespace.
//!
//! The namespace is laid out as `/<user>/<area>/<relative...>`, where the
//! area segment decides how the interception layer treats the path:
//!
//! ```text
//! /alice/files/docs/report.txt   → UserFiles, relative "docs/report.txt"
//! /alice/cache/3f2a.../chunk.0   → Cache (scratch, never intercepted)
//! /alice/trash/report.txt        → Trash (never intercepted)
//! /avatars/alice.png             → Other
//! ```
//!
//! Classification happens once per hook invocation and the resolved
//! [`UserPath`] is passed down, instead of re-deriving by string index at
//! every call site.

use glob::Pattern;
use tracing::warn;

/// Which area of a user's namespace a path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass {
    UserFiles,
    Cache,
    Trash,
    Other,
}

/// A path resolved against the `/<user>/<area>/<relative>` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPath {
    pub user: String,
    pub class: PathClass,
    pub relative: String,
}

const FILES_SEGMENT: &str = "files";
const CACHE_SEGMENT: &str = "cache";
const TRASH_SEGMENT: &str = "trash";

/// Collapse duplicate slashes and trailing slashes into the canonical
/// leading-slash form. The root collapses to `/`.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Classify a path by its area segment.
pub fn classify(path: &str) -> PathClass {
    resolve(path).map_or(PathClass::Other, |p| p.class)
}

/// Resolve a path to its owning user, area, and area-relative remainder.
/// Returns `None` when the path has no user and area segments at all.
pub fn resolve(path: &str) -> Option<UserPath> {
    let segs = segments(path);
    let (user, area) = match (segs.first(), segs.get(1)) {
        (Some(user), Some(area)) => (*user, *area),
        _ => return None,
    };
    let class = match area {
        FILES_SEGMENT => PathClass::UserFiles,
        CACHE_SEGMENT => PathClass::Cache,
        TRASH_SEGMENT => PathClass::Trash,
        _ => PathClass::Other,
    };
    Some(UserPath {
        user: user.to_string(),
        class,
        relative: segs[2..].join("/"),
    })
}

/// Resolve a path inside a user's files area. `None` for anything else,
/// including the files root itself.
pub fn strip_user_files(path: &str) -> Option<UserPath> {
    resolve(path)
        .filter(|p| p.class == PathClass::UserFiles && !p.relative.is_empty())
}

/// Scratch location for write interception: the files area segment is
/// swapped for `cache/<token>` so the scratch stays inside the same user's
/// tree. `/alice/files/docs/a.txt` → `/alice/cache/<token>/docs/a.txt`.
pub fn scratch_path(path: &str, token: &str) -> Option<String> {
    let resolved = strip_user_files(path)?;
    Some(format!(
        "/{}/{}/{}/{}",
        resolved.user, CACHE_SEGMENT, token, resolved.relative
    ))
}

/// Root of the scratch tree created by [`scratch_path`], removed as a whole
/// after write interception.
pub fn scratch_root(user: &str, token: &str) -> String {
    format!("/{user}/{CACHE_SEGMENT}/{token}")
}

/// Final path segment, if any.
pub fn file_name(path: &str) -> Option<&str> {
    segments(path).last().copied()
}

/// Matches partial/in-progress upload artifacts by file name. The pattern
/// set is a policy knob loaded from configuration, not a fixed rule.
#[derive(Debug, Clone)]
pub struct PartialUploadClassifier {
    patterns: Vec<Pattern>,
}

impl PartialUploadClassifier {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(pattern = %p, error = %e, "ignoring invalid partial-upload pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_partial(&self, path: &str) -> bool {
        match file_name(path) {
            Some(name) => self.patterns.iter().any(|p| p.matches(name)),
            None => false,
        }
    }
}

impl Default for PartialUploadClassifier {
    fn default() -> Self {
        Self::new(&["*.part".to_string()])
    }
}
