//! `.dockerignore` handling for project uploads.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, warn};

/// Read patterns from a `.dockerignore` file, skipping comments and blank lines.
///
/// A missing file yields no patterns.
pub fn read_dockerignore_file(path: &Path) -> Vec<String> {
  let Ok(contents) = fs::read_to_string(path) else {
    return Vec::new();
  };
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone)]
struct Rule {
  matcher: GlobMatcher,
  /// Matches everything below a matched directory.
  children: GlobMatcher,
  negated: bool,
}

/// Ordered ignore rules. The last matching rule wins.
#[derive(Debug, Clone, Default)]
pub struct DockerIgnore {
  rules: Vec<Rule>,
}

impl DockerIgnore {
  /// Compile patterns. Invalid patterns are skipped with a warning.
  pub fn new<I, S>(patterns: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let rules = patterns
      .into_iter()
      .filter_map(|pattern| compile(pattern.as_ref()))
      .collect();
    Self { rules }
  }

  /// Load `.dockerignore` from `dir` and append `extra` patterns.
  pub fn load(dir: &Path, extra: &[String]) -> Self {
    let mut patterns = read_dockerignore_file(&dir.join(crate::consts::DOCKERIGNORE_FILE));
    debug!(patterns = patterns.len(), "loaded .dockerignore");
    patterns.extend(extra.iter().cloned());
    Self::new(patterns)
  }

  pub fn has_negations(&self) -> bool {
    self.rules.iter().any(|r| r.negated)
  }

  /// Whether `rel_path` (relative, `/` separated) should be left out.
  pub fn should_ignore(&self, rel_path: &str) -> bool {
    let rel_path = rel_path.trim_start_matches("./");
    let mut ignored = false;
    for rule in &self.rules {
      if rule.matcher.is_match(rel_path) || rule.children.is_match(rel_path) {
        ignored = !rule.negated;
      }
    }
    ignored
  }
}

fn compile(pattern: &str) -> Option<Rule> {
  let (negated, pattern) = match pattern.strip_prefix('!') {
    Some(rest) => (true, rest.trim()),
    None => (false, pattern),
  };
  let pattern = pattern.trim_start_matches("./").trim_start_matches('/').trim_end_matches('/');
  if pattern.is_empty() {
    return None;
  }

  let build = |p: &str| {
    GlobBuilder::new(p)
      .literal_separator(true)
      .build()
      .map(|g| g.compile_matcher())
  };
  match (build(pattern), build(&format!("{pattern}/**"))) {
    (Ok(matcher), Ok(children)) => Some(Rule {
      matcher,
      children,
      negated,
    }),
    (Err(e), _) | (_, Err(e)) => {
      warn!(pattern, error = %e, "ignoring invalid .dockerignore pattern");
      None
    }
  }
}
