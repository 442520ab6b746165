//! Citation fingerprints of `.aux` files.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Line prefixes that declare citations or bibliography inputs.
const DIRECTIVES: &[&str] = &["\\citation{", "\\bibdata{", "\\bibstyle{", "\\abx@aux@cite"];

/// Order-independent summary of the citation directives in an aux file.
///
/// The empty fingerprint means "no prior data" and never counts as a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// True when both sides carry data and the data is identical.
  pub fn matches(&self, other: &Fingerprint) -> bool {
    !self.is_empty() && self == other
  }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Fingerprint aux file content: the sorted, de-duplicated directive lines.
pub fn fingerprint(aux: &str) -> Fingerprint {
  let lines: BTreeSet<&str> = aux
    .lines()
    .map(str::trim)
    .filter(|line| DIRECTIVES.iter().any(|d| line.starts_with(d)))
    .collect();

  Fingerprint(lines.into_iter().collect::<Vec<_>>().join("\n"))
}

/// Fingerprint the aux file at `path` together with the aux files it pulls
/// in; a missing or unreadable main aux yields the empty fingerprint.
pub fn fingerprint_file(path: &Path) -> Fingerprint {
  read_aux_tree(path).map(|aux| fingerprint(&aux)).unwrap_or_default()
}

/// Nesting limit for `\@input{..}` lines.
const MAX_INCLUDE_DEPTH: usize = 8;

/// Contents of the aux file at `path` followed by every aux file reachable
/// through its `\@input{..}` lines, which is where `\include`d chapters
/// record their citations. Included names resolve against the directory of
/// the including file; missing ones are skipped.
pub fn read_aux_tree(path: &Path) -> Option<String> {
  let mut combined = String::new();
  let mut seen = BTreeSet::new();
  append_aux(path, 0, &mut seen, &mut combined).then_some(combined)
}

fn append_aux(path: &Path, depth: usize, seen: &mut BTreeSet<PathBuf>, out: &mut String) -> bool {
  if !seen.insert(path.to_path_buf()) {
    return true;
  }
  let content = match std::fs::read(path) {
    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
    Err(e) => {
      if e.kind() != io::ErrorKind::NotFound {
        debug!(path = %path.display(), error = %e, "unreadable aux file");
      }
      return false;
    }
  };
  out.push_str(&content);
  out.push('\n');

  if depth >= MAX_INCLUDE_DEPTH {
    debug!(path = %path.display(), "aux includes nested too deeply, not following");
    return true;
  }
  let dir = path.parent().unwrap_or(Path::new(""));
  for name in included_aux(&content) {
    append_aux(&dir.join(name), depth + 1, seen, out);
  }
  true
}

fn included_aux(aux: &str) -> impl Iterator<Item = &str> {
  aux
    .lines()
    .filter_map(|line| line.trim().strip_prefix("\\@input{")?.strip_suffix('}'))
    .filter(|name| !name.is_empty())
}
