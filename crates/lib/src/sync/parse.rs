//! Parser for `synctex view` / `synctex edit` output.
//!
//! ```text
//! output  := preamble? section*
//! section := BEGIN record* END?
//! record  := "Output:" value NL (kv NL)*
//! kv      := key ":" value
//! ```
//!
//! Text without any BEGIN line is read as a single section. Within a
//! section a record ends at the next `Output:` line or when a key repeats.
//! Lines without a colon are ignored, so truncated or noisy output degrades
//! to fewer records instead of an error.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use super::{RenderPosition, SourcePosition};

pub const BEGIN_MARKER: &str = "SyncTeX result begin";
pub const END_MARKER: &str = "SyncTeX result end";

const OUTPUT_KEY: &str = "Output";

/// Key/value fields of one result block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<String, String>);

impl Record {
  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(key).map(String::as_str)
  }

  fn number<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
    self.get(key)?.parse().ok()
  }

  fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Split tool output into records.
pub fn parse_records(text: &str) -> Vec<Record> {
  let delimited = text.lines().any(|line| line.trim() == BEGIN_MARKER);
  let mut inside = !delimited;
  let mut records = Vec::new();
  let mut current = Record::default();

  for line in text.lines().map(str::trim) {
    if line == BEGIN_MARKER {
      flush(&mut records, &mut current);
      inside = true;
      continue;
    }
    if line == END_MARKER {
      flush(&mut records, &mut current);
      inside = false;
      continue;
    }
    if !inside {
      continue;
    }

    let Some((key, value)) = line.split_once(':') else {
      continue;
    };
    let key = key.trim();
    if key.is_empty() {
      continue;
    }
    if key == OUTPUT_KEY || current.0.contains_key(key) {
      flush(&mut records, &mut current);
    }
    current.0.insert(key.to_string(), value.trim().to_string());
  }

  flush(&mut records, &mut current);
  records
}

fn flush(records: &mut Vec<Record>, current: &mut Record) {
  if !current.is_empty() {
    records.push(std::mem::take(current));
  }
}

/// Rendered positions from `synctex view` records.
///
/// Records without a numeric `Page` are dropped; missing box coordinates
/// read as zero.
pub fn forward_hits(records: &[Record]) -> Vec<RenderPosition> {
  records
    .iter()
    .filter_map(|record| {
      Some(RenderPosition {
        page: record.number("Page")?,
        x: record.number("h").unwrap_or(0.0),
        y: record.number("v").unwrap_or(0.0),
        w: record.number("W").unwrap_or(0.0),
        h: record.number("H").unwrap_or(0.0),
      })
    })
    .collect()
}

/// Source positions from `synctex edit` records.
///
/// Records without an `Input` or a numeric `Line` are dropped. A missing
/// column reads as `-1`, the tool's own "unknown". Input paths under `root`
/// are returned relative to it.
pub fn inverse_hits(records: &[Record], root: &Path) -> Vec<SourcePosition> {
  records
    .iter()
    .filter_map(|record| {
      let input = record.get("Input").filter(|input| !input.is_empty())?;
      Some(SourcePosition {
        file: relative_to_root(input, root),
        line: record.number("Line")?,
        column: record.number("Column").unwrap_or(-1),
      })
    })
    .collect()
}

fn relative_to_root(input: &str, root: &Path) -> String {
  let path = strip_cur_dir(Path::new(input));
  let roots = [Some(strip_cur_dir(root)), dunce::canonicalize(root).ok()];

  for root in roots.iter().flatten() {
    if let Ok(relative) = path.strip_prefix(root)
      && !relative.as_os_str().is_empty()
    {
      return relative.to_string_lossy().into_owned();
    }
  }
  path.to_string_lossy().into_owned()
}

fn strip_cur_dir(path: &Path) -> PathBuf {
  path.components().filter(|c| *c != Component::CurDir).collect()
}
