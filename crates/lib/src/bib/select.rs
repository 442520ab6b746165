//! Bibliography tool selection.

use serde::{Deserialize, Serialize};

/// Marker biblatex writes into aux files.
const BIBLATEX_AUX_MARKER: &str = "\\abx@aux@";

const CITATION_DIRECTIVE: &str = "\\citation{";

const PACKAGE_COMMANDS: &[&str] = &["\\usepackage", "\\RequirePackage"];

/// Which bibliography processor a document needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibTool {
  None,
  Bibtex,
  Biber,
}

impl BibTool {
  pub fn as_str(&self) -> &'static str {
    match self {
      BibTool::None => "none",
      BibTool::Bibtex => "bibtex",
      BibTool::Biber => "biber",
    }
  }
}

impl std::fmt::Display for BibTool {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Pick the bibliography tool from the aux file and main file contents.
///
/// biblatex documents get biber unless they load biblatex with a bibtex
/// backend. Other documents get bibtex when they cite anything.
pub fn select(aux: &str, main: &str) -> BibTool {
  if let Some(options) = biblatex_options(main) {
    return if uses_bibtex_backend(&options) {
      BibTool::Bibtex
    } else {
      BibTool::Biber
    };
  }

  if aux.contains(BIBLATEX_AUX_MARKER) {
    return BibTool::Biber;
  }

  if aux.lines().any(|line| line.trim_start().starts_with(CITATION_DIRECTIVE)) {
    return BibTool::Bibtex;
  }

  BibTool::None
}

/// If the source loads biblatex, return the option list it was loaded with.
fn biblatex_options(source: &str) -> Option<String> {
  let code = strip_comments(source);

  for command in PACKAGE_COMMANDS {
    let mut rest = code.as_str();
    while let Some(idx) = rest.find(command) {
      rest = &rest[idx + command.len()..];
      let Some((options, packages, after)) = parse_package_args(rest) else {
        continue;
      };
      if packages.split(',').any(|p| p.trim() == "biblatex") {
        return Some(options.to_string());
      }
      rest = after;
    }
  }

  None
}

/// Parse `[options]{packages}` at the start of `input`, allowing whitespace
/// between the parts. Returns the options, the package list and the rest.
fn parse_package_args(input: &str) -> Option<(&str, &str, &str)> {
  let mut rest = input.trim_start();
  let mut options = "";

  if let Some(after) = rest.strip_prefix('[') {
    let end = after.find(']')?;
    options = &after[..end];
    rest = after[end + 1..].trim_start();
  }

  let after = rest.strip_prefix('{')?;
  let end = after.find('}')?;
  Some((options, &after[..end], &after[end + 1..]))
}

fn uses_bibtex_backend(options: &str) -> bool {
  options.split(',').any(|opt| {
    let Some((key, value)) = opt.split_once('=') else {
      return false;
    };
    key.trim() == "backend" && value.trim().starts_with("bibtex")
  })
}

/// Drop `%` comments, keeping escaped `\%`.
fn strip_comments(source: &str) -> String {
  let mut out = String::with_capacity(source.len());
  for line in source.lines() {
    let mut prev_backslash = false;
    let mut end = line.len();
    for (idx, ch) in line.char_indices() {
      if ch == '%' && !prev_backslash {
        end = idx;
        break;
      }
      prev_backslash = ch == '\\' && !prev_backslash;
    }
    out.push_str(&line[..end]);
    out.push('\n');
  }
  out
}
