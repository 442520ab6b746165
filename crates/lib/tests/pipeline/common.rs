//! Shared fixtures for pipeline tests.

use std::path::{Path, PathBuf};

use quire_lib::build::{BuildRequest, BuildService};
use quire_lib::config::BuildConfig;
use quire_lib::engine::{EngineClass, EngineSpec, ToolSpec};
use quire_lib::sync::SyncBridge;
use tempfile::TempDir;

/// Multi-pass stand-in: turns `\cite{..}` into aux directives (one aux file per
/// `\include`d chapter) and writes an artifact plus sync-map. Marker words in
/// the main file change behavior.
const ENGINE: &str = r#"
outdir="$1"
main="$2"
stem=$(basename "$main" .tex)
echo "$stem" >> "@TOOLS@/engine.calls"
if grep -q 'HANG' "$main"; then echo "hanging"; exec sleep 30; fi
if grep -q 'NOPDF' "$main"; then echo "! Emergency stop."; exit 1; fi
if grep -q 'SPAM' "$main"; then head -c 1200000 /dev/zero | tr '\0' 'x'; fi
: > "$outdir/$stem.aux"
for chapter in $(grep -o '\\include{[^}]*}' "$main" | sed 's/\\include{\(.*\)}/\1/'); do
  printf '\\@input{%s.aux}\n' "$chapter" >> "$outdir/$stem.aux"
  grep -o '\\cite{[^}]*}' "$chapter.tex" | sed 's/\\cite{\(.*\)}/\\citation{\1}/' > "$outdir/$chapter.aux"
done
grep -o '\\cite{[^}]*}' "$main" | sed 's/\\cite{\(.*\)}/\\citation{\1}/' >> "$outdir/$stem.aux"
printf '%%PDF-1.5 fake' > "$outdir/$stem.pdf"
printf 'synctex' > "$outdir/$stem.synctex.gz"
echo "Output written on $stem.pdf"
"#;

const BIBTOOL: &str = r#"
basename "$1" >> "@TOOLS@/bib.calls"
echo "This is fake BibTeX, BIBINPUTS=$BIBINPUTS"
printf 'resolved' > "$1.bbl"
"#;

const SYNCTEX: &str = r#"
case "$1" in
  view)
    echo "This is SyncTeX command line utility, version 1.5"
    echo "SyncTeX result begin"
    echo "Output:$5"
    echo "Page:1"
    echo "x:72.0"
    echo "y:98.0"
    echo "h:72.0"
    echo "v:100.5"
    echo "W:300.0"
    echo "H:10.0"
    echo "SyncTeX result end"
    ;;
  edit)
    echo "SyncTeX result begin"
    echo "Output:$3"
    echo "Input:$(pwd -P)/./paper.tex"
    echo "Line:3"
    echo "Column:-1"
    echo "SyncTeX result end"
    ;;
  *)
    echo "unknown command" >&2
    exit 2
    ;;
esac
"#;

pub const CITED: &str = "\\documentclass{article}\n\\begin{document}\nSee \\cite{a}.\n\\bibliography{refs}\n\\end{document}\n";

/// Isolated project, store and toolchain.
pub struct Project {
  pub temp: TempDir,
  pub root: PathBuf,
  pub tools: PathBuf,
  pub config: BuildConfig,
}

impl Project {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("project");
    let tools = temp.path().join("tools");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::create_dir_all(&tools).unwrap();
    let root = dunce::canonicalize(&root).unwrap();
    let tools = dunce::canonicalize(&tools).unwrap();

    let tools_str = tools.to_string_lossy().into_owned();
    for (name, script) in [("engine.sh", ENGINE), ("bib.sh", BIBTOOL), ("synctex.sh", SYNCTEX)] {
      std::fs::write(tools.join(name), script.replace("@TOOLS@", &tools_str)).unwrap();
    }

    let engine = script_path(&tools, "engine.sh");
    let bib = script_path(&tools, "bib.sh");
    let synctex = script_path(&tools, "synctex.sh");

    let mut config = BuildConfig {
      store_dir: temp.path().join("store"),
      scratch_dir: temp.path().join("scratch"),
      pass_timeout_secs: 20,
      lock_wait_secs: 60,
      ..BuildConfig::default()
    };
    config.engines.insert(
      "fake",
      EngineSpec::new(EngineClass::MultiPass, "/bin/sh", &[engine.as_str(), "{outdir}", "{main}"]),
    );
    config.engines.insert(
      "fakemk",
      EngineSpec::new(EngineClass::SelfConverging, "/bin/sh", &[engine.as_str(), "{outdir}", "{main}"]),
    );
    config.bibtex = ToolSpec::new("/bin/sh", &[bib.as_str(), "{outdir}/{stem}"]);
    config.biber = ToolSpec::new("/bin/sh", &[bib.as_str(), "{outdir}/{stem}"]);
    config.synctex = ToolSpec::new("/bin/sh", &[synctex.as_str()]);

    Self {
      temp,
      root,
      tools,
      config,
    }
  }

  pub fn write(&self, relative: &str, content: &str) {
    let path = self.root.join(relative);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
  }

  pub fn service(&self) -> BuildService {
    BuildService::new(self.config.clone())
  }

  pub fn bridge(&self) -> SyncBridge {
    SyncBridge::new(&self.config)
  }

  pub fn request(&self, engine: &str) -> BuildRequest {
    BuildRequest::new(&self.root, "paper.tex", engine).unwrap()
  }

  /// Number of engine invocations so far.
  pub fn engine_calls(&self) -> usize {
    count_lines(&self.tools.join("engine.calls"))
  }

  /// Number of bibliography tool invocations so far.
  pub fn bib_calls(&self) -> usize {
    count_lines(&self.tools.join("bib.calls"))
  }

  /// Entries left in the scratch parent directory.
  pub fn scratch_entries(&self) -> usize {
    std::fs::read_dir(&self.config.scratch_dir)
      .map(|entries| entries.count())
      .unwrap_or(0)
  }
}

pub fn count(haystack: &str, needle: &str) -> usize {
  haystack.matches(needle).count()
}

fn script_path(tools: &Path, name: &str) -> String {
  tools.join(name).to_string_lossy().into_owned()
}

fn count_lines(path: &Path) -> usize {
  std::fs::read_to_string(path)
    .map(|content| content.lines().count())
    .unwrap_or(0)
}
