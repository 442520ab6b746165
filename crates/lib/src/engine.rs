//! Engine and tool command templates.
//!
//! Which engines exist, how they are invoked and whether they converge on
//! their own is configuration data. The defaults cover the usual TeX
//! toolchain; a config file can add engines or repoint existing ones.
//!
//! # Placeholders
//!
//! Arguments may contain these placeholders, substituted per invocation:
//!
//! - `{outdir}` - the job's scratch output directory
//! - `{main}` - the main file, relative to the project root
//! - `{stem}` - the main file's base name without extension
//! - `{root}` - the project root

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// How an engine reaches a stable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineClass {
  /// Iterates internally; one external invocation is enough.
  SelfConverging,
  /// Needs repeated passes and possibly a bibliography tool.
  MultiPass,
}

impl EngineClass {
  pub fn as_str(&self) -> &'static str {
    match self {
      EngineClass::SelfConverging => "self-converging",
      EngineClass::MultiPass => "multi-pass",
    }
  }
}

impl std::fmt::Display for EngineClass {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A program plus argument templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

impl ToolSpec {
  pub fn new(program: &str, args: &[&str]) -> Self {
    Self {
      program: program.to_string(),
      args: args.iter().map(|a| a.to_string()).collect(),
    }
  }

  /// Arguments with every placeholder substituted.
  pub fn render_args(&self, vars: &TemplateVars) -> Vec<String> {
    self.args.iter().map(|arg| vars.render(arg)).collect()
  }
}

/// An engine entry: its class and its command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSpec {
  pub class: EngineClass,
  #[serde(flatten)]
  pub tool: ToolSpec,
}

impl EngineSpec {
  pub fn new(class: EngineClass, program: &str, args: &[&str]) -> Self {
    Self {
      class,
      tool: ToolSpec::new(program, args),
    }
  }
}

const LATEX_ARGS: &[&str] = &[
  "-interaction=nonstopmode",
  "-file-line-error",
  "-synctex=1",
  "-output-directory={outdir}",
  "{main}",
];

/// Engine name to engine spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineTable(BTreeMap<String, EngineSpec>);

impl Default for EngineTable {
  fn default() -> Self {
    let mut table = BTreeMap::new();
    table.insert(
      "latexmk".to_string(),
      EngineSpec::new(
        EngineClass::SelfConverging,
        "latexmk",
        &[
          "-pdf",
          "-interaction=nonstopmode",
          "-file-line-error",
          "-synctex=1",
          "-outdir={outdir}",
          "{main}",
        ],
      ),
    );
    table.insert(
      "tectonic".to_string(),
      EngineSpec::new(
        EngineClass::SelfConverging,
        "tectonic",
        &["--synctex", "--keep-intermediates", "--outdir", "{outdir}", "{main}"],
      ),
    );
    for engine in ["pdflatex", "xelatex", "lualatex"] {
      table.insert(
        engine.to_string(),
        EngineSpec::new(EngineClass::MultiPass, engine, LATEX_ARGS),
      );
    }
    Self(table)
  }
}

impl EngineTable {
  pub fn empty() -> Self {
    Self(BTreeMap::new())
  }

  pub fn get(&self, name: &str) -> Option<&EngineSpec> {
    self.0.get(name)
  }

  pub fn insert(&mut self, name: impl Into<String>, spec: EngineSpec) {
    self.0.insert(name.into(), spec);
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &EngineSpec)> {
    self.0.iter().map(|(name, spec)| (name.as_str(), spec))
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Layer `overrides` on top of this table; entries with the same name
  /// replace the existing ones.
  pub fn overlay(mut self, overrides: EngineTable) -> Self {
    self.0.extend(overrides.0);
    self
  }
}

/// Values substituted into argument templates.
#[derive(Debug, Clone)]
pub struct TemplateVars {
  pub outdir: String,
  pub main: String,
  pub stem: String,
  pub root: String,
}

impl TemplateVars {
  pub fn new(outdir: &Path, main: &Path, stem: &str, root: &Path) -> Self {
    Self {
      outdir: outdir.to_string_lossy().into_owned(),
      main: main.to_string_lossy().into_owned(),
      stem: stem.to_string(),
      root: root.to_string_lossy().into_owned(),
    }
  }

  /// Substitute placeholders in one argument. Unknown `{...}` sequences are
  /// left untouched.
  pub fn render(&self, template: &str) -> String {
    template
      .replace("{outdir}", &self.outdir)
      .replace("{main}", &self.main)
      .replace("{stem}", &self.stem)
      .replace("{root}", &self.root)
  }
}
