//! Bibliography handling: citation fingerprints and tool selection.
//!
//! Both halves are pure functions over file contents so the convergence
//! logic can be tested without a TeX installation.

pub mod fingerprint;
pub mod select;

pub use fingerprint::{Fingerprint, fingerprint, fingerprint_file, read_aux_tree};
pub use select::{BibTool, select};
