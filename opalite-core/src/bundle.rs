//! Deterministic concatenation of emitted units into one artifact.

use std::fmt;

use crate::codegen_js::js_string;
use crate::requires::DependencyEdge;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Compiled unit registered in the runtime module table.
    Module,
    /// Native JavaScript copied verbatim.
    Native,
    /// The anonymous entry, always last.
    Entry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleUnit {
    pub logical: String,
    pub kind: UnitKind,
    pub javascript: String,
    /// Loaded before everything else that follows it.
    pub preload: bool,
}

/// A finished bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    text: String,
    units: Vec<String>,
    edges: Vec<DependencyEdge>,
}

impl Artifact {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Logical names of the included units, in emission order.
    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn contains(&self, logical: &str) -> bool {
        self.units.iter().any(|unit| unit == logical)
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

pub fn assemble(units: Vec<BundleUnit>, edges: Vec<DependencyEdge>, banner: bool) -> Artifact {
    let mut text = String::new();
    if banner {
        text.push_str(&format!("/* opalite bundle: {} units */\n", units.len()));
    }
    let mut names = Vec::with_capacity(units.len());
    for unit in units {
        text.push_str(&unit.javascript);
        if !unit.javascript.ends_with('\n') {
            text.push('\n');
        }
        if unit.preload && unit.kind == UnitKind::Module {
            text.push_str(&format!("Opal.require({});\n", js_string(&unit.logical)));
        }
        names.push(unit.logical);
    }
    Artifact {
        text,
        units: names,
        edges,
    }
}
