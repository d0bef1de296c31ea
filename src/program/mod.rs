// src/program/mod.rs — Program and Function model, text conversion
//
// A Program is a full translation unit: a preface (imports, helpers, constants)
// followed by top-level functions. The first function is the one under
// evolution. All conversions are pure and return `None` instead of failing loudly.

pub mod parser;
pub mod trim;

use serde::{Deserialize, Serialize};

pub use parser::{is_balanced, text_to_function, text_to_program};
pub use trim::trim_sample;

/// The unit under evolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub args: String,
    pub return_type: Option<String>,
    /// Inner text of the docstring, without the surrounding quotes.
    pub docstring: Option<String>,
    /// Indented body lines, no trailing newline.
    pub body: String,
}

impl Function {
    /// The `def` line, e.g. `def priority(item: float, n: int) -> float:`.
    pub fn header(&self) -> String {
        match &self.return_type {
            Some(ret) => format!("def {}({}) -> {}:", self.name, self.args, ret),
            None => format!("def {}({}):", self.name, self.args),
        }
    }

    /// Same function under another name (prompt versioning).
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Rendered length in bytes; shorter programs are preferred within a cluster.
    pub fn source_len(&self) -> usize {
        self.to_string().len()
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.header())?;
        if let Some(doc) = &self.docstring {
            writeln!(f, "    \"\"\"{}\"\"\"", doc)?;
        }
        if !self.body.is_empty() {
            writeln!(f, "{}", self.body)?;
        }
        Ok(())
    }
}

/// A complete executable program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub preface: String,
    pub functions: Vec<Function>,
}

impl Program {
    /// The function under evolution.
    pub fn function_to_evolve(&self) -> Option<&Function> {
        self.functions.first()
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let preface = self.preface.trim_end();
        if !preface.is_empty() {
            write!(f, "{}\n\n\n", preface)?;
        }
        for (i, function) in self.functions.iter().enumerate() {
            if i > 0 {
                write!(f, "\n\n")?;
            }
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}

/// Re-derive the function under evolution from a program's rendered source.
/// Fails when the program no longer renders to something parseable.
pub fn program_to_function(program: &Program) -> Option<Function> {
    text_to_function(&program.to_string())
}

/// Build a candidate program from raw sampler output: trim the sample down to
/// a function body and splice it into a copy of `template`.
pub fn sample_to_program(sample: &str, template: &Program) -> Option<Program> {
    let body = trim_sample(sample)?;
    let mut program = template.clone();
    program.functions.first_mut()?.body = body;
    // Round-trip through the parser so the candidate is known to be well-formed
    text_to_program(&program.to_string())
}
