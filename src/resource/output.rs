//! Captured console: scripted stdin lines and recorded stdout/stderr.

#![allow(missing_docs)]

use std::collections::VecDeque;

use rand::Rng;
use rand::rngs::StdRng;

use crate::core::errors::{EqeError, Result};
use crate::generate::complexity::Complexity;
use crate::generate::defaults::random_alphanumeric;
use crate::model::types::TypeDesc;
use crate::model::value::Value;
use crate::resource::{Resource, ResourceProvider};

/// Provisioning name of the captured console.
pub const OUTPUT: &str = "output";

/// Console stand-in handed to implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    stdin: VecDeque<String>,
    stdout: String,
    stderr: String,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_input<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.stdin.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Decode generated content: a list of stdin lines.
    pub fn from_content(content: &Value) -> Result<Self> {
        let lines = content.as_list().ok_or_else(|| EqeError::Resource {
            resource: OUTPUT.to_string(),
            details: format!("content must be a list of lines, got {}", content.kind_name()),
        })?;
        let mut stdin = VecDeque::with_capacity(lines.len());
        for line in lines {
            let Some(text) = line.as_str() else {
                return Err(EqeError::Resource {
                    resource: OUTPUT.to_string(),
                    details: format!("stdin line must be a string, got {line}"),
                });
            };
            stdin.push_back(text.to_string());
        }
        Ok(Self {
            stdin,
            ..Self::default()
        })
    }

    /// Next stdin line, or `None` at end of input.
    pub fn read_line(&mut self) -> Option<String> {
        self.stdin.pop_front()
    }

    pub fn print(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    pub fn println(&mut self, text: &str) {
        self.stdout.push_str(text);
        self.stdout.push('\n');
    }

    pub fn eprint(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    pub fn eprintln(&mut self, text: &str) {
        self.stderr.push_str(text);
        self.stderr.push('\n');
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

impl Resource for CapturedOutput {
    fn snapshot(&self) -> Value {
        Value::record(
            OUTPUT,
            [
                ("stdout", Value::str(self.stdout.clone())),
                ("stderr", Value::str(self.stderr.clone())),
            ],
        )
    }
}

/// Provider for [`CapturedOutput`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputProvider;

impl ResourceProvider for OutputProvider {
    fn name(&self) -> &str {
        OUTPUT
    }

    fn content_type(&self) -> TypeDesc {
        TypeDesc::named(OUTPUT)
    }

    fn instantiate(&self, content: &Value) -> Result<Box<dyn Resource>> {
        Ok(Box::new(CapturedOutput::from_content(content)?))
    }

    fn simple_contents(&self) -> Vec<Value> {
        vec![Value::list([])]
    }

    fn random_content(&self, complexity: Complexity, rng: &mut StdRng) -> Option<Value> {
        let count = rng.random_range(0..=complexity.level() as usize);
        Some(Value::list(
            (0..count).map(|_| Value::str(random_alphanumeric(complexity, rng))),
        ))
    }
}
