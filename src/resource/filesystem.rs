//! In-memory filesystem resource: a map from path to bytes.

#![allow(missing_docs)]

use std::collections::BTreeMap;

use rand::Rng;
use rand::rngs::StdRng;

use crate::core::errors::{EqeError, Result};
use crate::generate::complexity::Complexity;
use crate::generate::defaults::random_alphanumeric;
use crate::model::implementation::Failure;
use crate::model::types::TypeDesc;
use crate::model::value::Value;
use crate::resource::{Resource, ResourceProvider};

/// Provisioning name of the built-in filesystem.
pub const FILESYSTEM: &str = "filesystem";

/// Failure kind raised for absent paths.
pub const NOT_FOUND: &str = "NotFound";

/// Failure kind raised when file content is not valid UTF-8 text.
pub const INVALID_DATA: &str = "InvalidData";

/// Path-to-bytes map with file-like accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFilesystem {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    /// Decode generated content: a map of path strings to bytes or text.
    pub fn from_content(content: &Value) -> Result<Self> {
        let entries = content.as_map().ok_or_else(|| EqeError::Resource {
            resource: FILESYSTEM.to_string(),
            details: format!("content must be a map, got {}", content.kind_name()),
        })?;

        let mut files = BTreeMap::new();
        for (path, data) in entries {
            let Some(path) = path.as_str() else {
                return Err(EqeError::Resource {
                    resource: FILESYSTEM.to_string(),
                    details: format!("path must be a string, got {path}"),
                });
            };
            let bytes = match data {
                Value::Bytes(bytes) => bytes.clone(),
                Value::Str(text) => text.as_bytes().to_vec(),
                other => {
                    return Err(EqeError::Resource {
                        resource: FILESYSTEM.to_string(),
                        details: format!("contents of {path} must be bytes or text, got {other}"),
                    });
                }
            };
            files.insert(path.to_string(), bytes);
        }
        Ok(Self { files })
    }

    /// Content value in canonical form (paths to bytes).
    pub fn to_value(&self) -> Value {
        Value::map(
            self.files
                .iter()
                .map(|(path, bytes)| (Value::str(path.clone()), Value::Bytes(bytes.clone()))),
        )
    }

    pub fn read(&self, path: &str) -> std::result::Result<Vec<u8>, Failure> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Failure::new(NOT_FOUND, path))
    }

    pub fn read_to_string(&self, path: &str) -> std::result::Result<String, Failure> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|err| Failure::new(INVALID_DATA, err.to_string()))
    }

    pub fn write(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn append(&mut self, path: impl Into<String>, contents: &[u8]) {
        self.files
            .entry(path.into())
            .or_default()
            .extend_from_slice(contents);
    }

    pub fn remove(&mut self, path: &str) -> std::result::Result<Vec<u8>, Failure> {
        self.files
            .remove(path)
            .ok_or_else(|| Failure::new(NOT_FOUND, path))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl Resource for VirtualFilesystem {
    fn snapshot(&self) -> Value {
        self.to_value()
    }
}

/// Provider for [`VirtualFilesystem`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemProvider;

impl ResourceProvider for FilesystemProvider {
    fn name(&self) -> &str {
        FILESYSTEM
    }

    fn content_type(&self) -> TypeDesc {
        TypeDesc::named(FILESYSTEM)
    }

    fn instantiate(&self, content: &Value) -> Result<Box<dyn Resource>> {
        Ok(Box::new(VirtualFilesystem::from_content(content)?))
    }

    fn simple_contents(&self) -> Vec<Value> {
        vec![VirtualFilesystem::new().to_value()]
    }

    fn random_content(&self, complexity: Complexity, rng: &mut StdRng) -> Option<Value> {
        let count = rng.random_range(0..=complexity.level() as usize);
        let mut fs = VirtualFilesystem::new();
        for index in 0..count {
            let text = random_alphanumeric(complexity, rng);
            fs.write(format!("/file{index}.txt"), text.into_bytes());
        }
        Some(fs.to_value())
    }
}
