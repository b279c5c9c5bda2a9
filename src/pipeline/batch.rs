use std::collections::HashSet;

use crate::catalog::{Source, SourceConfigError};

/// The sources observed by one run. Keys are validated and unique, so no two
/// pipelines of a batch ever write to the same namespace.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    sources: Vec<Source>,
}

impl Batch {
    pub fn new(sources: Vec<Source>) -> Result<Self, SourceConfigError> {
        let mut seen = HashSet::new();
        for source in &sources {
            source.validate_key()?;
            if !seen.insert(source.key.as_str()) {
                return Err(SourceConfigError::DuplicateKey(source.key.clone()));
            }
        }
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Narrows the batch to `keys`, keeping configuration order.
    pub fn select(&self, keys: &[String]) -> Result<Self, SourceConfigError> {
        for key in keys {
            if !self.sources.iter().any(|s| &s.key == key) {
                return Err(SourceConfigError::UnknownKey(key.clone()));
            }
        }
        let sources = self
            .sources
            .iter()
            .filter(|s| keys.contains(&s.key))
            .cloned()
            .collect();
        Ok(Self { sources })
    }
}
