use std::collections::BTreeMap;
use thiserror::Error;

/// Append-only map from configuration names to implementations, resolved once
/// at startup.
pub struct Registry<T: ?Sized> {
    entries: BTreeMap<String, Box<T>>,
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
    pub fn register(&mut self, name: impl Into<String>, item: Box<T>) -> Result<(), RegistryError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.entries.insert(name, item);
        Ok(())
    }
    pub fn get(&self, name: &str) -> Result<&T, RegistryError> {
        self.entries.get(name).map(Box::as_ref).ok_or_else(|| RegistryError::UnknownKey {
            key: name.to_string(),
            known: self.entries.keys().cloned().collect(),
        })
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown key {key:?}, expected one of {known:?}")]
    UnknownKey { key: String, known: Vec<String> },
    #[error("{0:?} is already registered")]
    Duplicate(String),
}
