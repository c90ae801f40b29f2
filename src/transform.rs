//! Named value transforms for insertValue commands.
//!
//! Builtins: `upper`, `lower`, `trim`, `title`. Register more through [`TRANSFORMS`]:
//!
//! ```rust
//! use doccmd_core::transform::TRANSFORMS;
//!
//! TRANSFORMS.insert("initials", |value: &str| {
//!     value
//!         .split_whitespace()
//!         .filter_map(|word| word.chars().next())
//!         .collect()
//! });
//! assert_eq!(TRANSFORMS.apply("initials", "Ada King Lovelace").unwrap(), "AKL");
//! ```

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::DocCmdError;

pub type TransformFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Global transform registry with the builtin transforms.
pub static TRANSFORMS: Lazy<TransformMap> = Lazy::new(TransformMap::create);

fn entry<F>(name: &str, f: F) -> (String, TransformFn)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    (name.to_string(), Arc::new(f))
}

#[derive(Clone)]
pub struct TransformMap(Arc<RwLock<Vec<(String, TransformFn)>>>);

impl TransformMap {
    pub fn create() -> Self {
        let builtins = vec![
            entry("upper", |v: &str| v.to_uppercase()),
            entry("lower", |v: &str| v.to_lowercase()),
            entry("trim", |v: &str| v.trim().to_string()),
            entry("title", titlecase::titlecase),
        ];
        TransformMap(Arc::new(RwLock::new(builtins)))
    }

    /// Registers `f` under `name`, replacing any transform of that name.
    pub fn insert<F>(&self, name: &str, f: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        let mut writer = self.0.write();
        let (name, f) = entry(name, f);
        if let Some(existing) = writer.iter_mut().find(|(n, _)| *n == name) {
            existing.1 = f;
        } else {
            writer.push((name, f));
        }
    }

    /// Transform names are matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<TransformFn> {
        let reader = self.0.read();
        reader
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| f.clone())
    }

    pub fn names(&self) -> Vec<String> {
        self.0.read().iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn apply(&self, name: &str, value: &str) -> Result<String, DocCmdError> {
        let f = self
            .get(name)
            .ok_or_else(|| DocCmdError::NotFound(format!("transform '{name}'")))?;
        Ok(f(value))
    }
}
