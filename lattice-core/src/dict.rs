use indexmap::IndexMap;

use crate::error::LatticeCoreError;
use crate::variable::Variable;

/// Insertion-ordered mapping from name to [`Variable`], used for coords, masks and attrs
#[derive(Debug, Clone, Default)]
pub struct Dict {
    items: IndexMap<String, Variable>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.items.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.items.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    /// Insert or replace, keeping the position of a replaced entry
    pub fn insert(&mut self, name: &str, value: Variable) -> Option<Variable> {
        self.items.insert(name.to_string(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.items.shift_remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Variable) -> bool) {
        self.items.retain(|k, v| keep(k, v));
    }

    /// Or-combination of all entries that depend on `dim`, `None` if there are none
    pub fn irreducible_mask(&self, dim: &str) -> Result<Option<Variable>, LatticeCoreError> {
        let mut combined: Option<Variable> = None;
        for (_, mask) in self.iter().filter(|(_, mask)| mask.has_dim(dim)) {
            combined = Some(match combined {
                None => mask.clone(),
                Some(acc) => acc.logical_or(mask)?,
            });
        }
        Ok(combined)
    }

    /// Entries equal in both name and value
    pub fn identical(&self, other: &Dict) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(name, value)| other.get(name).is_some_and(|o| o.identical(value)))
    }
}

impl FromIterator<(String, Variable)> for Dict {
    fn from_iter<T: IntoIterator<Item = (String, Variable)>>(iter: T) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
