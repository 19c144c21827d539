use indexmap::IndexMap;

use crate::data_array::DataArray;
use crate::dict::Dict;
use crate::error::LatticeCoreError;
use crate::sizes::Sizes;
use crate::variable::Variable;

/// Items sharing one set of coords.
///
/// Items are stored without coords; [`Dataset::get`] attaches every dataset coord
/// whose dims the item has.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    sizes: Sizes,
    coords: Dict,
    items: IndexMap<String, DataArray>,
}

fn fits(sizes: &Sizes, value: &Variable) -> bool {
    value.sizes().iter().all(|(dim, len)| match sizes.get(dim) {
        Some(n) => len == n || len == n + 1,
        None => false,
    })
}

impl Dataset {
    /// Dataset from data arrays, whose coords are merged and must agree by name
    pub fn from_items(
        items: impl IntoIterator<Item = (String, DataArray)>,
    ) -> Result<Self, LatticeCoreError> {
        let mut out = Self::default();
        for (name, item) in items {
            out.insert(&name, item)?;
        }
        Ok(out)
    }

    /// Dataset without items
    pub fn from_coords(sizes: Sizes, coords: Dict) -> Result<Self, LatticeCoreError> {
        let mut out = Self {
            sizes,
            ..Default::default()
        };
        for (name, value) in coords.iter() {
            out.set_coord(name, value.clone())?;
        }
        Ok(out)
    }

    pub fn insert(&mut self, name: &str, item: DataArray) -> Result<(), LatticeCoreError> {
        self.sizes = self.sizes.merge(item.sizes())?;
        let mut item = item;
        for (coord_name, value) in item.coords().clone().iter() {
            match self.coords.get(coord_name) {
                Some(existing) if !existing.identical(value) => {
                    return Err(LatticeCoreError::dims(format!(
                        "Coord `{coord_name}` of item `{name}` does not match the dataset coord"
                    )));
                }
                Some(_) => {}
                None => self.set_coord(coord_name, value.clone())?,
            }
            item.remove_coord(coord_name);
        }
        self.items.insert(name.to_string(), item);
        Ok(())
    }

    pub fn set_coord(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        if !fits(&self.sizes, &value) {
            return Err(LatticeCoreError::dims(format!(
                "Coord `{name}` with dims {:?} does not fit dataset sizes {:?}",
                value.dims(),
                self.sizes.iter().collect::<Vec<_>>()
            )));
        }
        self.coords.insert(name, value);
        Ok(())
    }

    pub fn sizes(&self) -> &Sizes {
        &self.sizes
    }

    pub fn coords(&self) -> &Dict {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(|k| k.as_str())
    }

    /// Item `name` with the applicable dataset coords attached
    pub fn get(&self, name: &str) -> Result<DataArray, LatticeCoreError> {
        let item = self
            .items
            .get(name)
            .ok_or_else(|| LatticeCoreError::NotFound(name.to_string()))?;
        let mut out = item.clone();
        for (coord_name, value) in self.coords.iter() {
            if fits(item.sizes(), value) {
                out.set_coord(coord_name, value.clone())?;
            }
        }
        Ok(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Result<DataArray, LatticeCoreError>)> {
        self.names().map(|name| (name, self.get(name)))
    }
}
