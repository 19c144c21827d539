use indexmap::IndexMap;

use crate::bins::Bins;
use crate::dict::Dict;
use crate::error::LatticeCoreError;
use crate::sizes::Sizes;
use crate::variable::{DType, Variable};

/// Data plus named coords, masks and attrs that are aligned with it
#[derive(Debug, Clone)]
pub struct DataArray {
    data: Variable,
    coords: Dict,
    masks: Dict,
    attrs: Dict,
}

/// Metadata fits if each of its dims has the data length, that length plus one
/// (bin edges), or is absent from the data with length two (edges of a dim that
/// was sliced out).
fn check_meta(sizes: &Sizes, name: &str, value: &Variable) -> Result<(), LatticeCoreError> {
    for (dim, len) in value.sizes().iter() {
        let fits = match sizes.get(dim) {
            Some(n) => len == n || len == n + 1,
            None => len == 2,
        };
        if !fits {
            return Err(LatticeCoreError::dims(format!(
                "`{name}` with sizes {:?} does not fit data sizes {:?}",
                value.sizes().iter().collect::<Vec<_>>(),
                sizes.iter().collect::<Vec<_>>()
            )));
        }
    }
    Ok(())
}

fn map_dict(
    dict: &Dict,
    mut f: impl FnMut(&str, &Variable) -> Result<Variable, LatticeCoreError>,
) -> Result<Dict, LatticeCoreError> {
    dict.iter()
        .map(|(name, value)| Ok((name.to_string(), f(name, value)?)))
        .collect()
}

impl DataArray {
    pub fn new(data: Variable) -> Self {
        Self {
            data,
            coords: Dict::new(),
            masks: Dict::new(),
            attrs: Dict::new(),
        }
    }

    pub fn with_coord(mut self, name: &str, value: Variable) -> Result<Self, LatticeCoreError> {
        self.set_coord(name, value)?;
        Ok(self)
    }

    pub fn with_mask(mut self, name: &str, value: Variable) -> Result<Self, LatticeCoreError> {
        self.set_mask(name, value)?;
        Ok(self)
    }

    pub fn with_attr(mut self, name: &str, value: Variable) -> Result<Self, LatticeCoreError> {
        self.set_attr(name, value)?;
        Ok(self)
    }

    pub fn data(&self) -> &Variable {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut Variable {
        &mut self.data
    }

    /// Replace the data, which must keep the current sizes
    pub fn set_data(&mut self, data: Variable) -> Result<(), LatticeCoreError> {
        if data.sizes() != self.data.sizes() {
            return Err(LatticeCoreError::dims(format!(
                "New data has dims {:?}, expected {:?}",
                data.dims(),
                self.dims()
            )));
        }
        self.data = data;
        Ok(())
    }

    pub fn sizes(&self) -> &Sizes {
        self.data.sizes()
    }

    pub fn dims(&self) -> Vec<&str> {
        self.data.dims()
    }

    pub fn coords(&self) -> &Dict {
        &self.coords
    }

    pub fn masks(&self) -> &Dict {
        &self.masks
    }

    pub fn attrs(&self) -> &Dict {
        &self.attrs
    }

    pub fn set_coord(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        check_meta(self.sizes(), name, &value)?;
        self.coords.insert(name, value);
        Ok(())
    }

    pub fn set_attr(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        check_meta(self.sizes(), name, &value)?;
        self.attrs.insert(name, value);
        Ok(())
    }

    pub fn set_mask(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        if value.dtype() != DType::Boolean {
            return Err(LatticeCoreError::DTypeError(format!(
                "Mask `{name}` must be boolean, got {:?}",
                value.dtype()
            )));
        }
        check_meta(self.sizes(), name, &value)?;
        self.masks.insert(name, value);
        Ok(())
    }

    pub fn remove_coord(&mut self, name: &str) -> Option<Variable> {
        self.coords.remove(name)
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Variable> {
        self.attrs.remove(name)
    }

    pub fn remove_mask(&mut self, name: &str) -> Option<Variable> {
        self.masks.remove(name)
    }

    /// Coord or, failing that, attr
    pub fn meta(&self, name: &str) -> Option<&Variable> {
        self.coords.get(name).or_else(|| self.attrs.get(name))
    }

    /// Whether `name` is a coord or attr, dense or per event
    pub fn has_meta(&self, name: &str) -> bool {
        self.meta(name).is_some() || self.bins().is_some_and(|bins| bins.contains_meta(name))
    }

    pub fn bins(&self) -> Option<&Bins> {
        self.data.bins()
    }

    pub fn bins_mut(&mut self) -> Option<&mut Bins> {
        self.data.bins_mut()
    }

    /// Select `indices` along `dim` in data and all metadata depending on it
    pub fn take(&self, dim: &str, indices: &[usize]) -> Result<Self, LatticeCoreError> {
        let len = self.sizes().get(dim);
        let select = |name: &str, value: &Variable| match value.sizes().get(dim) {
            None => Ok(value.clone()),
            Some(n) if Some(n) == len => value.take(dim, indices),
            Some(_) => Err(LatticeCoreError::dims(format!(
                "Cannot select from bin edges `{name}` by index"
            ))),
        };
        Ok(Self {
            data: self.data.take(dim, indices)?,
            coords: map_dict(&self.coords, select)?,
            masks: map_dict(&self.masks, select)?,
            attrs: map_dict(&self.attrs, select)?,
        })
    }

    /// Half-open positional range along `dim`, bin edges keep one extra element
    pub fn slice_range(&self, dim: &str, start: usize, end: usize) -> Result<Self, LatticeCoreError> {
        let len = self.sizes().get(dim);
        let select = |_: &str, value: &Variable| match value.sizes().get(dim) {
            None => Ok(value.clone()),
            Some(n) if Some(n) == len => value.slice_range(dim, start, end),
            Some(_) => value.slice_range(dim, start, end + 1),
        };
        Ok(Self {
            data: self.data.slice_range(dim, start, end)?,
            coords: map_dict(&self.coords, select)?,
            masks: map_dict(&self.masks, select)?,
            attrs: map_dict(&self.attrs, select)?,
        })
    }

    /// Select one position along `dim`, dropping it.
    ///
    /// Coords depending on `dim` no longer describe an axis of the result and are
    /// moved to the attrs. Bin edges keep the two edges of the selected bin.
    pub fn slice_index(&self, dim: &str, index: usize) -> Result<Self, LatticeCoreError> {
        let len = self.sizes().get(dim);
        let select = |_: &str, value: &Variable| match value.sizes().get(dim) {
            None => Ok(value.clone()),
            Some(n) if Some(n) == len => value.slice_index(dim, index),
            Some(_) => value.slice_range(dim, index, index + 2),
        };
        let mut out = Self {
            data: self.data.slice_index(dim, index)?,
            coords: Dict::new(),
            masks: map_dict(&self.masks, select)?,
            attrs: map_dict(&self.attrs, select)?,
        };
        for (name, value) in self.coords.iter() {
            if value.has_dim(dim) {
                out.attrs.insert(name, select(name, value)?);
            } else {
                out.coords.insert(name, value.clone());
            }
        }
        Ok(out)
    }

    pub fn rename_dims(&self, renames: &IndexMap<String, String>) -> Result<Self, LatticeCoreError> {
        let rename = |_: &str, value: &Variable| value.rename_dims(renames);
        Ok(Self {
            data: self.data.rename_dims(renames)?,
            coords: map_dict(&self.coords, rename)?,
            masks: map_dict(&self.masks, rename)?,
            attrs: map_dict(&self.attrs, rename)?,
        })
    }

    /// Same structure and independent metadata, data values unspecified
    pub fn empty_like(&self) -> Result<Self, LatticeCoreError> {
        Ok(Self {
            data: self.data.empty_like()?,
            coords: self.coords.clone(),
            masks: self.masks.clone(),
            attrs: self.attrs.clone(),
        })
    }

    pub fn identical(&self, other: &DataArray) -> bool {
        self.data.identical(&other.data)
            && self.coords.identical(&other.coords)
            && self.masks.identical(&other.masks)
            && self.attrs.identical(&other.attrs)
    }
}
