use lattice_core::{Bins, BinsConstituents, DataArray, Dataset, Dict, LatticeCoreError, Variable};

/// Copy with the same structure whose values are all unspecified and meant to be
/// overwritten. Unlike `empty_like`, coords, masks and attrs are not shared with the
/// original but are fresh, equally unspecified arrays.
pub trait CopyForOverwrite: Sized {
    fn copy_for_overwrite(&self) -> Result<Self, LatticeCoreError>;
}

fn copy_dict_for_overwrite(dict: &Dict) -> Result<Dict, LatticeCoreError> {
    dict.iter()
        .map(|(name, value)| Ok((name.to_string(), value.copy_for_overwrite()?)))
        .collect()
}

fn data_array_from_parts(
    data: Variable,
    coords: &Dict,
    masks: &Dict,
    attrs: &Dict,
) -> Result<DataArray, LatticeCoreError> {
    let mut out = DataArray::new(data);
    for (name, value) in coords.iter() {
        out.set_coord(name, value.clone())?;
    }
    for (name, value) in masks.iter() {
        out.set_mask(name, value.clone())?;
    }
    for (name, value) in attrs.iter() {
        out.set_attr(name, value.clone())?;
    }
    Ok(out)
}

impl CopyForOverwrite for Variable {
    fn copy_for_overwrite(&self) -> Result<Self, LatticeCoreError> {
        match self.bins() {
            None => self.empty_like(),
            Some(bins) => {
                let constituents = bins.constituents();
                Bins::from_constituents(BinsConstituents {
                    data: constituents.data.copy_for_overwrite()?,
                    ..constituents
                })
            }
        }
    }
}

/// Copy for overwrite of an event buffer with `dim` resized to `len`.
///
/// Columns without `dim` are copied for overwrite unchanged.
pub fn resized_for_overwrite(buffer: &DataArray, dim: &str, len: usize) -> Result<DataArray, LatticeCoreError> {
    let resize = |value: &Variable| -> Result<Variable, LatticeCoreError> {
        if !value.has_dim(dim) || value.sizes().get(dim) == Some(len) {
            return value.copy_for_overwrite();
        }
        let mut out = Variable::zeros(value.sizes().with_len(dim, len)?, value.dtype())?;
        out.set_unit(value.unit().map(String::from));
        Ok(out)
    };
    let resize_dict = |dict: &Dict| -> Result<Dict, LatticeCoreError> {
        dict.iter()
            .map(|(name, value)| Ok((name.to_string(), resize(value)?)))
            .collect()
    };
    data_array_from_parts(
        resize(buffer.data())?,
        &resize_dict(buffer.coords())?,
        &resize_dict(buffer.masks())?,
        &resize_dict(buffer.attrs())?,
    )
}

impl CopyForOverwrite for DataArray {
    fn copy_for_overwrite(&self) -> Result<Self, LatticeCoreError> {
        data_array_from_parts(
            self.data().copy_for_overwrite()?,
            &copy_dict_for_overwrite(self.coords())?,
            &copy_dict_for_overwrite(self.masks())?,
            &copy_dict_for_overwrite(self.attrs())?,
        )
    }
}

impl CopyForOverwrite for Dataset {
    fn copy_for_overwrite(&self) -> Result<Self, LatticeCoreError> {
        let mut out = Dataset::from_coords(
            self.sizes().clone(),
            copy_dict_for_overwrite(self.coords())?,
        )?;
        for (name, item) in self.iter() {
            let item = item?;
            let copied = data_array_from_parts(
                item.data().copy_for_overwrite()?,
                &Dict::new(),
                &copy_dict_for_overwrite(item.masks())?,
                &copy_dict_for_overwrite(item.attrs())?,
            )?;
            out.insert(name, copied)?;
        }
        Ok(out)
    }
}
