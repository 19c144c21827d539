use std::sync::Arc;

use arrow::array::Int64Array;
use itertools::izip;
use lattice_core::{Bins, BinsConstituents, DataArray, Dict, LatticeCoreError, Variable};

use crate::error::LatticeBinsError;

/// Binned `var` with the bins where `hide` is true turned into empty ranges.
/// The content buffer is shared, not copied.
pub(crate) fn empty_bins_where(var: &Variable, hide: &Variable) -> Result<Variable, LatticeCoreError> {
    let bins = var
        .bins()
        .ok_or_else(|| LatticeCoreError::InvalidBins("Expected binned data".to_string()))?;
    let constituents = bins.constituents();
    let hide = hide.broadcast_to(constituents.begin.sizes())?.values_bool()?;
    let begin = constituents.begin.values_i64()?;
    let end = constituents.end.values_i64()?;
    let end = izip!(begin, end, hide)
        .map(|(b, e, hidden)| if hidden { b } else { e })
        .collect::<Vec<_>>();
    let end = Variable::try_new(constituents.begin.sizes().clone(), Arc::new(Int64Array::from(end)))?;
    Bins::from_constituents(BinsConstituents {
        end,
        ..constituents
    })
}

fn reduced(dict: &Dict, dim: &str) -> Dict {
    dict.iter()
        .filter(|(_, value)| !value.has_dim(dim))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Masked data with masked bins hidden, plus the selection applied along `dim` if
/// the mask was 1-D
pub(crate) fn hide_masked(
    da: &DataArray,
    dim: &str,
) -> Result<(Variable, Option<Vec<bool>>), LatticeBinsError> {
    if !da.data().is_binned() {
        return Err(LatticeBinsError::InvalidParameter(
            "Expected a data array with binned data".to_string(),
        ));
    }
    if !da.data().has_dim(dim) {
        return Err(LatticeBinsError::InvalidParameter(format!(
            "Data has no dimension `{dim}`"
        )));
    }
    let Some(mask) = da.masks().irreducible_mask(dim)? else {
        return Ok((da.data().clone(), None));
    };
    if mask.ndim() == 1 {
        // Index only begin/end so that the content buffer is reused as is
        let keep = mask.logical_not()?.values_bool()?;
        let constituents = da
            .bins()
            .ok_or_else(|| LatticeCoreError::InvalidBins("Expected binned data".to_string()))?
            .constituents();
        let data = Bins::from_constituents(BinsConstituents {
            begin: constituents.begin.filter(dim, &keep)?,
            end: constituents.end.filter(dim, &keep)?,
            ..constituents
        })?;
        Ok((data, Some(keep)))
    } else {
        Ok((empty_bins_where(da.data(), &mask)?, None))
    }
}

/// Hide bins masked along `dim` and drop all metadata that depends on `dim`.
///
/// A 1-D mask removes the masked bins, a multi-dimensional mask replaces them by
/// empty bins. In both cases the content buffer is left untouched.
pub fn hide_masked_and_reduce_meta(da: &DataArray, dim: &str) -> Result<DataArray, LatticeBinsError> {
    let (data, _) = hide_masked(da, dim)?;
    with_reduced_meta(data, da, dim)
}

/// `data` with the metadata of `da` that does not depend on `dim`
pub(crate) fn with_reduced_meta(data: Variable, da: &DataArray, dim: &str) -> Result<DataArray, LatticeBinsError> {
    let mut out = DataArray::new(data);
    for (name, value) in reduced(da.coords(), dim).iter() {
        out.set_coord(name, value.clone())?;
    }
    for (name, value) in reduced(da.masks(), dim).iter() {
        out.set_mask(name, value.clone())?;
    }
    for (name, value) in reduced(da.attrs(), dim).iter() {
        out.set_attr(name, value.clone())?;
    }
    Ok(out)
}
