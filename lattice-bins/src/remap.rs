use std::sync::Arc;

use arrow::array::Int64Array;
use indexmap::IndexMap;
use lattice_core::{DataArray, LatticeCoreError, Sizes, Variable};

use crate::error::LatticeBinsError;
use crate::masking::{empty_bins_where, hide_masked, with_reduced_meta};
use crate::overwrite::resized_for_overwrite;

/// Row dim of the table of input bin indices that is binned by the edges
const INPUT_BIN_DIM: &str = "input_bin";

/// Binned `var` regrouped into bins of `sizes`, laid out back to back in its buffer
fn replace_bin_sizes(var: &Variable, sizes: &Variable) -> Result<Variable, LatticeCoreError> {
    let constituents = var
        .bins()
        .ok_or_else(|| LatticeCoreError::InvalidBins("Expected binned data".to_string()))?
        .constituents();
    Variable::binned_from_sizes(sizes, &constituents.dim, constituents.data)
}

/// Copy all events of `var` into the ranges `begin..end` of a new buffer, then
/// regroup the new buffer by `sizes`.
///
/// `begin`/`end` must have the dims of `var` (in any order) and describe a layout
/// in which each output bin covers a contiguous block of input bins.
fn reorder_content(
    var: &Variable,
    begin: Variable,
    end: Variable,
    sizes: &Variable,
) -> Result<Variable, LatticeCoreError> {
    let bins = var
        .bins()
        .ok_or_else(|| LatticeCoreError::InvalidBins("Expected binned data".to_string()))?;
    let total = sizes.values_i64()?.iter().sum::<i64>().max(0) as usize;
    let buffer = resized_for_overwrite(bins.buffer(), bins.dim(), total)?;
    let mut out = Variable::binned_no_validate(begin, end, bins.dim(), buffer)?;
    out.assign_events(var)?;
    tracing::debug!("Remapped {total} events into {} bins", sizes.volume());
    replace_bin_sizes(&out, sizes)
}

fn require_binned_dim(var: &Variable, dim: &str) -> Result<(), LatticeBinsError> {
    if !var.is_binned() {
        return Err(LatticeBinsError::InvalidParameter(
            "Expected a binned variable".to_string(),
        ));
    }
    if !var.has_dim(dim) {
        return Err(LatticeBinsError::InvalidParameter(format!(
            "Variable has no dimension `{dim}`"
        )));
    }
    Ok(())
}

/// Merge all bins along `dim` into one bin per remaining outer element
#[tracing::instrument(skip_all)]
pub fn concat_bins(var: &Variable, dim: &str) -> Result<Variable, LatticeBinsError> {
    require_binned_dim(var, dim)?;
    let sizes = var.bin_sizes()?;

    // With `dim` innermost the bins to merge are adjacent, so a flat cumsum yields
    // offsets of the merged layout
    let mut inner = var.dims().into_iter().filter(|d| *d != dim).collect::<Vec<_>>();
    inner.push(dim);
    let end = sizes.transpose(&inner)?.cumsum()?.transpose(&var.dims())?;
    let begin = end.sub(&sizes)?;
    let out_sizes = sizes.sum(dim)?;
    Ok(reorder_content(var, begin, end, &out_sizes)?)
}

/// Regroup the bins along `param.dim` into the groups defined by `edges`.
///
/// Input bin `i` goes to the group containing `param[i]`; the output replaces the
/// dim of `param` by the dim of `edges`. Groups that receive no input bin are empty,
/// input bins whose parameter falls outside `edges` are dropped.
#[tracing::instrument(skip_all)]
pub fn combine_bins_by_binning(
    var: &Variable,
    param: &Variable,
    edges: &Variable,
) -> Result<Variable, LatticeBinsError> {
    let dim = param.dim()?.to_string();
    let edge_dim = edges.dim()?.to_string();
    require_binned_dim(var, &dim)?;
    let len = param.volume();
    if var.sizes().get(&dim) != Some(len) {
        return Err(LatticeBinsError::InvalidParameter(format!(
            "Parameter of length {len} does not match `{dim}`"
        )));
    }

    // Group input bin indices, in edge order and stable within a group. The index
    // table gets its own row dim so that `edges` may reuse the name of `dim`.
    let to_row = IndexMap::from([(dim.clone(), INPUT_BIN_DIM.to_string())]);
    let input_bin = DataArray::new(Variable::arange(INPUT_BIN_DIM, len)?)
        .with_coord(&edge_dim, param.rename_dims(&to_row)?)?;
    let grouped = input_bin.bin(edges)?;
    let group_sizes = grouped.data().bin_sizes()?.values_i64()?;
    let mut shuffle = grouped
        .data()
        .flatten_events()?
        .values_i64()?
        .into_iter()
        .map(|i| i as usize)
        .collect::<Vec<_>>();

    let mut dropped = vec![true; len];
    for i in shuffle.iter() {
        dropped[*i] = false;
    }
    let var = empty_bins_where(var, &Variable::from_bool(&[&dim], &[len], dropped.clone())?)?;
    shuffle.extend((0..len).filter(|i| dropped[*i]));

    let sizes = var.bin_sizes()?;
    let mut inner = var.dims().into_iter().filter(|d| *d != dim).collect::<Vec<_>>();
    inner.push(&dim);
    let sorted = sizes.transpose(&inner)?.take(&dim, &shuffle)?;

    let reverse_shuffle = Variable::from_i64(
        &[&dim],
        &[len],
        shuffle.iter().map(|i| *i as i64).collect(),
    )?
    .argsort()?;
    let end = sorted.cumsum()?.take(&dim, &reverse_shuffle)?;
    let begin = end.sub(&sizes)?;
    let out_sizes = group_sums(&sorted, &dim, &edge_dim, &group_sizes)?;
    Ok(reorder_content(&var, begin, end, &out_sizes)?)
}

/// Per-group sums of `sorted` along its innermost `dim`, groups being consecutive
/// blocks of `group_sizes` elements
fn group_sums(
    sorted: &Variable,
    dim: &str,
    edge_dim: &str,
    group_sizes: &[i64],
) -> Result<Variable, LatticeCoreError> {
    let len = sorted.sizes().get(dim).unwrap_or(0);
    let mut sizes: Sizes = sorted.sizes().without(dim);
    sizes.push(edge_dim, group_sizes.len())?;

    let values = sorted.values_i64()?;
    let mut out = Vec::with_capacity(sizes.volume());
    let outer = sorted.sizes().without(dim).volume();
    for block in 0..outer {
        let mut offset = block * len;
        for group in group_sizes {
            let end = offset + *group as usize;
            out.push(values[offset..end].iter().sum::<i64>());
            offset = end;
        }
    }
    Variable::try_new(sizes, Arc::new(Int64Array::from(out)))
}

/// [`concat_bins`] for a data array: bins masked along `dim` are hidden and all
/// metadata depending on `dim` is dropped
pub fn concat_bins_data_array(da: &DataArray, dim: &str) -> Result<DataArray, LatticeBinsError> {
    let (data, _) = hide_masked(da, dim)?;
    with_reduced_meta(concat_bins(&data, dim)?, da, dim)
}

/// Regroup the bins of `da` by the coord named after the dim of `edges`.
///
/// A coord holding bin edges along the regrouped dim is reduced to its midpoints.
/// Masked bins are hidden first. The result has `edges` as its dimension coord and
/// keeps the metadata that does not depend on the regrouped dim.
pub fn combine_bins(da: &DataArray, edges: &Variable) -> Result<DataArray, LatticeBinsError> {
    let edge_dim = edges.dim()?;
    let param = da
        .meta(edge_dim)
        .ok_or_else(|| LatticeCoreError::NotFound(edge_dim.to_string()))?;
    let dim = param.dim()?;
    // Bin-edge parameters regroup by their midpoints
    let param = match (param.sizes().get(dim), da.sizes().get(dim)) {
        (Some(n_edges), Some(n)) if n_edges == n + 1 => param
            .slice_range(dim, 0, n)?
            .add(&param.slice_range(dim, 1, n_edges)?)?
            .mul_scalar(0.5)?,
        _ => param.clone(),
    };
    let (data, keep) = hide_masked(da, dim)?;
    let param = match keep {
        Some(keep) => param.filter(dim, &keep)?,
        None => param,
    };
    let combined = combine_bins_by_binning(&data, &param, edges)?;
    let mut out = with_reduced_meta(combined, da, dim)?;
    out.set_coord(edge_dim, edges.clone())?;
    Ok(out)
}
