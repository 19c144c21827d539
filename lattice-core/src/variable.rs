use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, UInt64Array};
use arrow::compute::{cast, take};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use indexmap::IndexMap;

use crate::bins::Bins;
use crate::data_array::DataArray;
use crate::error::LatticeCoreError;
use crate::sizes::{broadcast_indices, for_each_index, Sizes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Float64,
    Int64,
    Boolean,
    Binned,
}

impl DType {
    pub fn from_arrow(data_type: &DataType) -> Result<Self, LatticeCoreError> {
        match data_type {
            DataType::Float64 => Ok(DType::Float64),
            DataType::Int64 => Ok(DType::Int64),
            DataType::Boolean => Ok(DType::Boolean),
            other => Err(LatticeCoreError::DTypeError(format!(
                "Arrow type {other:?} is not supported as variable storage"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum VariableData {
    Dense(ArrayRef),
    Binned(Box<Bins>),
}

/// A labelled n-dimensional array.
///
/// Dense values are a flat Arrow array in row-major order. Binned values reference
/// ranges of a shared 1-D content buffer, see [`Bins`]. Values are immutable: every
/// operation returns a new variable and clones only share Arrow buffers.
#[derive(Debug, Clone)]
pub struct Variable {
    sizes: Sizes,
    data: VariableData,
    unit: Option<String>,
}

impl Variable {
    pub fn try_new(sizes: Sizes, values: ArrayRef) -> Result<Self, LatticeCoreError> {
        if values.len() != sizes.volume() {
            return Err(LatticeCoreError::dims(format!(
                "Got {} values for sizes {:?}",
                values.len(),
                sizes.iter().collect::<Vec<_>>()
            )));
        }
        DType::from_arrow(values.data_type())?;
        Ok(Self {
            sizes,
            data: VariableData::Dense(values),
            unit: None,
        })
    }

    pub fn from_f64(dims: &[&str], shape: &[usize], values: Vec<f64>) -> Result<Self, LatticeCoreError> {
        Self::try_new(Sizes::try_new(dims, shape)?, Arc::new(Float64Array::from(values)))
    }

    pub fn from_i64(dims: &[&str], shape: &[usize], values: Vec<i64>) -> Result<Self, LatticeCoreError> {
        Self::try_new(Sizes::try_new(dims, shape)?, Arc::new(Int64Array::from(values)))
    }

    pub fn from_bool(dims: &[&str], shape: &[usize], values: Vec<bool>) -> Result<Self, LatticeCoreError> {
        Self::try_new(Sizes::try_new(dims, shape)?, Arc::new(BooleanArray::from(values)))
    }

    pub fn scalar(value: f64) -> Self {
        Self {
            sizes: Sizes::new(),
            data: VariableData::Dense(Arc::new(Float64Array::from(vec![value]))),
            unit: None,
        }
    }

    pub fn arange(dim: &str, len: usize) -> Result<Self, LatticeCoreError> {
        Self::from_i64(&[dim], &[len], (0..len as i64).collect())
    }

    pub fn zeros(sizes: Sizes, dtype: DType) -> Result<Self, LatticeCoreError> {
        let len = sizes.volume();
        let values: ArrayRef = match dtype {
            DType::Float64 => Arc::new(Float64Array::from(vec![0.0; len])),
            DType::Int64 => Arc::new(Int64Array::from(vec![0; len])),
            DType::Boolean => Arc::new(BooleanArray::from(vec![false; len])),
            DType::Binned => {
                return Err(LatticeCoreError::DTypeError(
                    "Cannot create binned zeros without a content buffer".to_string(),
                ))
            }
        };
        Self::try_new(sizes, values)
    }

    /// Binned variable referencing `buffer` through `begin`/`end` offsets along `dim`
    pub fn binned(
        begin: Variable,
        end: Variable,
        dim: &str,
        buffer: DataArray,
    ) -> Result<Self, LatticeCoreError> {
        let bins = Bins::try_new(begin, end, dim, buffer)?;
        bins.validate_ranges()?;
        Ok(Self::from_bins(bins))
    }

    /// Like [`Variable::binned`] but skipping the range check against the buffer length
    pub fn binned_no_validate(
        begin: Variable,
        end: Variable,
        dim: &str,
        buffer: DataArray,
    ) -> Result<Self, LatticeCoreError> {
        Ok(Self::from_bins(Bins::try_new(begin, end, dim, buffer)?))
    }

    pub(crate) fn from_bins(bins: Bins) -> Self {
        Self {
            sizes: bins.begin().sizes().clone(),
            data: VariableData::Binned(Box::new(bins)),
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.set_unit(Some(unit.into()));
        self
    }

    pub fn set_unit(&mut self, unit: Option<String>) {
        match &mut self.data {
            VariableData::Dense(_) => self.unit = unit,
            VariableData::Binned(bins) => bins.set_unit(unit),
        }
    }

    pub fn unit(&self) -> Option<&str> {
        match &self.data {
            VariableData::Dense(_) => self.unit.as_deref(),
            VariableData::Binned(bins) => bins.buffer().data().unit(),
        }
    }

    pub fn sizes(&self) -> &Sizes {
        &self.sizes
    }

    pub fn dims(&self) -> Vec<&str> {
        self.sizes.dims()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.sizes.shape()
    }

    pub fn ndim(&self) -> usize {
        self.sizes.ndim()
    }

    pub fn volume(&self) -> usize {
        self.sizes.volume()
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.sizes.contains(dim)
    }

    /// The only dim of a 1-D variable
    pub fn dim(&self) -> Result<&str, LatticeCoreError> {
        match self.dims().as_slice() {
            [dim] => Ok(*dim),
            dims => Err(LatticeCoreError::dims(format!(
                "Expected a 1-D variable, got dims {dims:?}"
            ))),
        }
    }

    pub fn dtype(&self) -> DType {
        match &self.data {
            VariableData::Dense(array) => {
                DType::from_arrow(array.data_type()).unwrap_or(DType::Float64)
            }
            VariableData::Binned(_) => DType::Binned,
        }
    }

    pub fn data(&self) -> &VariableData {
        &self.data
    }

    pub fn is_binned(&self) -> bool {
        matches!(self.data, VariableData::Binned(_))
    }

    pub fn bins(&self) -> Option<&Bins> {
        match &self.data {
            VariableData::Binned(bins) => Some(bins.as_ref()),
            VariableData::Dense(_) => None,
        }
    }

    pub fn bins_mut(&mut self) -> Option<&mut Bins> {
        match &mut self.data {
            VariableData::Binned(bins) => Some(bins.as_mut()),
            VariableData::Dense(_) => None,
        }
    }

    pub(crate) fn expect_bins(&self) -> Result<&Bins, LatticeCoreError> {
        self.bins().ok_or_else(|| {
            LatticeCoreError::InvalidBins("Expected a binned variable".to_string())
        })
    }

    pub fn array(&self) -> Result<&ArrayRef, LatticeCoreError> {
        match &self.data {
            VariableData::Dense(array) => Ok(array),
            VariableData::Binned(_) => Err(LatticeCoreError::DTypeError(
                "Binned variable has no dense values".to_string(),
            )),
        }
    }

    pub fn values_f64(&self) -> Result<Vec<f64>, LatticeCoreError> {
        let array = cast(self.array()?.as_ref(), &DataType::Float64)?;
        Ok(array.as_primitive::<Float64Type>().values().to_vec())
    }

    pub fn values_i64(&self) -> Result<Vec<i64>, LatticeCoreError> {
        let array = self.array()?;
        let values = array.as_primitive_opt::<Int64Type>().ok_or_else(|| {
            LatticeCoreError::DTypeError(format!("Expected Int64 values, got {:?}", array.data_type()))
        })?;
        Ok(values.values().to_vec())
    }

    pub fn values_bool(&self) -> Result<Vec<bool>, LatticeCoreError> {
        let array = self.array()?;
        let values = array.as_boolean_opt().ok_or_else(|| {
            LatticeCoreError::DTypeError(format!("Expected Boolean values, got {:?}", array.data_type()))
        })?;
        Ok(values.values().iter().collect())
    }

    /// Value-unspecified variable with the same structure (zeros in practice)
    pub fn empty_like(&self) -> Result<Self, LatticeCoreError> {
        match &self.data {
            VariableData::Dense(_) => {
                let mut out = Self::zeros(self.sizes.clone(), self.dtype())?;
                out.unit = self.unit.clone();
                Ok(out)
            }
            VariableData::Binned(bins) => Ok(Self::from_bins(Bins::try_new(
                bins.begin().clone(),
                bins.end().clone(),
                bins.dim(),
                bins.buffer().empty_like()?,
            )?)),
        }
    }

    /// Deep copy. Binned content is compacted so that bins are contiguous and ordered.
    pub fn copy(&self) -> Result<Self, LatticeCoreError> {
        match &self.data {
            VariableData::Dense(_) => Ok(self.clone()),
            VariableData::Binned(bins) => Ok(Self::from_bins(bins.compacted()?)),
        }
    }

    /// Gather elements by flat position into a variable of `sizes`
    pub(crate) fn reindex(&self, sizes: Sizes, positions: &[usize]) -> Result<Self, LatticeCoreError> {
        match &self.data {
            VariableData::Dense(array) => {
                let indices = UInt64Array::from(positions.iter().map(|p| *p as u64).collect::<Vec<_>>());
                let values = take(array.as_ref(), &indices, None)?;
                let mut out = Self::try_new(sizes, values)?;
                out.unit = self.unit.clone();
                Ok(out)
            }
            VariableData::Binned(bins) => {
                let begin = bins.begin().reindex(sizes.clone(), positions)?;
                let end = bins.end().reindex(sizes, positions)?;
                Ok(Self::from_bins(bins.with_indices(begin, end)?))
            }
        }
    }

    fn gather_along(&self, dim: &str, indices: &[usize], keep_dim: bool) -> Result<Self, LatticeCoreError> {
        let axis = self
            .sizes
            .index_of(dim)
            .ok_or_else(|| LatticeCoreError::dims(format!("Variable has no dimension `{dim}`")))?;
        let len = self.sizes.shape()[axis];
        if let Some(bad) = indices.iter().find(|i| **i >= len) {
            return Err(LatticeCoreError::dims(format!(
                "Index {bad} out of range for `{dim}` of length {len}"
            )));
        }
        let gathered = self.sizes.with_len(dim, indices.len())?;
        let strides = self.sizes.strides();
        let mut positions = Vec::with_capacity(gathered.volume());
        for_each_index(&gathered.shape(), |index| {
            let position = index
                .iter()
                .enumerate()
                .map(|(a, i)| (if a == axis { indices[*i] } else { *i }) * strides[a])
                .sum();
            positions.push(position);
        });
        let sizes = if keep_dim { gathered } else { gathered.without(dim) };
        self.reindex(sizes, &positions)
    }

    /// Select `indices` along `dim`, in the given order
    pub fn take(&self, dim: &str, indices: &[usize]) -> Result<Self, LatticeCoreError> {
        self.gather_along(dim, indices, true)
    }

    /// Boolean selection along `dim`
    pub fn filter(&self, dim: &str, mask: &[bool]) -> Result<Self, LatticeCoreError> {
        if self.sizes.get(dim) != Some(mask.len()) {
            return Err(LatticeCoreError::dims(format!(
                "Selection of length {} does not match `{dim}`",
                mask.len()
            )));
        }
        let indices = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect::<Vec<_>>();
        self.take(dim, &indices)
    }

    pub fn slice_range(&self, dim: &str, start: usize, end: usize) -> Result<Self, LatticeCoreError> {
        self.take(dim, &(start..end).collect::<Vec<_>>())
    }

    /// Select a single position along `dim`, dropping the dim
    pub fn slice_index(&self, dim: &str, index: usize) -> Result<Self, LatticeCoreError> {
        self.gather_along(dim, &[index], false)
    }

    pub fn transpose(&self, order: &[&str]) -> Result<Self, LatticeCoreError> {
        let sizes = self.sizes.transposed(order)?;
        if sizes == self.sizes {
            return Ok(self.clone());
        }
        let positions = broadcast_indices(&self.sizes, &sizes)?;
        self.reindex(sizes, &positions)
    }

    pub fn broadcast_to(&self, sizes: &Sizes) -> Result<Self, LatticeCoreError> {
        if sizes == &self.sizes {
            return Ok(self.clone());
        }
        let positions = broadcast_indices(&self.sizes, sizes)?;
        self.reindex(sizes.clone(), &positions)
    }

    pub fn rename_dims(&self, renames: &IndexMap<String, String>) -> Result<Self, LatticeCoreError> {
        let sizes = self.sizes.rename(renames)?;
        match &self.data {
            VariableData::Dense(_) => Ok(Self {
                sizes,
                data: self.data.clone(),
                unit: self.unit.clone(),
            }),
            VariableData::Binned(bins) => {
                let begin = bins.begin().rename_dims(renames)?;
                let end = bins.end().rename_dims(renames)?;
                Ok(Self::from_bins(bins.with_indices(begin, end)?))
            }
        }
    }

    /// Equality of dims, shape, unit and values
    pub fn identical(&self, other: &Variable) -> bool {
        if self.sizes != other.sizes || self.unit() != other.unit() {
            return false;
        }
        match (&self.data, &other.data) {
            (VariableData::Dense(a), VariableData::Dense(b)) => a.to_data() == b.to_data(),
            (VariableData::Binned(a), VariableData::Binned(b)) => {
                let sizes_match = match (a.bin_sizes(), b.bin_sizes()) {
                    (Ok(a), Ok(b)) => a.identical(&b),
                    _ => false,
                };
                sizes_match
                    && match (self.flatten_events(), other.flatten_events()) {
                        (Ok(a), Ok(b)) => a.identical(&b),
                        _ => false,
                    }
            }
            _ => false,
        }
    }

    /// Stable ordering of a 1-D variable's values
    pub fn argsort(&self) -> Result<Vec<usize>, LatticeCoreError> {
        self.dim()?;
        let values = self.values_f64()?;
        let mut order = (0..values.len()).collect::<Vec<_>>();
        order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
        Ok(order)
    }

    /// All events of a binned variable in outer-index order, as a 1-D variable
    pub fn flatten_events(&self) -> Result<Self, LatticeCoreError> {
        let bins = self.expect_bins()?;
        let positions = bins.event_positions()?;
        let data = bins.buffer().data();
        let sizes = Sizes::try_new(&[bins.dim()], &[positions.len()])?;
        data.reindex(sizes, &positions)
    }

    /// Sizes of the bins of a binned variable, `end - begin`
    pub fn bin_sizes(&self) -> Result<Self, LatticeCoreError> {
        self.expect_bins()?.bin_sizes()
    }
}
