use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::interleave;

use crate::data_array::DataArray;
use crate::dict::Dict;
use crate::error::LatticeCoreError;
use crate::sizes::{broadcast_indices, Sizes};
use crate::variable::{DType, Variable};

/// The four parts a binned variable is made of
#[derive(Debug, Clone)]
pub struct BinsConstituents {
    pub begin: Variable,
    pub end: Variable,
    pub dim: String,
    pub data: DataArray,
}

/// Ranges `[begin, end)` into a shared 1-D content buffer, one range per outer element.
///
/// The buffer is a [`DataArray`] whose data are the event values and whose coords,
/// masks and attrs are per-event metadata. It is shared between clones and copied on
/// write.
#[derive(Debug, Clone)]
pub struct Bins {
    begin: Variable,
    end: Variable,
    dim: String,
    buffer: Arc<DataArray>,
}

impl Bins {
    pub(crate) fn try_new(
        begin: Variable,
        end: Variable,
        dim: &str,
        buffer: DataArray,
    ) -> Result<Self, LatticeCoreError> {
        if begin.dtype() != DType::Int64 || end.dtype() != DType::Int64 {
            return Err(LatticeCoreError::InvalidBins(
                "Bin indices must be Int64".to_string(),
            ));
        }
        if begin.sizes() != end.sizes() {
            return Err(LatticeCoreError::InvalidBins(format!(
                "begin {:?} and end {:?} have different dims",
                begin.dims(),
                end.dims()
            )));
        }
        if buffer.dims() != vec![dim] {
            return Err(LatticeCoreError::InvalidBins(format!(
                "Content buffer must be 1-D along `{dim}`, got {:?}",
                buffer.dims()
            )));
        }
        if begin.has_dim(dim) {
            return Err(LatticeCoreError::InvalidBins(format!(
                "Buffer dim `{dim}` cannot also be an outer dim"
            )));
        }
        Ok(Self {
            begin,
            end,
            dim: dim.to_string(),
            buffer: Arc::new(buffer),
        })
    }

    pub(crate) fn validate_ranges(&self) -> Result<(), LatticeCoreError> {
        let len = self.buffer_len();
        for (begin, end) in self.ranges()? {
            if begin > end || end > len {
                return Err(LatticeCoreError::InvalidBins(format!(
                    "Bin range [{begin}, {end}) invalid for buffer of length {len}"
                )));
            }
        }
        Ok(())
    }

    /// Same buffer, new indices
    pub(crate) fn with_indices(&self, begin: Variable, end: Variable) -> Result<Self, LatticeCoreError> {
        if begin.sizes() != end.sizes() {
            return Err(LatticeCoreError::InvalidBins(
                "begin and end have different dims".to_string(),
            ));
        }
        Ok(Self {
            begin,
            end,
            dim: self.dim.clone(),
            buffer: self.buffer.clone(),
        })
    }

    pub fn begin(&self) -> &Variable {
        &self.begin
    }

    pub fn end(&self) -> &Variable {
        &self.end
    }

    pub fn dim(&self) -> &str {
        &self.dim
    }

    pub fn buffer(&self) -> &DataArray {
        &self.buffer
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.sizes().get(&self.dim).unwrap_or(0)
    }

    pub fn constituents(&self) -> BinsConstituents {
        BinsConstituents {
            begin: self.begin.clone(),
            end: self.end.clone(),
            dim: self.dim.clone(),
            data: (*self.buffer).clone(),
        }
    }

    /// Rebuild a binned variable from constituents, with its own buffer handle
    pub fn from_constituents(constituents: BinsConstituents) -> Result<Variable, LatticeCoreError> {
        Variable::binned_no_validate(
            constituents.begin,
            constituents.end,
            &constituents.dim,
            constituents.data,
        )
    }

    pub(crate) fn set_unit(&mut self, unit: Option<String>) {
        Arc::make_mut(&mut self.buffer).data_mut().set_unit(unit);
    }

    /// `[begin, end)` per outer element, in row-major order
    pub fn ranges(&self) -> Result<Vec<(usize, usize)>, LatticeCoreError> {
        let begin = self.begin.values_i64()?;
        let end = self.end.values_i64()?;
        begin
            .iter()
            .zip(end.iter())
            .map(|(b, e)| {
                if *b < 0 || *e < 0 {
                    return Err(LatticeCoreError::InvalidBins(format!(
                        "Negative bin index in [{b}, {e})"
                    )));
                }
                Ok((*b as usize, *e as usize))
            })
            .collect()
    }

    /// Buffer positions of all events, bin after bin
    pub fn event_positions(&self) -> Result<Vec<usize>, LatticeCoreError> {
        Ok(self.ranges()?.into_iter().flat_map(|(b, e)| b..e).collect())
    }

    pub fn bin_sizes(&self) -> Result<Variable, LatticeCoreError> {
        let sizes = self
            .ranges()?
            .into_iter()
            .map(|(b, e)| e.saturating_sub(b) as i64)
            .collect::<Vec<_>>();
        Variable::try_new(
            self.begin.sizes().clone(),
            Arc::new(arrow::array::Int64Array::from(sizes)),
        )
    }

    /// Copy of the bins with contiguous, ordered content and only referenced events
    pub fn compacted(&self) -> Result<Self, LatticeCoreError> {
        let positions = self.event_positions()?;
        let buffer = self.buffer.take(&self.dim, &positions)?;
        let sizes = self.bin_sizes()?;
        let end = sizes.cumsum()?;
        let begin = end.sub(&sizes)?;
        Ok(Self {
            begin,
            end,
            dim: self.dim.clone(),
            buffer: Arc::new(buffer),
        })
    }

    pub fn coords(&self) -> &Dict {
        self.buffer.coords()
    }

    pub fn masks(&self) -> &Dict {
        self.buffer.masks()
    }

    pub fn attrs(&self) -> &Dict {
        self.buffer.attrs()
    }

    /// Binned view of buffer values sharing these bin indices
    fn view(&self, values: &Variable) -> Variable {
        Variable::from_bins(Self {
            begin: self.begin.clone(),
            end: self.end.clone(),
            dim: self.dim.clone(),
            buffer: Arc::new(DataArray::new(values.clone())),
        })
    }

    pub fn data(&self) -> Variable {
        self.view(self.buffer.data())
    }

    pub fn coord(&self, name: &str) -> Option<Variable> {
        self.coords().get(name).map(|values| self.view(values))
    }

    pub fn attr(&self, name: &str) -> Option<Variable> {
        self.attrs().get(name).map(|values| self.view(values))
    }

    /// Event coord or, failing that, event attr
    pub fn meta(&self, name: &str) -> Option<Variable> {
        self.coord(name).or_else(|| self.attr(name))
    }

    pub fn contains_meta(&self, name: &str) -> bool {
        self.coords().contains(name) || self.attrs().contains(name)
    }

    /// Event values of `value`, provided it is binned with exactly these bin indices
    fn event_values_for(&self, name: &str, value: &Variable) -> Result<Variable, LatticeCoreError> {
        let other = value.bins().ok_or_else(|| {
            LatticeCoreError::InvalidBins(format!("Event metadata `{name}` must be binned"))
        })?;
        let matching = other.dim == self.dim
            && other.buffer_len() == self.buffer_len()
            && other.begin.identical(&self.begin)
            && other.end.identical(&self.end);
        if !matching {
            return Err(LatticeCoreError::BinIndexMismatch(format!(
                "Cannot store `{name}`, its bin indices differ from those of the data"
            )));
        }
        Ok(other.buffer.data().clone())
    }

    pub fn set_coord(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        let values = self.event_values_for(name, &value)?;
        Arc::make_mut(&mut self.buffer).set_coord(name, values)
    }

    pub fn set_attr(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        let values = self.event_values_for(name, &value)?;
        Arc::make_mut(&mut self.buffer).set_attr(name, values)
    }

    pub fn set_mask(&mut self, name: &str, value: Variable) -> Result<(), LatticeCoreError> {
        let values = self.event_values_for(name, &value)?;
        Arc::make_mut(&mut self.buffer).set_mask(name, values)
    }

    pub fn remove_coord(&mut self, name: &str) -> Option<Variable> {
        if !self.coords().contains(name) {
            return None;
        }
        Arc::make_mut(&mut self.buffer).remove_coord(name)
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Variable> {
        if !self.attrs().contains(name) {
            return None;
        }
        Arc::make_mut(&mut self.buffer).remove_attr(name)
    }

    /// Copy all events of `source` into the ranges of self.
    ///
    /// Outer elements are matched by dim label; corresponding bins must have equal
    /// sizes. Every buffer column of self needs a counterpart of the same name in the
    /// source buffer. Events are moved with a single interleave per column.
    pub fn assign_events(&mut self, source: &Bins) -> Result<(), LatticeCoreError> {
        let outer = self.begin.sizes().clone();
        let source_outer = broadcast_indices(source.begin.sizes(), &outer)?;
        let target_ranges = self.ranges()?;
        let source_ranges = source.ranges()?;

        let len = self.buffer_len();
        let mut picks = (0..len).map(|p| (0, p)).collect::<Vec<_>>();
        for (i, (begin, end)) in target_ranges.iter().enumerate() {
            let (source_begin, source_end) = source_ranges[source_outer[i]];
            let (size, source_size) = (end.saturating_sub(*begin), source_end.saturating_sub(source_begin));
            if size != source_size {
                return Err(LatticeCoreError::BinIndexMismatch(format!(
                    "Bin {i} holds {size} events but the source bin holds {source_size}"
                )));
            }
            if *end > len {
                return Err(LatticeCoreError::InvalidBins(format!(
                    "Bin range [{begin}, {end}) exceeds buffer of length {len}"
                )));
            }
            for (offset, position) in (*begin..*end).enumerate() {
                picks[position] = (1, source_begin + offset);
            }
        }

        let assign = |target: &Variable, source: Option<&Variable>, name: &str| {
            let source = source.ok_or_else(|| {
                LatticeCoreError::NotFound(format!("Event column `{name}` missing in source"))
            })?;
            let values: ArrayRef =
                interleave(&[target.array()?.as_ref(), source.array()?.as_ref()], &picks)?;
            let sizes = Sizes::try_new(&[&self.dim], &[len])?;
            let mut out = Variable::try_new(sizes, values)?;
            out.set_unit(target.unit().map(|u| u.to_string()));
            Ok::<_, LatticeCoreError>(out)
        };

        let mut buffer = DataArray::new(assign(self.buffer.data(), Some(source.buffer.data()), "data")?);
        for (name, values) in self.buffer.coords().iter() {
            buffer.set_coord(name, assign(values, source.coords().get(name), name)?)?;
        }
        for (name, values) in self.buffer.masks().iter() {
            buffer.set_mask(name, assign(values, source.masks().get(name), name)?)?;
        }
        for (name, values) in self.buffer.attrs().iter() {
            buffer.set_attr(name, assign(values, source.attrs().get(name), name)?)?;
        }
        self.buffer = Arc::new(buffer);
        Ok(())
    }
}

impl Variable {
    /// Bulk copy of events from `source` into the bins of self, see [`Bins::assign_events`]
    pub fn assign_events(&mut self, source: &Variable) -> Result<(), LatticeCoreError> {
        let source = source.expect_bins()?.clone();
        match self.bins_mut() {
            Some(bins) => bins.assign_events(&source),
            None => Err(LatticeCoreError::InvalidBins(
                "Can only assign events into a binned variable".to_string(),
            )),
        }
    }
}
