use crate::data_array::DataArray;
use crate::error::LatticeCoreError;
use crate::sizes::Sizes;
use crate::variable::Variable;

/// Group index of `value` for ascending `edges`, bins are half-open `[e_i, e_{i+1})`
fn group_of(edges: &[f64], value: f64) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if !(value >= first && value < last) {
        return None;
    }
    Some(edges.partition_point(|e| *e <= value) - 1)
}

impl DataArray {
    /// Bin the rows of a 1-D table into the bins defined by `edges`.
    ///
    /// The parameter is the coord (or attr) named after the edge dim. Rows keep their
    /// relative order within a bin, rows outside of the edges are dropped. The result
    /// is 1-D along the edge dim with `edges` as its coord; the content buffer holds
    /// the table's data plus all of its metadata that depends on the row dim.
    pub fn bin(&self, edges: &Variable) -> Result<DataArray, LatticeCoreError> {
        let row_dim = self.data().dim()?.to_string();
        let edge_dim = edges.dim()?.to_string();
        if edge_dim == row_dim {
            return Err(LatticeCoreError::dims(format!(
                "Cannot bin along the row dimension `{row_dim}`"
            )));
        }
        let param = self
            .meta(&edge_dim)
            .ok_or_else(|| LatticeCoreError::NotFound(edge_dim.clone()))?;
        if param.dims() != vec![row_dim.as_str()] {
            return Err(LatticeCoreError::dims(format!(
                "Binning parameter `{edge_dim}` must depend on `{row_dim}` only"
            )));
        }
        if param.unit() != edges.unit() {
            return Err(LatticeCoreError::UnitError(format!(
                "Edges have unit {:?} but `{edge_dim}` has unit {:?}",
                edges.unit(),
                param.unit()
            )));
        }

        let edge_values = edges.values_f64()?;
        if edge_values.len() < 2 || edge_values.windows(2).any(|w| !(w[0] < w[1])) {
            return Err(LatticeCoreError::InvalidBins(format!(
                "Edges of `{edge_dim}` must be strictly increasing with at least two values"
            )));
        }
        let n_bins = edge_values.len() - 1;

        let mut groups = vec![Vec::new(); n_bins];
        for (row, value) in param.values_f64()?.into_iter().enumerate() {
            if let Some(group) = group_of(&edge_values, value) {
                groups[group].push(row);
            }
        }
        let counts = groups.iter().map(|g| g.len() as i64).collect::<Vec<_>>();
        let order = groups.into_iter().flatten().collect::<Vec<_>>();

        let table = self.take(&row_dim, &order)?;
        let mut buffer = DataArray::new(table.data().clone());
        for (name, value) in table.coords().iter().filter(|(_, v)| v.has_dim(&row_dim)) {
            buffer.set_coord(name, value.clone())?;
        }
        for (name, value) in table.masks().iter().filter(|(_, v)| v.has_dim(&row_dim)) {
            buffer.set_mask(name, value.clone())?;
        }
        for (name, value) in table.attrs().iter().filter(|(_, v)| v.has_dim(&row_dim)) {
            buffer.set_attr(name, value.clone())?;
        }

        let sizes = Variable::try_new(
            Sizes::try_new(&[&edge_dim], &[n_bins])?,
            std::sync::Arc::new(arrow::array::Int64Array::from(counts)),
        )?;
        let data = Variable::binned_from_sizes(&sizes, &row_dim, buffer)?;
        DataArray::new(data).with_coord(&edge_dim, edges.clone())
    }
}
