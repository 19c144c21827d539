use indexmap::IndexMap;

use crate::error::LatticeCoreError;

/// Ordered mapping from dimension label to extent, in row-major order
#[derive(Debug, Clone, Default)]
pub struct Sizes {
    dims: IndexMap<String, usize>,
}

/// Equal dims in equal order with equal extents
impl PartialEq for Sizes {
    fn eq(&self, other: &Self) -> bool {
        self.dims.iter().eq(other.dims.iter())
    }
}

impl Eq for Sizes {}

impl Sizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_new(dims: &[&str], shape: &[usize]) -> Result<Self, LatticeCoreError> {
        if dims.len() != shape.len() {
            return Err(LatticeCoreError::dims(format!(
                "Got {} dims but shape of length {}",
                dims.len(),
                shape.len()
            )));
        }
        let mut sizes = Self::new();
        for (dim, len) in dims.iter().zip(shape.iter()) {
            sizes.push(dim, *len)?;
        }
        Ok(sizes)
    }

    /// Append a new innermost dimension
    pub fn push(&mut self, dim: &str, len: usize) -> Result<(), LatticeCoreError> {
        if self.dims.contains_key(dim) {
            return Err(LatticeCoreError::dims(format!("Duplicate dimension `{dim}`")));
        }
        self.dims.insert(dim.to_string(), len);
        Ok(())
    }

    pub fn dims(&self) -> Vec<&str> {
        self.dims.keys().map(|d| d.as_str()).collect()
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.values().copied().collect()
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    pub fn volume(&self) -> usize {
        self.dims.values().product()
    }

    pub fn get(&self, dim: &str) -> Option<usize> {
        self.dims.get(dim).copied()
    }

    pub fn contains(&self, dim: &str) -> bool {
        self.dims.contains_key(dim)
    }

    pub fn index_of(&self, dim: &str) -> Option<usize> {
        self.dims.get_index_of(dim)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.dims.iter().map(|(d, l)| (d.as_str(), *l))
    }

    pub fn strides(&self) -> Vec<usize> {
        let shape = self.shape();
        let mut strides = vec![1; shape.len()];
        for axis in (0..shape.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * shape[axis + 1];
        }
        strides
    }

    pub fn without(&self, dim: &str) -> Self {
        let mut dims = self.dims.clone();
        dims.shift_remove(dim);
        Self { dims }
    }

    pub fn with_len(&self, dim: &str, len: usize) -> Result<Self, LatticeCoreError> {
        let mut dims = self.dims.clone();
        match dims.get_mut(dim) {
            Some(l) => *l = len,
            None => return Err(LatticeCoreError::dims(format!("Missing dimension `{dim}`"))),
        }
        Ok(Self { dims })
    }

    /// Reorder to `order`, which must be a permutation of the current dims
    pub fn transposed(&self, order: &[&str]) -> Result<Self, LatticeCoreError> {
        if order.len() != self.ndim() || order.iter().any(|d| !self.contains(d)) {
            return Err(LatticeCoreError::dims(format!(
                "Cannot transpose {:?} to {:?}",
                self.dims(),
                order
            )));
        }
        let mut out = Self::new();
        for dim in order {
            out.push(dim, self.dims[*dim])?;
        }
        Ok(out)
    }

    /// Union of both sets of dims, self's dims first
    pub fn merge(&self, other: &Sizes) -> Result<Self, LatticeCoreError> {
        let mut out = self.clone();
        for (dim, len) in other.iter() {
            match out.get(dim) {
                Some(existing) if existing != len => {
                    return Err(LatticeCoreError::dims(format!(
                        "Length mismatch along `{dim}`: {existing} vs {len}"
                    )));
                }
                Some(_) => {}
                None => out.push(dim, len)?,
            }
        }
        Ok(out)
    }

    /// Whether every dim of `other` appears in self with the same length
    pub fn includes(&self, other: &Sizes) -> bool {
        other.iter().all(|(dim, len)| self.get(dim) == Some(len))
    }

    pub fn rename(&self, renames: &IndexMap<String, String>) -> Result<Self, LatticeCoreError> {
        let mut out = Self::new();
        for (dim, len) in self.iter() {
            let new_dim = renames.get(dim).map(|s| s.as_str()).unwrap_or(dim);
            out.push(new_dim, len)?;
        }
        Ok(out)
    }
}

/// Visit every multi-index of `shape` in row-major order
pub fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|len| *len == 0) {
        return;
    }
    let mut index = vec![0; shape.len()];
    loop {
        f(&index);
        let mut axis = shape.len();
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            index[axis] += 1;
            if index[axis] < shape[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
}

/// For every flat position of `target`, the flat position in an array laid out by `source`.
///
/// Dims of `source` missing from `target` are an error, dims of `target` missing from
/// `source` are broadcast.
pub fn broadcast_indices(source: &Sizes, target: &Sizes) -> Result<Vec<usize>, LatticeCoreError> {
    if !target.includes(source) {
        return Err(LatticeCoreError::dims(format!(
            "Cannot broadcast {:?} to {:?}",
            source.iter().collect::<Vec<_>>(),
            target.iter().collect::<Vec<_>>()
        )));
    }
    let source_strides = source.strides();
    let strides = target
        .dims()
        .iter()
        .map(|dim| source.index_of(dim).map(|i| source_strides[i]).unwrap_or(0))
        .collect::<Vec<_>>();

    let mut out = Vec::with_capacity(target.volume());
    for_each_index(&target.shape(), |index| {
        out.push(index.iter().zip(strides.iter()).map(|(i, s)| i * s).sum());
    });
    Ok(out)
}
