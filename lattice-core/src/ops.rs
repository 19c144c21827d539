use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array};
use arrow::compute::kernels::numeric;
use arrow::compute::{cast, not, or};
use arrow::datatypes::DataType;

use crate::data_array::DataArray;
use crate::error::LatticeCoreError;
use crate::sizes::Sizes;
use crate::variable::{DType, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn unit(&self, lhs: Option<&str>, rhs: Option<&str>) -> Result<Option<String>, LatticeCoreError> {
        match self {
            BinaryOp::Add | BinaryOp::Sub => {
                if lhs != rhs {
                    return Err(LatticeCoreError::UnitError(format!(
                        "Cannot {self:?} {lhs:?} and {rhs:?}"
                    )));
                }
                Ok(lhs.map(String::from))
            }
            BinaryOp::Mul => Ok(match (lhs, rhs) {
                (None, None) => None,
                (Some(unit), None) | (None, Some(unit)) => Some(unit.to_string()),
                (Some(a), Some(b)) => Some(format!("{a}*{b}")),
            }),
            BinaryOp::Div => Ok(match (lhs, rhs) {
                (a, b) if a == b => None,
                (Some(a), None) => Some(a.to_string()),
                (None, Some(b)) => Some(format!("1/{b}")),
                (Some(a), Some(b)) => Some(format!("{a}/{b}")),
                (None, None) => None,
            }),
        }
    }

    fn apply(&self, lhs: &ArrayRef, rhs: &ArrayRef) -> Result<ArrayRef, LatticeCoreError> {
        if lhs.data_type() == &DataType::Boolean || rhs.data_type() == &DataType::Boolean {
            return Err(LatticeCoreError::DTypeError(format!(
                "{self:?} is not defined for boolean values"
            )));
        }
        let dtype = if *self == BinaryOp::Div
            || lhs.data_type() == &DataType::Float64
            || rhs.data_type() == &DataType::Float64
        {
            DataType::Float64
        } else {
            DataType::Int64
        };
        let lhs = cast(lhs.as_ref(), &dtype)?;
        let rhs = cast(rhs.as_ref(), &dtype)?;
        let out = match self {
            BinaryOp::Add => numeric::add(&lhs, &rhs)?,
            BinaryOp::Sub => numeric::sub(&lhs, &rhs)?,
            BinaryOp::Mul => numeric::mul(&lhs, &rhs)?,
            BinaryOp::Div => numeric::div(&lhs, &rhs)?,
        };
        Ok(out)
    }
}

fn booleans(var: &Variable) -> Result<&BooleanArray, LatticeCoreError> {
    let array = var.array()?;
    array.as_boolean_opt().ok_or_else(|| {
        LatticeCoreError::DTypeError(format!("Expected Boolean values, got {:?}", array.data_type()))
    })
}

fn dense_binary(op: BinaryOp, lhs: &Variable, rhs: &Variable) -> Result<Variable, LatticeCoreError> {
    let sizes = lhs.sizes().merge(rhs.sizes())?;
    let unit = op.unit(lhs.unit(), rhs.unit())?;
    let lhs = lhs.broadcast_to(&sizes)?;
    let rhs = rhs.broadcast_to(&sizes)?;
    let values = op.apply(lhs.array()?, rhs.array()?)?;
    let mut out = Variable::try_new(sizes, values)?;
    out.set_unit(unit);
    Ok(out)
}

/// Dense values repeated once per event of the matching bin
fn repeat_per_bin(var: &Variable, counts: &Variable, dim: &str) -> Result<Variable, LatticeCoreError> {
    let positions = counts
        .values_i64()?
        .into_iter()
        .enumerate()
        .flat_map(|(i, count)| std::iter::repeat(i).take(count.max(0) as usize))
        .collect::<Vec<_>>();
    let sizes = Sizes::try_new(&[dim], &[positions.len()])?;
    var.reindex(sizes, &positions)
}

fn binned_binary(op: BinaryOp, lhs: &Variable, rhs: &Variable) -> Result<Variable, LatticeCoreError> {
    let outer = lhs.sizes().merge(rhs.sizes())?;
    let lhs = lhs.broadcast_to(&outer)?;
    let rhs = rhs.broadcast_to(&outer)?;

    let reference = if lhs.is_binned() { &lhs } else { &rhs };
    let dim = reference.expect_bins()?.dim().to_string();
    let counts = reference.bin_sizes()?;
    if let (Some(a), Some(b)) = (lhs.bins(), rhs.bins()) {
        if a.dim() != b.dim() || !a.bin_sizes()?.identical(&b.bin_sizes()?) {
            return Err(LatticeCoreError::BinIndexMismatch(format!(
                "Cannot {op:?} bins with different sizes"
            )));
        }
    }

    let events = |var: &Variable| {
        if var.is_binned() {
            var.flatten_events()
        } else {
            repeat_per_bin(var, &counts, &dim)
        }
    };
    let values = dense_binary(op, &events(&lhs)?, &events(&rhs)?)?;
    Variable::binned_from_sizes(&counts, &dim, DataArray::new(values))
}

fn reduce_chunks<T: Copy>(values: &[T], len: usize, groups: usize, init: T, f: impl Fn(T, T) -> T) -> Vec<T> {
    if len == 0 {
        return vec![init; groups];
    }
    values
        .chunks(len)
        .map(|chunk| chunk.iter().fold(init, |acc, v| f(acc, *v)))
        .collect()
}

impl Variable {
    /// Elementwise arithmetic with broadcasting by dim label.
    ///
    /// If either operand is binned, the op is applied per event and dense operands
    /// are repeated for every event of the corresponding bin. The result is binned
    /// with compact, ordered content.
    pub fn binary(&self, other: &Variable, op: BinaryOp) -> Result<Variable, LatticeCoreError> {
        if self.is_binned() || other.is_binned() {
            binned_binary(op, self, other)
        } else {
            dense_binary(op, self, other)
        }
    }

    pub fn add(&self, other: &Variable) -> Result<Variable, LatticeCoreError> {
        self.binary(other, BinaryOp::Add)
    }

    pub fn sub(&self, other: &Variable) -> Result<Variable, LatticeCoreError> {
        self.binary(other, BinaryOp::Sub)
    }

    pub fn mul(&self, other: &Variable) -> Result<Variable, LatticeCoreError> {
        self.binary(other, BinaryOp::Mul)
    }

    pub fn div(&self, other: &Variable) -> Result<Variable, LatticeCoreError> {
        self.binary(other, BinaryOp::Div)
    }

    pub fn mul_scalar(&self, value: f64) -> Result<Variable, LatticeCoreError> {
        self.mul(&Variable::scalar(value))
    }

    /// Adds a dimensionless number interpreted in the unit of self
    pub fn add_scalar(&self, value: f64) -> Result<Variable, LatticeCoreError> {
        let mut scalar = Variable::scalar(value);
        scalar.set_unit(self.unit().map(String::from));
        self.add(&scalar)
    }

    pub fn logical_not(&self) -> Result<Variable, LatticeCoreError> {
        let values = not(booleans(self)?)?;
        Variable::try_new(self.sizes().clone(), Arc::new(values))
    }

    pub fn logical_or(&self, other: &Variable) -> Result<Variable, LatticeCoreError> {
        let sizes = self.sizes().merge(other.sizes())?;
        let lhs = self.broadcast_to(&sizes)?;
        let rhs = other.broadcast_to(&sizes)?;
        let values = or(booleans(&lhs)?, booleans(&rhs)?)?;
        Variable::try_new(sizes, Arc::new(values))
    }

    /// Inclusive running sum over all elements in row-major order
    pub fn cumsum(&self) -> Result<Variable, LatticeCoreError> {
        let values: ArrayRef = match self.dtype() {
            DType::Int64 => Arc::new(Int64Array::from(
                self.values_i64()?
                    .into_iter()
                    .scan(0, |acc, v| {
                        *acc += v;
                        Some(*acc)
                    })
                    .collect::<Vec<_>>(),
            )),
            DType::Float64 => Arc::new(Float64Array::from(
                self.values_f64()?
                    .into_iter()
                    .scan(0.0, |acc, v| {
                        *acc += v;
                        Some(*acc)
                    })
                    .collect::<Vec<_>>(),
            )),
            other => {
                return Err(LatticeCoreError::DTypeError(format!(
                    "cumsum not supported for {other:?}"
                )))
            }
        };
        let mut out = Variable::try_new(self.sizes().clone(), values)?;
        out.set_unit(self.unit().map(String::from));
        Ok(out)
    }

    /// Values grouped per output element, with `dim` made innermost
    fn grouped_along(&self, dim: &str) -> Result<(Sizes, Variable, usize), LatticeCoreError> {
        let len = self
            .sizes()
            .get(dim)
            .ok_or_else(|| LatticeCoreError::dims(format!("Variable has no dimension `{dim}`")))?;
        let out = self.sizes().without(dim);
        let mut order = out.dims();
        order.push(dim);
        let transposed = self.transpose(&order)?;
        Ok((out, transposed, len))
    }

    pub fn sum(&self, dim: &str) -> Result<Variable, LatticeCoreError> {
        let (sizes, grouped, len) = self.grouped_along(dim)?;
        let groups = sizes.volume();
        let values: ArrayRef = match self.dtype() {
            DType::Int64 => Arc::new(Int64Array::from(reduce_chunks(
                &grouped.values_i64()?,
                len,
                groups,
                0,
                |a, b| a + b,
            ))),
            DType::Float64 => Arc::new(Float64Array::from(reduce_chunks(
                &grouped.values_f64()?,
                len,
                groups,
                0.0,
                |a, b| a + b,
            ))),
            other => {
                return Err(LatticeCoreError::DTypeError(format!(
                    "sum not supported for {other:?}"
                )))
            }
        };
        let mut out = Variable::try_new(sizes, values)?;
        out.set_unit(self.unit().map(String::from));
        Ok(out)
    }

    /// Logical or-reduction of a boolean variable along `dim`
    pub fn any(&self, dim: &str) -> Result<Variable, LatticeCoreError> {
        let (sizes, grouped, len) = self.grouped_along(dim)?;
        let groups = sizes.volume();
        let values = reduce_chunks(&grouped.values_bool()?, len, groups, false, |a, b| a || b);
        Variable::try_new(sizes, Arc::new(BooleanArray::from(values)))
    }

    /// Compact binned variable whose bins have the given sizes, laid out back to back
    pub fn binned_from_sizes(sizes: &Variable, dim: &str, buffer: DataArray) -> Result<Variable, LatticeCoreError> {
        let end = sizes.cumsum()?;
        let begin = end.sub(sizes)?;
        Variable::binned(begin, end, dim, buffer)
    }
}
