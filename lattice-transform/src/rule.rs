use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use itertools::Itertools;
use lattice_core::{LatticeCoreError, Variable};

use crate::coord_table::{Coord, CoordTable, Destination};
use crate::error::LatticeTransformError;

/// Parameter names of a compute function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<String>,
    pub variadic: bool,
}

/// Named arguments passed to a compute function
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: IndexMap<String, Variable>,
}

impl Args {
    pub fn get(&self, name: &str) -> Result<&Variable, LatticeCoreError> {
        self.values
            .get(name)
            .ok_or_else(|| LatticeCoreError::NotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Variable)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, Variable)> for Args {
    fn from_iter<T: IntoIterator<Item = (String, Variable)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Return value of a compute function
#[derive(Debug, Clone)]
pub enum FunctionOutput {
    Single(Variable),
    Named(IndexMap<String, Variable>),
}

impl From<Variable> for FunctionOutput {
    fn from(value: Variable) -> Self {
        FunctionOutput::Single(value)
    }
}

impl From<IndexMap<String, Variable>> for FunctionOutput {
    fn from(values: IndexMap<String, Variable>) -> Self {
        FunctionOutput::Named(values)
    }
}

type ComputeCallback = dyn Fn(&Args) -> Result<FunctionOutput, LatticeCoreError> + Send + Sync;

/// Function computing coordinates from named coordinate arguments
#[derive(Clone)]
pub struct ComputeFn {
    name: String,
    signature: Signature,
    func: Arc<ComputeCallback>,
}

impl ComputeFn {
    pub fn new<F>(name: &str, params: &[&str], func: F) -> Self
    where
        F: Fn(&Args) -> Result<FunctionOutput, LatticeCoreError> + Send + Sync + 'static,
    {
        Self::with_signature(
            name,
            Signature {
                params: params.iter().map(|param| param.to_string()).collect(),
                variadic: false,
            },
            func,
        )
    }

    pub fn with_signature<F>(name: &str, signature: Signature, func: F) -> Self
    where
        F: Fn(&Args) -> Result<FunctionOutput, LatticeCoreError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            signature,
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn call(&self, args: &Args) -> Result<FunctionOutput, LatticeCoreError> {
        (self.func)(args)
    }
}

impl fmt::Debug for ComputeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeFn")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

/// One step of a coordinate transform
#[derive(Debug, Clone)]
pub enum Rule {
    /// Take a coordinate from the input data
    Fetch {
        out_name: String,
        dense: Option<Variable>,
        event: Option<Variable>,
    },
    /// Alias an existing coordinate
    Rename { out_names: Vec<String>, in_name: String },
    /// Call a function with the coordinates named by its parameters
    Compute { out_names: Vec<String>, func: ComputeFn },
}

impl Rule {
    pub fn out_names(&self) -> Vec<&str> {
        match self {
            Rule::Fetch { out_name, .. } => vec![out_name.as_str()],
            Rule::Rename { out_names, .. } | Rule::Compute { out_names, .. } => {
                out_names.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            Rule::Fetch { .. } => vec![],
            Rule::Rename { in_name, .. } => vec![in_name.as_str()],
            Rule::Compute { func, .. } => func.signature().params.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, Rule::Fetch { .. })
    }

    /// Produce the coordinates of this rule, consuming its dependencies from `table`
    pub fn evaluate(&self, table: &mut CoordTable) -> Result<IndexMap<String, Coord>, LatticeTransformError> {
        match self {
            Rule::Fetch { out_name, dense, event } => Ok(IndexMap::from([(
                out_name.clone(),
                Coord::new(dense.clone(), event.clone(), Destination::Primary),
            )])),
            Rule::Rename { out_names, in_name } => {
                let source = table.consume(in_name)?;
                Ok(out_names
                    .iter()
                    .map(|name| {
                        let coord = Coord {
                            destination: Destination::Primary,
                            ..source.clone()
                        };
                        (name.clone(), coord)
                    })
                    .collect())
            }
            Rule::Compute { out_names, func } => {
                let inputs = func
                    .signature()
                    .params
                    .iter()
                    .map(|name| Ok((name.clone(), table.consume(name)?)))
                    .collect::<Result<IndexMap<_, _>, LatticeTransformError>>()?;
                let mut outputs = if inputs.values().any(Coord::has_event) {
                    compute_with_events(out_names, func, &inputs)?
                } else {
                    compute_dense(out_names, func, &inputs)?
                };
                outputs.retain(|name, _| out_names.contains(name));
                Ok(outputs)
            }
        }
    }
}

fn named_outputs(
    out_names: &[String],
    func: &ComputeFn,
    output: FunctionOutput,
) -> Result<IndexMap<String, Variable>, LatticeTransformError> {
    match output {
        FunctionOutput::Single(value) => match out_names {
            [name] => Ok(IndexMap::from([(name.clone(), value)])),
            _ => Err(LatticeTransformError::UnexpectedSingleOutput {
                func: func.name().to_string(),
                expected: out_names.len(),
            }),
        },
        FunctionOutput::Named(values) => {
            if let Some(missing) = out_names.iter().find(|name| !values.contains_key(*name)) {
                return Err(LatticeTransformError::MissingOutput {
                    func: func.name().to_string(),
                    name: missing.clone(),
                });
            }
            Ok(values)
        }
    }
}

fn compute_dense(
    out_names: &[String],
    func: &ComputeFn,
    inputs: &IndexMap<String, Coord>,
) -> Result<IndexMap<String, Coord>, LatticeTransformError> {
    let args = inputs
        .iter()
        .map(|(name, coord)| {
            let value = coord.dense.clone().ok_or_else(|| {
                LatticeCoreError::internal(format!("Coordinate `{name}` has no dense value"))
            })?;
            Ok((name.clone(), value))
        })
        .collect::<Result<Args, LatticeCoreError>>()?;
    let outputs = named_outputs(out_names, func, func.call(&args)?)?;
    Ok(outputs
        .into_iter()
        .map(|(name, value)| (name, Coord::new(Some(value), None, Destination::Primary)))
        .collect())
}

fn compute_with_events(
    out_names: &[String],
    func: &ComputeFn,
    inputs: &IndexMap<String, Coord>,
) -> Result<IndexMap<String, Coord>, LatticeTransformError> {
    let args = inputs
        .iter()
        .filter_map(|(name, coord)| {
            coord
                .event
                .clone()
                .or_else(|| coord.dense.clone())
                .map(|value| (name.clone(), value))
        })
        .collect::<Args>();
    let mut outputs = named_outputs(out_names, func, func.call(&args)?)?
        .into_iter()
        .map(|(name, value)| {
            let coord = if value.is_binned() {
                Coord::new(None, Some(value), Destination::Primary)
            } else {
                Coord::new(Some(value), None, Destination::Primary)
            };
            (name, coord)
        })
        .collect::<IndexMap<_, _>>();

    if inputs.values().all(Coord::has_dense) {
        for (name, dense) in compute_dense(out_names, func, inputs)? {
            let Some(dense) = dense.dense else { continue };
            match outputs.get_mut(&name) {
                Some(coord) => match &coord.dense {
                    Some(existing) if !existing.identical(&dense) => {
                        return Err(LatticeTransformError::InconsistentOutputs(name));
                    }
                    Some(_) => {}
                    None => coord.dense = Some(dense),
                },
                None => {
                    outputs.insert(name, Coord::new(Some(dense), None, Destination::Primary));
                }
            }
        }
    }
    Ok(outputs)
}

fn format_out_names(names: &[&str]) -> String {
    match names {
        [name] => name.to_string(),
        _ => format!("({})", names.iter().join(", ")),
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out_names = format_out_names(&self.out_names());
        match self {
            Rule::Fetch { .. } => write!(f, "Input   {out_names}"),
            Rule::Rename { in_name, .. } => write!(f, "Rename  {out_names} = {in_name}"),
            Rule::Compute { func, .. } => write!(
                f,
                "Compute {out_names} = {}({})",
                func.name(),
                func.signature().params.iter().join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TransformOptions;
    use indexmap::IndexSet;
    use lattice_core::DataArray;

    fn double() -> ComputeFn {
        ComputeFn::new("double", &["x"], |args| Ok(args.get("x")?.mul_scalar(2.0)?.into()))
    }

    fn compute(out_names: &[&str], func: ComputeFn) -> Arc<Rule> {
        Arc::new(Rule::Compute {
            out_names: out_names.iter().map(|name| name.to_string()).collect(),
            func,
        })
    }

    fn table_with(name: &str, coord: Coord, rules: &[Arc<Rule>]) -> CoordTable {
        let targets = IndexSet::new();
        let mut table = CoordTable::new(rules, &targets, &TransformOptions::default());
        table.add(name, coord);
        table
    }

    #[test]
    fn test_display() {
        let rename = Rule::Rename {
            out_names: vec!["y".to_string()],
            in_name: "x".to_string(),
        };
        assert_eq!(rename.to_string(), "Rename  y = x");
        let func = ComputeFn::new("func", &["x", "y"], |args| Ok(args.get("x")?.clone().into()));
        assert_eq!(
            compute(&["a", "b"], func).to_string(),
            "Compute (a, b) = func(x, y)"
        );
        let fetch = Rule::Fetch {
            out_name: "x".to_string(),
            dense: None,
            event: None,
        };
        assert_eq!(fetch.to_string(), "Input   x");
    }

    #[test]
    fn test_dense_compute() -> Result<(), LatticeTransformError> {
        let rule = compute(&["y"], double());
        let x = Variable::from_f64(&["x"], &[2], vec![1.0, 2.0])?;
        let mut table = table_with("x", Coord::new(Some(x), None, Destination::Primary), &[rule.clone()]);
        let outputs = rule.evaluate(&mut table)?;
        let y = outputs.get("y").and_then(|coord| coord.dense.as_ref());
        assert_eq!(y.map(|y| y.values_f64()).transpose()?, Some(vec![2.0, 4.0]));
        assert_eq!(table.get("x").map(|x| x.destination), Some(Destination::Secondary));
        Ok(())
    }

    #[test]
    fn test_single_output_for_several_names() -> Result<(), LatticeTransformError> {
        let rule = compute(&["a", "b"], double());
        let x = Variable::scalar(1.0);
        let mut table = table_with("x", Coord::new(Some(x), None, Destination::Primary), &[rule.clone()]);
        assert!(matches!(
            rule.evaluate(&mut table),
            Err(LatticeTransformError::UnexpectedSingleOutput { expected: 2, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_named_output_missing_name() -> Result<(), LatticeTransformError> {
        let func = ComputeFn::new("only_a", &["x"], |args| {
            Ok(IndexMap::from([("a".to_string(), args.get("x")?.clone())]).into())
        });
        let rule = compute(&["a", "b"], func);
        let x = Variable::scalar(1.0);
        let mut table = table_with("x", Coord::new(Some(x), None, Destination::Primary), &[rule.clone()]);
        assert!(matches!(
            rule.evaluate(&mut table),
            Err(LatticeTransformError::MissingOutput { name, .. }) if name == "b"
        ));
        Ok(())
    }

    #[test]
    fn test_undeclared_outputs_are_dropped() -> Result<(), LatticeTransformError> {
        let func = ComputeFn::new("both", &["x"], |args| {
            let x = args.get("x")?;
            Ok(IndexMap::from([
                ("a".to_string(), x.clone()),
                ("extra".to_string(), x.mul_scalar(3.0)?),
            ])
            .into())
        });
        let rule = compute(&["a"], func);
        let x = Variable::scalar(1.0);
        let mut table = table_with("x", Coord::new(Some(x), None, Destination::Primary), &[rule.clone()]);
        let outputs = rule.evaluate(&mut table)?;
        assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["a"]);
        Ok(())
    }

    #[test]
    fn test_event_compute_with_dense_side_output() -> Result<(), LatticeTransformError> {
        let buffer = DataArray::new(Variable::from_f64(&["event"], &[3], vec![1.0, 2.0, 3.0])?);
        let events = Variable::binned(
            Variable::from_i64(&["x"], &[2], vec![0, 1])?,
            Variable::from_i64(&["x"], &[2], vec![1, 3])?,
            "event",
            buffer,
        )?;
        let func = ComputeFn::new("split", &["t"], |args| {
            let t = args.get("t")?;
            let width = if t.is_binned() {
                Variable::scalar(1.0)
            } else {
                Variable::scalar(2.0)
            };
            Ok(IndexMap::from([
                ("doubled".to_string(), t.mul_scalar(2.0)?),
                ("width".to_string(), width),
            ])
            .into())
        });
        let rule = compute(&["doubled", "width"], func);
        let coord = Coord::new(None, Some(events), Destination::Primary);
        let mut table = table_with("t", coord, &[rule.clone()]);
        let outputs = rule.evaluate(&mut table)?;

        let doubled = outputs.get("doubled").and_then(|coord| coord.event.as_ref());
        assert_eq!(
            doubled.map(|d| d.flatten_events()?.values_f64()).transpose()?,
            Some(vec![2.0, 4.0, 6.0])
        );
        let width = outputs.get("width").and_then(|coord| coord.dense.as_ref());
        assert_eq!(width.map(|w| w.values_f64()).transpose()?, Some(vec![1.0]));
        Ok(())
    }

    #[test]
    fn test_inconsistent_dense_and_event_outputs() -> Result<(), LatticeTransformError> {
        let buffer = DataArray::new(Variable::from_f64(&["event"], &[2], vec![1.0, 2.0])?);
        let events = Variable::binned(
            Variable::from_i64(&["x"], &[1], vec![0])?,
            Variable::from_i64(&["x"], &[1], vec![2])?,
            "event",
            buffer,
        )?;
        let func = ComputeFn::new("width", &["t"], |args| {
            let value = if args.get("t")?.is_binned() { 1.0 } else { 2.0 };
            Ok(Variable::scalar(value).into())
        });
        let rule = compute(&["w"], func);
        let dense = Variable::from_f64(&["x"], &[1], vec![1.5])?;
        let coord = Coord::new(Some(dense), Some(events), Destination::Primary);
        let mut table = table_with("t", coord, &[rule.clone()]);
        assert!(matches!(
            rule.evaluate(&mut table),
            Err(LatticeTransformError::InconsistentOutputs(name)) if name == "w"
        ));
        Ok(())
    }
}
