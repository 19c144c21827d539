use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use lattice_core::Variable;

use crate::error::LatticeTransformError;
use crate::options::TransformOptions;
use crate::rule::Rule;

/// Where a coordinate ends up in the output: coords or attrs
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Destination {
    Primary,
    Secondary,
}

impl Destination {
    pub fn other(self) -> Self {
        match self {
            Destination::Primary => Destination::Secondary,
            Destination::Secondary => Destination::Primary,
        }
    }
}

/// Remaining number of consumers of a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usages {
    Unlimited,
    Count(usize),
}

impl Usages {
    fn incremented(self) -> Self {
        match self {
            Usages::Unlimited => Usages::Unlimited,
            Usages::Count(n) => Usages::Count(n + 1),
        }
    }

    fn decremented(self) -> Self {
        match self {
            Usages::Unlimited => Usages::Unlimited,
            Usages::Count(n) => Usages::Count(n.saturating_sub(1)),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Usages::Count(0))
    }
}

/// Dense and per-event value of one coordinate, plus its bookkeeping
#[derive(Debug, Clone)]
pub struct Coord {
    pub dense: Option<Variable>,
    pub event: Option<Variable>,
    pub destination: Destination,
    pub usages: Usages,
}

impl Coord {
    pub fn new(dense: Option<Variable>, event: Option<Variable>, destination: Destination) -> Self {
        Self {
            dense,
            event,
            destination,
            usages: Usages::Count(0),
        }
    }

    pub fn has_dense(&self) -> bool {
        self.dense.is_some()
    }

    pub fn has_event(&self) -> bool {
        self.event.is_some()
    }

    /// Whether the dense value, or else the outer dims of the event value, include `dim`
    pub fn has_dim(&self, dim: &str) -> bool {
        match (&self.dense, &self.event) {
            (Some(dense), _) => dense.has_dim(dim),
            (None, Some(event)) => event.has_dim(dim),
            (None, None) => false,
        }
    }
}

/// Working set of coordinates produced while executing a rule sequence
#[derive(Debug, Clone)]
pub struct CoordTable {
    coords: IndexMap<String, Coord>,
    total_usages: IndexMap<String, Usages>,
}

impl CoordTable {
    pub fn new(rules: &[Arc<Rule>], targets: &IndexSet<String>, options: &TransformOptions) -> Self {
        let mut total_usages = IndexMap::new();
        for rule in rules {
            for name in rule.out_names() {
                total_usages.entry(name.to_string()).or_insert(Usages::Count(0));
            }
        }
        for rule in rules {
            for name in rule.dependencies() {
                let usages = total_usages.entry(name.to_string()).or_insert(Usages::Count(0));
                *usages = usages.incremented();
            }
        }

        for rule in rules {
            let keep = match rule.as_ref() {
                Rule::Fetch { .. } => options.keep_inputs,
                Rule::Compute { .. } => options.keep_intermediate,
                Rule::Rename { .. } => options.keep_aliases,
            };
            if keep {
                for name in rule.out_names() {
                    total_usages.insert(name.to_string(), Usages::Unlimited);
                }
            }
        }
        for name in targets {
            total_usages.insert(name.clone(), Usages::Unlimited);
        }

        Self {
            coords: IndexMap::new(),
            total_usages,
        }
    }

    /// Store `coord` under `name`, replacing any previous entry
    pub fn add(&mut self, name: &str, mut coord: Coord) {
        coord.usages = self.total_usages(name);
        self.coords.insert(name.to_string(), coord);
    }

    /// Hand out `name` to a consumer. The stored coordinate becomes secondary.
    pub fn consume(&mut self, name: &str) -> Result<Coord, LatticeTransformError> {
        let coord = self
            .coords
            .get_mut(name)
            .ok_or_else(|| LatticeTransformError::CoordinateNotFound(name.to_string()))?;
        coord.destination = Destination::Secondary;
        coord.usages = coord.usages.decremented();
        Ok(coord.clone())
    }

    /// Number of consumers determined before execution
    pub fn total_usages(&self, name: &str) -> Usages {
        self.total_usages
            .get(name)
            .copied()
            .unwrap_or(Usages::Count(0))
    }

    pub fn get(&self, name: &str) -> Option<&Coord> {
        self.coords.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Coord)> {
        self.coords.iter().map(|(name, coord)| (name.as_str(), coord))
    }
}

impl IntoIterator for CoordTable {
    type Item = (String, Coord);
    type IntoIter = indexmap::map::IntoIter<String, Coord>;

    fn into_iter(self) -> Self::IntoIter {
        self.coords.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ComputeFn;

    fn rules() -> Vec<Arc<Rule>> {
        let fetch = |name: &str| {
            Arc::new(Rule::Fetch {
                out_name: name.to_string(),
                dense: Some(Variable::scalar(1.0)),
                event: None,
            })
        };
        let sum = ComputeFn::new("sum", &["a", "b"], |args| {
            Ok(args.get("a")?.add(args.get("b")?)?.into())
        });
        vec![
            fetch("a"),
            fetch("b"),
            Arc::new(Rule::Compute {
                out_names: vec!["c".to_string()],
                func: sum,
            }),
            Arc::new(Rule::Rename {
                out_names: vec!["d".to_string()],
                in_name: "c".to_string(),
            }),
        ]
    }

    fn targets(names: &[&str]) -> IndexSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_usages_count_dependencies() {
        let table = CoordTable::new(&rules(), &targets(&["d"]), &TransformOptions::default().discarding());
        assert_eq!(table.total_usages("a"), Usages::Count(1));
        assert_eq!(table.total_usages("c"), Usages::Count(1));
        assert_eq!(table.total_usages("d"), Usages::Unlimited);
    }

    #[test]
    fn test_keep_options_make_outputs_unlimited() {
        let options = TransformOptions {
            keep_inputs: true,
            keep_intermediate: false,
            ..TransformOptions::default().discarding()
        };
        let table = CoordTable::new(&rules(), &targets(&["d"]), &options);
        assert_eq!(table.total_usages("a"), Usages::Unlimited);
        assert_eq!(table.total_usages("c"), Usages::Count(1));
    }

    #[test]
    fn test_consume_marks_secondary() -> Result<(), LatticeTransformError> {
        let mut table = CoordTable::new(&rules(), &targets(&["d"]), &TransformOptions::default().discarding());
        table.add("a", Coord::new(Some(Variable::scalar(1.0)), None, Destination::Primary));
        let consumed = table.consume("a")?;
        assert_eq!(consumed.destination, Destination::Secondary);
        let stored = table.get("a").map(|coord| (coord.destination, coord.usages));
        assert_eq!(stored, Some((Destination::Secondary, Usages::Count(0))));
        assert!(matches!(
            table.consume("missing"),
            Err(LatticeTransformError::CoordinateNotFound(_))
        ));
        Ok(())
    }
}
