use indexmap::{IndexMap, IndexSet};

use crate::error::LatticeTransformError;
use crate::graph::Graph;

/// Non-negative rational number, always in lowest terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fraction {
    num: u128,
    den: u128,
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

impl Fraction {
    const ZERO: Fraction = Fraction { num: 0, den: 1 };
    const ONE: Fraction = Fraction { num: 1, den: 1 };

    fn new(num: u128, den: u128) -> Self {
        let divisor = gcd(num, den).max(1);
        Self {
            num: num / divisor,
            den: den / divisor,
        }
    }

    /// `None` on overflow
    fn checked_add(self, other: Fraction) -> Option<Self> {
        let den = (self.den / gcd(self.den, other.den)).checked_mul(other.den)?;
        let lhs = self.num.checked_mul(den / self.den)?;
        let rhs = other.num.checked_mul(den / other.den)?;
        Some(Self::new(lhs.checked_add(rhs)?, den))
    }

    fn checked_div(self, n: usize) -> Option<Self> {
        let n = u128::try_from(n).ok()?;
        Some(Self::new(self.num, self.den.checked_mul(n)?))
    }
}

fn share_overflow(node: &str) -> LatticeTransformError {
    LatticeTransformError::InvalidGraph(format!(
        "Too many branches below `{node}` to track which dimensions it depends on"
    ))
}

/// Share of each dim-coord flowing into every node of `graph`.
///
/// Starting from a dim-coord with share one, each node splits its share evenly
/// among its children. Dim-coords never receive a share.
fn color_dims<'a>(
    graph: &'a Graph,
    dim_coords: &'a IndexSet<String>,
) -> Result<IndexMap<&'a str, IndexMap<&'a str, Fraction>>, LatticeTransformError> {
    let mut colors = graph
        .nodes()
        .map(|node| {
            let color = dim_coords
                .iter()
                .map(|dim| (dim.as_str(), Fraction::ZERO))
                .collect::<IndexMap<_, _>>();
            (node, color)
        })
        .collect::<IndexMap<_, _>>();

    for dim in dim_coords.iter().map(String::as_str) {
        let Some(color) = colors.get_mut(dim) else { continue };
        color.insert(dim, Fraction::ONE);
        let mut stack = vec![dim];
        while let Some(node) = stack.pop() {
            let children = graph.children_of(node);
            if children.is_empty() {
                continue;
            }
            let share = colors
                .get(node)
                .and_then(|color| color.get(dim))
                .copied()
                .unwrap_or(Fraction::ZERO)
                .checked_div(children.len())
                .ok_or_else(|| share_overflow(node))?;
            for child in &children {
                if dim_coords.contains(*child) {
                    continue;
                }
                if let Some(value) = colors.get_mut(child).and_then(|color| color.get_mut(dim)) {
                    *value = value.checked_add(share).ok_or_else(|| share_overflow(child))?;
                }
            }
            stack.extend(children);
        }
    }
    Ok(colors)
}

fn has_full_color_of_dim(color: &IndexMap<&str, Fraction>, dim: &str) -> bool {
    color.iter().all(|(other, fraction)| {
        if *other == dim {
            *fraction == Fraction::ONE
        } else {
            *fraction != Fraction::ONE
        }
    })
}

/// New name of each dimension in `dim_coords`, if any.
///
/// A dimension is renamed to the node furthest down the graph that derives
/// entirely from its dim-coord and from no other. Ties go to the last node in
/// topological order.
pub fn dim_name_changes(
    graph: &Graph,
    dim_coords: &IndexSet<String>,
) -> Result<IndexMap<String, String>, LatticeTransformError> {
    let colors = color_dims(graph, dim_coords)?;
    let mut nodes = graph.nodes_topologically()?;
    nodes.reverse();

    let mut changes = IndexMap::new();
    for dim in dim_coords {
        let found = nodes.iter().find(|node| {
            colors
                .get(node.as_str())
                .is_some_and(|color| has_full_color_of_dim(color, dim))
        });
        if let Some(node) = found {
            changes.insert(dim.clone(), node.clone());
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphDict;
    use crate::rule::ComputeFn;
    use lattice_core::{DataArray, LatticeCoreError, Variable};
    use rstest::rstest;

    fn first_arg(name: &str, params: &[&str]) -> ComputeFn {
        let first = params.first().map(|p| p.to_string()).unwrap_or_default();
        ComputeFn::new(name, params, move |args| Ok(args.get(&first)?.clone().into()))
    }

    fn source() -> Result<DataArray, LatticeCoreError> {
        DataArray::new(Variable::from_f64(&["x", "y"], &[2, 2], vec![0.0; 4])?)
            .with_coord("x", Variable::from_f64(&["x"], &[2], vec![0.0, 1.0])?)?
            .with_coord("y", Variable::from_f64(&["y"], &[2], vec![0.0, 1.0])?)
    }

    fn changes(dict: GraphDict, targets: &[&str], dims: &[&str]) -> Result<Vec<(String, String)>, LatticeTransformError> {
        let targets = targets.iter().map(|t| t.to_string()).collect();
        let graph = Graph::try_new(&dict)?.graph_for(&source()?, &targets)?;
        let dims = dims.iter().map(|d| d.to_string()).collect();
        Ok(dim_name_changes(&graph, &dims)?.into_iter().collect())
    }

    #[rstest]
    #[case(1, 2, Fraction::new(1, 2))]
    #[case(2, 4, Fraction::new(1, 2))]
    #[case(0, 3, Fraction::ZERO)]
    fn test_fraction_reduced(#[case] num: u128, #[case] den: u128, #[case] expected: Fraction) {
        assert_eq!(Fraction::new(num, den), expected);
    }

    #[test]
    fn test_fraction_sums_to_one() -> Result<(), LatticeTransformError> {
        let third = Fraction::ONE.checked_div(3).ok_or_else(|| share_overflow("x"))?;
        let two_thirds = third.checked_add(third).ok_or_else(|| share_overflow("x"))?;
        assert_ne!(two_thirds, Fraction::ONE);
        assert_eq!(two_thirds.checked_add(third), Some(Fraction::ONE));
        Ok(())
    }

    #[test]
    fn test_fraction_denominator_beyond_u64() {
        let (a, b) = (3u128.pow(30), 1u128 << 40);
        let sum = Fraction::new(1, a).checked_add(Fraction::new(1, b));
        assert_eq!(sum, Some(Fraction::new(a + b, a * b)));
        assert!(a * b > u128::from(u64::MAX));
        assert_eq!(Fraction::new(1, u128::MAX).checked_div(2), None);
        assert_eq!(Fraction::new(1, u128::MAX).checked_add(Fraction::new(1, u128::MAX - 1)), None);
    }

    #[test]
    fn test_deep_fan_out_keeps_exact_shares() -> Result<(), LatticeTransformError> {
        // Every level splits the share of `x` among three children of which only one
        // continues, so the deepest node holds 1/3^45, beyond the range of u64
        let mut dict = GraphDict::new();
        let mut parent = "x".to_string();
        for level in 0..45 {
            let next = format!("n{level}");
            for side in ["a", "b"] {
                dict = dict.compute(&format!("{next}{side}"), first_arg("side", &[&parent]));
            }
            dict = dict.compute(&next, first_arg("f", &[&parent]));
            parent = next;
        }
        let names = (0..45)
            .flat_map(|level| ["", "a", "b"].map(|side| format!("n{level}{side}")))
            .collect::<Vec<_>>();
        let targets = names.iter().map(String::as_str).collect::<Vec<_>>();
        let found = changes(dict, &targets, &["x"])?;
        assert_eq!(found, vec![("x".to_string(), "x".to_string())]);
        Ok(())
    }

    #[test]
    fn test_chain_renames_to_last() -> Result<(), LatticeTransformError> {
        let dict = GraphDict::new()
            .compute("a", first_arg("f", &["x"]))
            .compute("b", first_arg("g", &["a"]));
        assert_eq!(
            changes(dict, &["b"], &["x"])?,
            vec![("x".to_string(), "b".to_string())]
        );
        Ok(())
    }

    #[test]
    fn test_mixed_coordinate_is_not_a_dim() -> Result<(), LatticeTransformError> {
        let dict = GraphDict::new()
            .rename("a", "x")
            .compute("z", first_arg("mix", &["a", "y"]));
        let found = changes(dict, &["z"], &["x", "y"])?;
        assert_eq!(
            found,
            vec![
                ("x".to_string(), "a".to_string()),
                ("y".to_string(), "y".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_split_share_is_not_full() -> Result<(), LatticeTransformError> {
        let dict = GraphDict::new()
            .compute("a", first_arg("f", &["x"]))
            .compute("b", first_arg("g", &["x"]));
        let found = changes(dict, &["a", "b"], &["x"])?;
        assert_eq!(found, vec![("x".to_string(), "x".to_string())]);
        Ok(())
    }
}
