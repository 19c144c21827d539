use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use lattice_core::{Bins, DType, DataArray, Dataset, LatticeCoreError, Variable};

use crate::coord_table::{Coord, CoordTable, Destination, Usages};
use crate::dims::dim_name_changes;
use crate::error::LatticeTransformError;
use crate::graph::{rule_sequence, Graph, GraphDict};
use crate::options::TransformOptions;
use crate::rule::Rule;

/// Compute new coordinates of a data container from a graph of rules
pub trait TransformCoords: Sized {
    fn transform_coords(
        &self,
        targets: &[&str],
        graph: &GraphDict,
        options: &TransformOptions,
    ) -> Result<Self, LatticeTransformError>;

    /// Transform with every product declared in `graph` as a target
    fn transform_coords_with(
        &self,
        graph: &GraphDict,
        options: &TransformOptions,
    ) -> Result<Self, LatticeTransformError> {
        self.transform_coords(&graph.products(), graph, options)
    }
}

impl TransformCoords for DataArray {
    fn transform_coords(
        &self,
        targets: &[&str],
        graph: &GraphDict,
        options: &TransformOptions,
    ) -> Result<Self, LatticeTransformError> {
        let graph = Graph::try_new(graph)?;
        transform_data_array(self, &target_set(targets), &graph, options)
    }
}

impl TransformCoords for Dataset {
    fn transform_coords(
        &self,
        targets: &[&str],
        graph: &GraphDict,
        options: &TransformOptions,
    ) -> Result<Self, LatticeTransformError> {
        let graph = Graph::try_new(graph)?;
        transform_dataset(self, &target_set(targets), &graph, options)
    }
}

pub fn transform_coords<T: TransformCoords>(
    source: &T,
    targets: &[&str],
    graph: &GraphDict,
    options: &TransformOptions,
) -> Result<T, LatticeTransformError> {
    source.transform_coords(targets, graph, options)
}

fn target_set(targets: &[&str]) -> IndexSet<String> {
    targets.iter().map(|target| target.to_string()).collect()
}

fn transform_data_array(
    original: &DataArray,
    targets: &IndexSet<String>,
    graph: &Graph,
    options: &TransformOptions,
) -> Result<DataArray, LatticeTransformError> {
    let graph = graph.graph_for(original, targets)?;
    let rules = rule_sequence(&graph)?;
    let mut table = CoordTable::new(&rules, targets, options);

    let dims = original.dims();
    let mut dim_coords = IndexSet::new();
    for rule in &rules {
        for (name, coord) in rule.evaluate(&mut table)? {
            // Slicing can leave attrs with dims the data no longer has
            if dims.contains(&name.as_str()) && coord.has_dim(&name) {
                dim_coords.insert(name.clone());
            }
            table.add(&name, coord);
        }
    }

    let dim_name_changes = if options.rename_dims {
        dim_name_changes(&graph, &dim_coords)?
    } else {
        IndexMap::new()
    };
    if !options.quiet {
        log_transform(&rules, targets, &dim_name_changes, &table);
    }
    let result = store_results(original, table, targets)?;
    Ok(result.rename_dims(&dim_name_changes)?)
}

fn transform_dataset(
    original: &Dataset,
    targets: &IndexSet<String>,
    graph: &Graph,
    options: &TransformOptions,
) -> Result<Dataset, LatticeTransformError> {
    if !original.is_empty() {
        let items = original
            .iter()
            .map(|(name, item)| {
                let transformed = transform_data_array(&item?, targets, graph, options)?;
                Ok((name.to_string(), transformed))
            })
            .collect::<Result<Vec<_>, LatticeTransformError>>()?;
        return Ok(Dataset::from_items(items)?);
    }

    // Without items there is nowhere to keep attrs
    let options = options.discarding();
    let mut placeholder = DataArray::new(Variable::zeros(original.sizes().clone(), DType::Float64)?);
    for (name, value) in original.coords().iter() {
        placeholder.set_coord(name, value.clone())?;
    }
    let transformed = transform_data_array(&placeholder, targets, graph, &options)?;
    Ok(Dataset::from_coords(
        transformed.sizes().clone(),
        transformed.coords().clone(),
    )?)
}

fn remove_from(da: &mut DataArray, name: &str, destination: Destination) {
    match destination {
        Destination::Primary => {
            da.remove_coord(name);
            if let Some(bins) = da.bins_mut() {
                bins.remove_coord(name);
            }
        }
        Destination::Secondary => {
            da.remove_attr(name);
            if let Some(bins) = da.bins_mut() {
                bins.remove_attr(name);
            }
        }
    }
}

fn set_event(
    da: &mut DataArray,
    name: &str,
    event: Variable,
    destination: Destination,
) -> Result<(), LatticeCoreError> {
    let bins = da.bins_mut().ok_or_else(|| {
        LatticeCoreError::InvalidBins(format!("Cannot store event coordinate `{name}` of dense data"))
    })?;
    match destination {
        Destination::Primary => bins.set_coord(name, event),
        Destination::Secondary => bins.set_attr(name, event),
    }
}

/// Write `coord` into `da`, or remove it if nothing uses it any more
fn store_coord(
    da: &mut DataArray,
    name: &str,
    coord: Coord,
    compacted: &mut bool,
) -> Result<(), LatticeTransformError> {
    remove_from(da, name, coord.destination.other());
    if coord.usages.is_exhausted() {
        remove_from(da, name, coord.destination);
        return Ok(());
    }
    tracing::debug!("Storing `{name}` as {}", coord.destination);

    if let Some(dense) = coord.dense {
        match coord.destination {
            Destination::Primary => da.set_coord(name, dense)?,
            Destination::Secondary => da.set_attr(name, dense)?,
        }
    }
    if let Some(event) = coord.event {
        match set_event(da, name, event.clone(), coord.destination) {
            // Bin indices differ, e.g. after slicing. Compacted data and event
            // values share their layout.
            Err(LatticeCoreError::BinIndexMismatch(_)) => {
                if !*compacted {
                    let data = da.data().copy()?;
                    da.set_data(data)?;
                    *compacted = true;
                }
                set_event(da, name, event.copy()?, coord.destination)?;
            }
            result => result?,
        }
    }
    Ok(())
}

fn store_results(
    original: &DataArray,
    table: CoordTable,
    targets: &IndexSet<String>,
) -> Result<DataArray, LatticeTransformError> {
    let mut da = original.clone();
    if let Some(bins) = da.bins() {
        let data = Bins::from_constituents(bins.constituents())?;
        da.set_data(data)?;
    }
    let mut compacted = false;
    for (name, mut coord) in table {
        if targets.contains(&name) {
            coord.destination = Destination::Primary;
        }
        store_coord(&mut da, &name, coord, &mut compacted)?;
    }
    Ok(da)
}

fn output_names<'a>(rules: &'a [Arc<Rule>], keep: impl Fn(&Rule) -> bool) -> IndexSet<&'a str> {
    rules
        .iter()
        .filter(|rule| keep(rule.as_ref()))
        .flat_map(|rule| rule.out_names())
        .collect()
}

fn log_transform(
    rules: &[Arc<Rule>],
    targets: &IndexSet<String>,
    dim_name_changes: &IndexMap<String, String>,
    table: &CoordTable,
) {
    let inputs = output_names(rules, Rule::is_fetch);
    let byproducts = output_names(rules, |rule| !rule.is_fetch())
        .into_iter()
        .filter(|name| !targets.contains(*name) && table.total_usages(name) == Usages::Unlimited)
        .collect::<Vec<_>>();
    let preexisting = targets
        .iter()
        .filter(|target| inputs.contains(target.as_str()))
        .collect::<Vec<_>>();
    let steps = rules.iter().filter(|rule| !rule.is_fetch()).collect::<Vec<_>>();

    let mut message = format!(
        "Transformed coords ({}) -> ({})",
        inputs.iter().sorted().join(", "),
        targets.iter().sorted().join(", ")
    );
    if !byproducts.is_empty() {
        message += &format!("\n  Byproducts:\n    {}", byproducts.iter().sorted().join(", "));
    }
    if !dim_name_changes.is_empty() {
        let renames = dim_name_changes
            .iter()
            .map(|(from, to)| format!("    {to} <- {from}"))
            .join("\n");
        message += &format!("\n  Renamed dimensions:\n{renames}");
    }
    if !preexisting.is_empty() {
        message += &format!(
            "\n  Outputs already present in input:\n    {}",
            preexisting.iter().sorted().join(", ")
        );
    }
    let steps = if steps.is_empty() {
        "    None".to_string()
    } else {
        steps.iter().map(|rule| format!("    {rule}")).join("\n")
    };
    message += &format!("\n  Steps:\n{steps}");

    tracing::info!(target: "lattice_transform", "{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ComputeFn;

    fn scaled(factor: f64) -> ComputeFn {
        ComputeFn::new("scale", &["x"], move |args| Ok(args.get("x")?.mul_scalar(factor)?.into()))
    }

    fn line() -> Result<DataArray, LatticeCoreError> {
        DataArray::new(Variable::from_f64(&["x"], &[3], vec![1.0, 2.0, 3.0])?)
            .with_coord("x", Variable::from_f64(&["x"], &[3], vec![0.0, 1.0, 2.0])?)
    }

    #[test]
    fn test_exhausted_coordinate_is_removed() -> Result<(), LatticeTransformError> {
        let options = TransformOptions {
            quiet: true,
            ..TransformOptions::default().discarding()
        };
        let graph = GraphDict::new().compute("y", scaled(2.0));
        let out = line()?.transform_coords(&["y"], &graph, &options)?;
        assert!(out.meta("x").is_none());
        assert_eq!(out.dims(), vec!["y"]);
        Ok(())
    }

    #[test]
    fn test_secondary_coordinate_becomes_attr() -> Result<(), LatticeTransformError> {
        let options = TransformOptions {
            quiet: true,
            rename_dims: false,
            ..Default::default()
        };
        let graph = GraphDict::new().compute("y", scaled(2.0));
        let out = line()?.transform_coords(&["y"], &graph, &options)?;
        assert!(out.attrs().contains("x"));
        assert!(!out.coords().contains("x"));
        assert_eq!(out.dims(), vec!["x"]);
        Ok(())
    }

    #[test]
    fn test_empty_dataset_keeps_only_coords() -> Result<(), LatticeTransformError> {
        let sizes = lattice_core::Sizes::try_new(&["x"], &[3])?;
        let coords = [(
            "x".to_string(),
            Variable::from_f64(&["x"], &[3], vec![0.0, 1.0, 2.0])?,
        )]
        .into_iter()
        .collect();
        let ds = Dataset::from_coords(sizes, coords)?;
        let graph = GraphDict::new().compute("y", scaled(3.0));
        let out = ds.transform_coords(&["y"], &graph, &TransformOptions::default())?;
        assert!(out.is_empty());
        assert_eq!(out.coords().keys().collect::<Vec<_>>(), vec!["y"]);
        assert_eq!(out.sizes().dims(), vec!["y"]);
        Ok(())
    }
}
