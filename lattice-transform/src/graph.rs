use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use lattice_core::DataArray;
use petgraph::algo::toposort;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::LatticeTransformError;
use crate::rule::{ComputeFn, Rule};

/// Output names of one graph entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Products {
    One(String),
    Many(Vec<String>),
}

impl Products {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Products::One(name) => vec![name.as_str()],
            Products::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// How the products of a graph entry are obtained
#[derive(Debug, Clone)]
pub enum Producer {
    Rename(String),
    Compute(ComputeFn),
}

/// User-facing description of a coordinate transform graph.
///
/// Entries are kept in declaration order.
#[derive(Debug, Clone, Default)]
pub struct GraphDict {
    entries: Vec<(Products, Producer)>,
}

impl GraphDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, out_name: &str, in_name: &str) -> Self {
        self.insert(
            Products::One(out_name.to_string()),
            Producer::Rename(in_name.to_string()),
        );
        self
    }

    pub fn compute(mut self, out_name: &str, func: ComputeFn) -> Self {
        self.insert(Products::One(out_name.to_string()), Producer::Compute(func));
        self
    }

    pub fn compute_many(mut self, out_names: &[&str], func: ComputeFn) -> Self {
        let names = out_names.iter().map(|name| name.to_string()).collect();
        self.insert(Products::Many(names), Producer::Compute(func));
        self
    }

    pub fn insert(&mut self, products: Products, producer: Producer) {
        self.entries.push((products, producer));
    }

    pub fn entries(&self) -> impl Iterator<Item = &(Products, Producer)> {
        self.entries.iter()
    }

    /// All declared output names, in declaration order
    pub fn products(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|(products, _)| products.names())
            .collect()
    }
}

/// Mapping from output name to the rule producing it
#[derive(Debug, Clone, Default)]
pub struct Graph {
    rules: IndexMap<String, Arc<Rule>>,
}

impl Graph {
    pub fn try_new(dict: &GraphDict) -> Result<Self, LatticeTransformError> {
        let mut rules = IndexMap::new();
        for (products, producer) in dict.entries() {
            let out_names = products
                .names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>();
            if out_names.is_empty() {
                return Err(LatticeTransformError::InvalidGraph(
                    "Graph entry without products".to_string(),
                ));
            }
            let rule = match producer {
                Producer::Rename(in_name) => Rule::Rename {
                    out_names: out_names.clone(),
                    in_name: in_name.clone(),
                },
                Producer::Compute(func) => {
                    if func.signature().variadic {
                        return Err(LatticeTransformError::VariadicFunction(
                            func.name().to_string(),
                        ));
                    }
                    Rule::Compute {
                        out_names: out_names.clone(),
                        func: func.clone(),
                    }
                }
            };
            let rule = Arc::new(rule);
            for name in out_names {
                if rules.contains_key(&name) {
                    return Err(LatticeTransformError::DuplicateOutput(name));
                }
                rules.insert(name, rule.clone());
            }
        }
        Ok(Self { rules })
    }

    /// Minimal subgraph producing `targets` from the metadata of `source`.
    ///
    /// Names present as metadata of `source` are fetched, even if the graph
    /// declares a rule for them.
    pub fn graph_for(
        &self,
        source: &DataArray,
        targets: &IndexSet<String>,
    ) -> Result<Graph, LatticeTransformError> {
        let mut rules = IndexMap::new();
        let mut pending = targets.iter().cloned().collect::<Vec<_>>();
        while let Some(name) = pending.pop() {
            if rules.contains_key(&name) {
                continue;
            }
            let rule = self.rule_for(&name, source)?;
            pending.extend(rule.dependencies().into_iter().map(str::to_string));
            rules.insert(name, rule);
        }
        Ok(Graph { rules })
    }

    fn rule_for(&self, name: &str, source: &DataArray) -> Result<Arc<Rule>, LatticeTransformError> {
        if source.has_meta(name) {
            return Ok(Arc::new(Rule::Fetch {
                out_name: name.to_string(),
                dense: source.meta(name).cloned(),
                event: source.bins().and_then(|bins| bins.meta(name)),
            }));
        }
        self.rules
            .get(name)
            .cloned()
            .ok_or_else(|| LatticeTransformError::CoordinateNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.rules.get(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Names whose rule depends on `name`
    pub fn children_of(&self, name: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|(_, rule)| rule.dependencies().contains(&name))
            .map(|(candidate, _)| candidate.as_str())
            .collect()
    }

    /// All names, including undeclared dependencies, with dependencies first
    pub fn nodes_topologically(&self) -> Result<Vec<String>, LatticeTransformError> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut indices: IndexMap<&str, NodeIndex> = IndexMap::new();
        for (name, rule) in &self.rules {
            for node in std::iter::once(name.as_str()).chain(rule.dependencies()) {
                indices.entry(node).or_insert_with(|| graph.add_node(node));
            }
        }
        for (name, rule) in &self.rules {
            for dependency in rule.dependencies() {
                graph.add_edge(indices[dependency], indices[name.as_str()], ());
            }
        }

        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx].to_string()).collect()),
            Err(cycle) => Err(LatticeTransformError::DependencyCycle(format!(
                "Coordinate `{}` depends on itself",
                graph[cycle.node_id()]
            ))),
        }
    }

    /// Graphviz DOT rendering of the declared rules. Rename edges are dashed;
    /// unless `simplified`, compute functions get nodes of their own.
    pub fn show(&self, simplified: bool) -> String {
        let mut graph = DiGraph::<DotNode, EdgeKind>::new();
        let mut indices: IndexMap<String, NodeIndex> = IndexMap::new();
        let mut node = |graph: &mut DiGraph<DotNode, EdgeKind>, label: String, function: bool| {
            *indices
                .entry(label.clone())
                .or_insert_with(|| graph.add_node(DotNode { label, function }))
        };

        for (output, rule) in &self.rules {
            let target = node(&mut graph, output.clone(), false);
            match rule.as_ref() {
                Rule::Rename { in_name, .. } => {
                    let source = node(&mut graph, in_name.clone(), false);
                    graph.update_edge(source, target, EdgeKind::Rename);
                }
                Rule::Compute { func, .. } => {
                    let sink = if simplified {
                        target
                    } else {
                        let function = node(&mut graph, format!("{}(...)", func.name()), true);
                        graph.update_edge(function, target, EdgeKind::Argument);
                        function
                    };
                    for dependency in rule.dependencies() {
                        let source = node(&mut graph, dependency.to_string(), false);
                        graph.update_edge(source, sink, EdgeKind::Argument);
                    }
                }
                Rule::Fetch { .. } => {}
            }
        }

        Dot::with_attr_getters(
            &graph,
            &[Config::NodeNoLabel, Config::EdgeNoLabel],
            &|_, edge| format!("style = {}", edge.weight()),
            &|_, (_, node)| {
                if node.function {
                    format!("label = \"{node}\" shape = ellipse style = filled color = lightgrey")
                } else {
                    format!("label = \"{node}\" shape = box height = 0.1")
                }
            },
        )
        .to_string()
    }
}

#[derive(Debug, Clone)]
struct DotNode {
    label: String,
    function: bool,
}

impl fmt::Display for DotNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
enum EdgeKind {
    #[strum(serialize = "dashed")]
    Rename,
    #[strum(serialize = "solid")]
    Argument,
}

/// Rules of `graph` in execution order, each rule once
pub fn rule_sequence(graph: &Graph) -> Result<Vec<Arc<Rule>>, LatticeTransformError> {
    let mut sequence: Vec<Arc<Rule>> = Vec::new();
    for name in graph.nodes_topologically()? {
        let Some(rule) = graph.get(&name) else { continue };
        if !sequence.iter().any(|seen| Arc::ptr_eq(seen, rule)) {
            sequence.push(rule.clone());
        }
    }
    Ok(sequence)
}

/// DOT rendering of a graph description
pub fn show_graph(dict: &GraphDict, simplified: bool) -> Result<String, LatticeTransformError> {
    Ok(Graph::try_new(dict)?.show(simplified))
}
