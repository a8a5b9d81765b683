//! Per-lead task graph.
//!
//! Nodes declare the dependencies whose typed outputs they consume; the
//! executor hands each node exactly those outputs as [`Inputs`]. Graphs are
//! validated at construction: unknown dependencies and cycles are rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use leadqual_shared::{LeadQualError, Result, Stage};
use leadqual_storage::RecordRef;
use serde::Serialize;

use crate::enrich::Enrichment;
use crate::stages::{PersistSummary, StageOutput};

// ---------------------------------------------------------------------------
// Node ids
// ---------------------------------------------------------------------------

/// Pipeline steps for one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    StoreOrFind,
    Enrich,
    IndividualEval,
    CompanyEval,
    TechnicalEval,
    PainPointAnalysis,
    OfferCreation,
    CampaignGeneration,
    PersistResults,
}

impl NodeId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreOrFind => "store_or_find",
            Self::Enrich => "enrich",
            Self::IndividualEval => "individual_eval",
            Self::CompanyEval => "company_eval",
            Self::TechnicalEval => "technical_eval",
            Self::PainPointAnalysis => "pain_point_analysis",
            Self::OfferCreation => "offer_creation",
            Self::CampaignGeneration => "campaign_generation",
            Self::PersistResults => "persist_results",
        }
    }

    /// The persisted stage this node drives, if any.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::IndividualEval => Some(Stage::Individual),
            Self::CompanyEval => Some(Stage::Company),
            Self::TechnicalEval => Some(Stage::Technical),
            Self::PainPointAnalysis => Some(Stage::PainPoint),
            Self::OfferCreation => Some(Stage::Offer),
            Self::CampaignGeneration => Some(Stage::Campaign),
            Self::StoreOrFind | Self::Enrich | Self::PersistResults => None,
        }
    }

    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::Individual => Self::IndividualEval,
            Stage::Company => Self::CompanyEval,
            Stage::Technical => Self::TechnicalEval,
            Stage::PainPoint => Self::PainPointAnalysis,
            Stage::Offer => Self::OfferCreation,
            Stage::Campaign => Self::CampaignGeneration,
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Typed outputs
// ---------------------------------------------------------------------------

/// What a node hands to its dependents.
#[derive(Debug, Clone)]
pub enum NodeOutput {
    Record(RecordRef),
    Enrichment(Arc<Enrichment>),
    Stage(Arc<StageOutput>),
    Persisted(PersistSummary),
}

/// The outputs of a node's declared dependencies.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    node: Option<NodeId>,
    outputs: BTreeMap<NodeId, NodeOutput>,
}

impl Inputs {
    pub fn new(node: NodeId, outputs: BTreeMap<NodeId, NodeOutput>) -> Self {
        Self {
            node: Some(node),
            outputs,
        }
    }

    fn missing(&self, dependency: NodeId) -> LeadQualError {
        let node = self.node.map(NodeId::as_str).unwrap_or("?");
        LeadQualError::pipeline(format!("{node} has no usable output from {dependency}"))
    }

    /// Ids of the dependencies whose outputs are present.
    pub fn keys(&self) -> Vec<NodeId> {
        self.outputs.keys().copied().collect()
    }

    /// The lead's record as found or created by `StoreOrFind`.
    pub fn record(&self) -> Result<&RecordRef> {
        match self.outputs.get(&NodeId::StoreOrFind) {
            Some(NodeOutput::Record(record)) => Ok(record),
            _ => Err(self.missing(NodeId::StoreOrFind)),
        }
    }

    pub fn enrichment(&self) -> Result<&Arc<Enrichment>> {
        match self.outputs.get(&NodeId::Enrich) {
            Some(NodeOutput::Enrichment(enrichment)) => Ok(enrichment),
            _ => Err(self.missing(NodeId::Enrich)),
        }
    }

    pub fn stage(&self, stage: Stage) -> Result<&Arc<StageOutput>> {
        let node = NodeId::for_stage(stage);
        match self.outputs.get(&node) {
            Some(NodeOutput::Stage(output)) => Ok(output),
            _ => Err(self.missing(node)),
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A node and the nodes whose outputs it consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    pub id: NodeId,
    pub dependencies: BTreeSet<NodeId>,
}

impl TaskNode {
    pub fn new(id: NodeId, dependencies: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            id,
            dependencies: dependencies.into_iter().collect(),
        }
    }
}

/// A validated DAG of task nodes.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: BTreeMap<NodeId, TaskNode>,
    order: Vec<NodeId>,
}

impl TaskGraph {
    /// Validate `nodes` into a graph. Fails on duplicate ids, dependencies on
    /// nodes that are not in the graph, and cycles.
    pub fn new(nodes: impl IntoIterator<Item = TaskNode>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for node in nodes {
            let id = node.id;
            if map.insert(id, node).is_some() {
                return Err(LeadQualError::pipeline(format!("duplicate node {id}")));
            }
        }

        for node in map.values() {
            if let Some(unknown) = node.dependencies.iter().find(|d| !map.contains_key(d)) {
                return Err(LeadQualError::pipeline(format!(
                    "{} depends on {unknown}, which is not in the graph",
                    node.id
                )));
            }
        }

        let order = topological_order(&map)?;
        Ok(Self { nodes: map, order })
    }

    /// The per-lead pipeline:
    /// `StoreOrFind → Enrich → {Individual, Company, Technical}Eval →
    /// PainPointAnalysis → OfferCreation → CampaignGeneration → PersistResults`.
    pub fn lead_pipeline() -> Result<Self> {
        use NodeId::*;
        Self::new([
            TaskNode::new(StoreOrFind, []),
            TaskNode::new(Enrich, [StoreOrFind]),
            TaskNode::new(IndividualEval, [StoreOrFind, Enrich]),
            TaskNode::new(CompanyEval, [StoreOrFind, Enrich]),
            TaskNode::new(TechnicalEval, [StoreOrFind, Enrich]),
            TaskNode::new(
                PainPointAnalysis,
                [StoreOrFind, Enrich, IndividualEval, CompanyEval, TechnicalEval],
            ),
            TaskNode::new(OfferCreation, [StoreOrFind, Enrich, PainPointAnalysis]),
            TaskNode::new(CampaignGeneration, [StoreOrFind, Enrich, OfferCreation]),
            TaskNode::new(
                PersistResults,
                [
                    StoreOrFind,
                    Enrich,
                    IndividualEval,
                    CompanyEval,
                    TechnicalEval,
                    PainPointAnalysis,
                    OfferCreation,
                    CampaignGeneration,
                ],
            ),
        ])
    }

    /// Nodes in a dependency-respecting order (ties broken by id).
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(&id)
            .into_iter()
            .flat_map(|n| n.dependencies.iter().copied())
    }
}

/// Kahn's algorithm; any node left over sits on a cycle.
fn topological_order(nodes: &BTreeMap<NodeId, TaskNode>) -> Result<Vec<NodeId>> {
    let mut remaining: BTreeMap<NodeId, usize> = nodes
        .values()
        .map(|n| (n.id, n.dependencies.len()))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    loop {
        let ready: Vec<NodeId> = remaining
            .iter()
            .filter(|(_, pending)| **pending == 0)
            .map(|(id, _)| *id)
            .collect();
        if ready.is_empty() {
            break;
        }
        for id in ready {
            remaining.remove(&id);
            order.push(id);
            for node in nodes.values().filter(|n| n.dependencies.contains(&id)) {
                if let Some(pending) = remaining.get_mut(&node.id) {
                    *pending -= 1;
                }
            }
        }
    }

    if remaining.is_empty() {
        Ok(order)
    } else {
        let cycle: Vec<&str> = remaining.keys().map(|id| id.as_str()).collect();
        Err(LeadQualError::pipeline(format!(
            "task graph has a cycle through: {}",
            cycle.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use super::NodeId::*;

    #[test]
    fn lead_pipeline_orders_dependencies_first() {
        let graph = TaskGraph::lead_pipeline().expect("valid graph");
        let order = graph.order();
        let pos = |id: NodeId| order.iter().position(|n| *n == id).expect("present");

        assert_eq!(order.len(), 9);
        assert_eq!(order[0], StoreOrFind);
        assert_eq!(order[1], Enrich);
        assert!(pos(IndividualEval) < pos(PainPointAnalysis));
        assert!(pos(CompanyEval) < pos(PainPointAnalysis));
        assert!(pos(TechnicalEval) < pos(PainPointAnalysis));
        assert!(pos(OfferCreation) < pos(CampaignGeneration));
        assert_eq!(order[8], PersistResults);
    }

    #[test]
    fn cycles_are_rejected() {
        let err = TaskGraph::new([
            TaskNode::new(StoreOrFind, []),
            TaskNode::new(Enrich, [StoreOrFind, PersistResults]),
            TaskNode::new(PersistResults, [Enrich]),
        ])
        .expect_err("cycle");
        let message = err.to_string();
        assert!(message.contains("cycle"), "{message}");
        assert!(message.contains("enrich"), "{message}");
        assert!(!message.contains("store_or_find"), "{message}");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        assert!(TaskGraph::new([TaskNode::new(Enrich, [Enrich])]).is_err());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = TaskGraph::new([TaskNode::new(Enrich, [StoreOrFind])]).expect_err("unknown");
        assert!(err.to_string().contains("not in the graph"));
    }

    #[test]
    fn stage_nodes_round_trip() {
        for stage in Stage::ALL {
            assert_eq!(NodeId::for_stage(stage).stage(), Some(stage));
        }
        assert_eq!(PersistResults.stage(), None);
    }

    #[test]
    fn missing_input_is_a_pipeline_error() {
        let inputs = Inputs::new(CompanyEval, BTreeMap::new());
        let err = inputs.record().expect_err("missing");
        assert!(matches!(err, LeadQualError::Pipeline { .. }));
        assert!(err.to_string().contains("company_eval"));
    }
}
