//! Task graph execution for a single lead.
//!
//! Ready nodes are spawned onto a [`JoinSet`]; a node becomes ready once all
//! of its dependencies succeeded. A failed or skipped dependency marks every
//! transitive dependent `Skipped`. When the lead deadline passes, nothing new
//! starts: unstarted nodes are skipped while running ones drain.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadqual_shared::{ExecutionMode, Result};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::graph::{Inputs, NodeId, NodeOutput, TaskGraph};

/// Runs individual nodes. The pipeline stages implement this; tests script it.
#[async_trait]
pub trait NodeRunner: Send + Sync {
    async fn run(&self, node: NodeId, inputs: Inputs) -> Result<NodeOutput>;
}

/// Why a node never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "node")]
pub enum SkipReason {
    DependencyFailed(NodeId),
    Timeout,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyFailed(node) => write!(f, "dependency {node} did not succeed"),
            Self::Timeout => f.write_str("lead timeout"),
        }
    }
}

/// Final state of one node.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    Succeeded(NodeOutput),
    Failed(String),
    Skipped(SkipReason),
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn output(&self) -> Option<&NodeOutput> {
        match self {
            Self::Succeeded(output) => Some(output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub mode: ExecutionMode,
    pub timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Concurrent,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Execute every node of `graph` and return each node's outcome.
pub async fn execute(
    graph: &TaskGraph,
    runner: Arc<dyn NodeRunner>,
    options: &ExecutorOptions,
) -> BTreeMap<NodeId, NodeOutcome> {
    let deadline = tokio::time::Instant::now() + options.timeout;
    let max_in_flight = match options.mode {
        ExecutionMode::Sequential => 1,
        ExecutionMode::Concurrent => usize::MAX,
    };

    let mut outcomes: BTreeMap<NodeId, NodeOutcome> = BTreeMap::new();
    let mut running: JoinSet<(NodeId, Result<NodeOutput>)> = JoinSet::new();
    let mut in_flight: HashMap<tokio::task::Id, NodeId> = HashMap::new();
    let mut timed_out = false;

    loop {
        skip_blocked(graph, &mut outcomes, &in_flight);

        if !timed_out {
            for &id in graph.order() {
                if running.len() >= max_in_flight {
                    break;
                }
                if outcomes.contains_key(&id) || in_flight.values().any(|n| *n == id) {
                    continue;
                }
                let Some(outputs) = ready_inputs(graph, id, &outcomes) else {
                    continue;
                };

                debug!(node = %id, "starting node");
                let runner = Arc::clone(&runner);
                let inputs = Inputs::new(id, outputs);
                let handle = running.spawn(async move { (id, runner.run(id, inputs).await) });
                in_flight.insert(handle.id(), id);
            }
        }

        if running.is_empty() {
            break;
        }

        tokio::select! {
            joined = running.join_next_with_id() => {
                let (node, outcome) = match joined {
                    Some(Ok((task, (node, result)))) => {
                        in_flight.remove(&task);
                        let outcome = match result {
                            Ok(output) => NodeOutcome::Succeeded(output),
                            Err(e) => {
                                warn!(node = %node, error = %e, "node failed");
                                NodeOutcome::Failed(e.to_string())
                            }
                        };
                        (node, outcome)
                    }
                    Some(Err(join_error)) => {
                        let Some(node) = in_flight.remove(&join_error.id()) else {
                            continue;
                        };
                        warn!(node = %node, error = %join_error, "node task aborted");
                        (node, NodeOutcome::Failed(format!("task aborted: {join_error}")))
                    }
                    None => continue,
                };
                outcomes.insert(node, outcome);
            }
            _ = tokio::time::sleep_until(deadline), if !timed_out => {
                timed_out = true;
                warn!(
                    timeout = ?options.timeout,
                    running = running.len(),
                    "lead timed out; letting running nodes finish"
                );
            }
        }
    }

    for &id in graph.order() {
        outcomes.entry(id).or_insert_with(|| {
            if !timed_out {
                warn!(node = %id, "node never became ready");
            }
            NodeOutcome::Skipped(SkipReason::Timeout)
        });
    }
    outcomes
}

/// Mark pending nodes whose dependencies failed or were skipped. One pass in
/// topological order covers transitive dependents.
fn skip_blocked(
    graph: &TaskGraph,
    outcomes: &mut BTreeMap<NodeId, NodeOutcome>,
    in_flight: &HashMap<tokio::task::Id, NodeId>,
) {
    for &id in graph.order() {
        if outcomes.contains_key(&id) || in_flight.values().any(|n| *n == id) {
            continue;
        }
        let blocker = graph
            .dependencies(id)
            .find(|dep| matches!(outcomes.get(dep), Some(o) if !o.is_success()));
        if let Some(dep) = blocker {
            debug!(node = %id, dependency = %dep, "skipping node");
            outcomes.insert(id, NodeOutcome::Skipped(SkipReason::DependencyFailed(dep)));
        }
    }
}

/// The dependency outputs of `id`, if every dependency has succeeded.
fn ready_inputs(
    graph: &TaskGraph,
    id: NodeId,
    outcomes: &BTreeMap<NodeId, NodeOutcome>,
) -> Option<BTreeMap<NodeId, NodeOutput>> {
    graph
        .dependencies(id)
        .map(|dep| {
            outcomes
                .get(&dep)
                .and_then(NodeOutcome::output)
                .map(|output| (dep, output.clone()))
        })
        .collect()
}
