use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info_span, warn, Instrument};

use super::{ExecutionError, GraphExecutorStatisticsGatherer, NodeExecutionState};
use crate::cache::{CacheSelectHint, ComputationCache};
use crate::calcnode::{CalculationJobItem, LocalCalculationNode};
use crate::depgraph::DependencyGraph;
use crate::function::InvocationError;
use crate::time::ValuationTime;
use crate::value::ComputedValue;
use crate::wire::WireCodec;

/// Everything an executor needs to run one graph.
#[derive(Clone)]
pub struct ExecutionRequest {
    /// Name of the view the graph belongs to.
    pub view_name: String,
    /// Valuation time of the cycle.
    pub valuation_time: ValuationTime,
    /// Graph to execute, already stripped of nodes which need no execution.
    pub graph: Arc<DependencyGraph>,
    /// Cache to read inputs from and write outputs to.
    pub cache: Arc<dyn ComputationCache>,
    /// Executed/failed nodes of the graph's configuration in the cycle.
    pub node_state: Arc<NodeExecutionState>,
    /// Receiver of statistics.
    pub statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
}

impl Debug for ExecutionRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ExecutionRequest))
            .field("view_name", &self.view_name)
            .field("valuation_time", &self.valuation_time)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

/// Schedules dependency graphs for execution.
pub trait DependencyGraphExecutor: Debug + Send + Sync {
    /// Start executing a graph.
    ///
    /// Called once per calculation configuration per cycle.
    /// Execution proceeds in the background, the returned handle completes when it is over.
    fn execute(&self, request: ExecutionRequest) -> ExecutionHandle;
}

/// Handle to a graph execution running in the background.
///
/// The handle is a future resolving once execution is over.
/// Dropping it does not stop execution, [`cancel`](Self::cancel) does.
#[derive(Debug)]
pub struct ExecutionHandle {
    join: JoinHandle<Result<(), ExecutionError>>,
}

impl ExecutionHandle {
    /// Run `execution` as a new tokio task.
    ///
    /// # Panics
    ///
    /// This function will panic if called outside of tokio runtime.
    pub fn spawn<F>(execution: F) -> Self
    where
        F: Future<Output = Result<(), ExecutionError>> + Send + 'static,
    {
        ExecutionHandle {
            join: tokio::spawn(execution),
        }
    }

    /// Request execution to stop.
    ///
    /// Cancellation is best-effort: work already handed to a calculation node runs to completion.
    pub fn cancel(&self) {
        self.join.abort()
    }

    /// Check whether execution is over.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Future for ExecutionHandle {
    type Output = Result<(), ExecutionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.join).poll(cx).map(|r| match r {
            Ok(r) => r,
            Err(e) if e.is_cancelled() => Err(ExecutionError::Cancelled),
            Err(e) => Err(ExecutionError::Panicked(e.to_string())),
        })
    }
}

/// Executor running graphs inside the current process.
///
/// Nodes are dispatched as soon as every node they take inputs from within the graph is done,
/// so independent branches run concurrently.
/// Each node travels to the [`LocalCalculationNode`] as an encoded [`CalculationJobItem`], the
/// same way it would travel to a remote one, and runs on tokio's blocking pool.
///
/// Outputs land in the cache according to [`CacheSelectHint::from_graph`].
/// A node whose function fails is marked failed and execution carries on:
/// nodes depending on it will fail in turn for lack of inputs.
pub struct LocalDependencyGraphExecutor {
    node: Arc<LocalCalculationNode>,
}

impl LocalDependencyGraphExecutor {
    /// Create executor dispatching jobs to `node`.
    pub fn new(node: Arc<LocalCalculationNode>) -> Self {
        LocalDependencyGraphExecutor { node }
    }
}

impl DependencyGraphExecutor for LocalDependencyGraphExecutor {
    fn execute(&self, request: ExecutionRequest) -> ExecutionHandle {
        let span = info_span!(
            "execute graph",
            view = %request.view_name,
            config = %request.graph.calculation_configuration_name(),
            nodes = request.graph.size()
        );
        let node = self.node.clone();

        ExecutionHandle::spawn(
            async move {
                let statistics = request.statistics.clone();
                let config = request.graph.calculation_configuration_name().to_owned();

                let r = execute_graph(node, request).await;
                if r.is_err() {
                    statistics.graph_failed(&config);
                }

                r
            }
            .instrument(span),
        )
    }
}

impl Debug for LocalDependencyGraphExecutor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(LocalDependencyGraphExecutor))
            .field("node", &self.node)
            .finish()
    }
}

type JobOutcome = Result<Vec<ComputedValue>, InvocationError>;

async fn execute_graph(
    node: Arc<LocalCalculationNode>,
    request: ExecutionRequest,
) -> Result<(), ExecutionError> {
    use futures::stream::{FuturesUnordered, StreamExt};

    let start = Instant::now();
    let graph = &request.graph;
    let hint = CacheSelectHint::from_graph(graph);

    let mut blocking = Vec::with_capacity(graph.size());
    let mut dependents = vec![Vec::new(); graph.size()];
    for index in 0..graph.size() {
        let inputs: HashSet<_> = graph.input_indices(index).collect();
        for &input in &inputs {
            dependents[input].push(index);
        }
        blocking.push(inputs.len());
    }

    let mut ready: Vec<_> = (0..graph.size()).filter(|&i| blocking[i] == 0).collect();
    let mut running = FuturesUnordered::new();
    let mut executed = 0;

    debug!(ready = ready.len(), "start graph execution");

    loop {
        for index in ready.drain(..) {
            running.push(dispatch(node.clone(), &request, index));
        }

        let (index, outcome) = match running.next().await {
            Some(r) => r?,
            None => break,
        };

        let dependency_node = &graph.nodes()[index];
        match outcome {
            Ok(values) => {
                request.cache.put_values(values, &hint);
                request.node_state.mark_executed(&**dependency_node);
                executed += 1;
            }
            Err(e) => {
                warn!(node = %dependency_node, error = %e, "node failed");
                request.node_state.mark_failed(&**dependency_node);
            }
        }

        for &dependent in &dependents[index] {
            blocking[dependent] -= 1;
            if blocking[dependent] == 0 {
                ready.push(dependent);
            }
        }
    }

    let duration = start.elapsed();
    debug!(executed, ?duration, "graph execution finished");

    request.statistics.graph_processed(
        graph.calculation_configuration_name(),
        graph.size(),
        executed,
        duration,
    );

    Ok(())
}

/// Ship one node to the calculation node and await the outcome.
async fn dispatch(
    node: Arc<LocalCalculationNode>,
    request: &ExecutionRequest,
    index: usize,
) -> Result<(usize, JobOutcome), ExecutionError> {
    let item = CalculationJobItem::from_node(
        &request.graph.nodes()[index],
        node.identifiers().as_ref(),
    );
    let bytes = item
        .to_bytes()
        .map_err(|e| ExecutionError::Dispatch(e.to_string()))?;
    let cache = request.cache.clone();

    let outcome = tokio::task::spawn_blocking(move || -> Result<JobOutcome, ExecutionError> {
        let item = CalculationJobItem::from_bytes(&bytes)?;

        Ok(node.execute(&item, cache.as_ref()))
    })
    .await
    .map_err(|e| ExecutionError::Panicked(e.to_string()))??;

    Ok((index, outcome))
}
