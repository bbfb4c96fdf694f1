use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::select;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{
    ComputationCycleQuery, CycleError, DumpError, ExecutionHandle, ExecutionRequest,
    LiveDataDeltaCalculator, NodeExecutionState,
};
use crate::cache::{CacheSelectHint, ComputationCache};
use crate::depgraph::{DependencyGraph, DependencyNode};
use crate::time::{ResultTimestamp, ValuationTime};
use crate::value::{ComputedValue, ValueRequirement};
use crate::view::{View, ViewComputationResultModel};

/// State of a computation cycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CycleState {
    /// Freshly constructed.
    Created,
    /// Caches allocated and live data loaded.
    InputsPrepared,
    /// Graphs submitted, waiting for completion.
    Executing,
    /// Execution was interrupted or failed.
    ExecutionInterrupted,
    /// Every graph was executed.
    Finished,
    /// Resources released.
    Cleaned,
}

impl CycleState {
    fn name(self) -> &'static str {
        use CycleState::*;

        match self {
            Created => "CREATED",
            InputsPrepared => "INPUTS_PREPARED",
            Executing => "EXECUTING",
            ExecutionInterrupted => "EXECUTION_INTERRUPTED",
            Finished => "FINISHED",
            Cleaned => "CLEANED",
        }
    }
}

impl Display for CycleState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle to interrupt a running cycle from elsewhere.
///
/// Interruption is sticky: interrupting a cycle before it starts executing makes
/// [`execute_plans`](SingleComputationCycle::execute_plans) stop as soon as it starts waiting.
#[derive(Debug, Clone)]
pub struct Interrupter(Arc<watch::Sender<bool>>);

impl Interrupter {
    /// Interrupt the cycle.
    pub fn interrupt(&self) {
        self.0.send_replace(true);
    }

    /// Check whether the cycle was interrupted.
    pub fn is_interrupted(&self) -> bool {
        *self.0.borrow()
    }
}

/// One valuation pass of a view.
///
/// See [module-level](crate::calc) documentation for the life cycle.
pub struct SingleComputationCycle {
    view: Arc<View>,
    valuation_time: ValuationTime,
    state: CycleState,
    caches: BTreeMap<String, Arc<dyn ComputationCache>>,
    node_states: BTreeMap<String, Arc<NodeExecutionState>>,
    result_model: ViewComputationResultModel,
    interrupter: Interrupter,
    start: Option<Instant>,
    end: Option<Instant>,
}

impl SingleComputationCycle {
    /// Create a cycle of `view` valued as of `valuation_time`.
    pub fn new(view: Arc<View>, valuation_time: ValuationTime) -> Self {
        let result_model = ViewComputationResultModel::new(view.name(), valuation_time);
        let (interrupt, _) = watch::channel(false);
        let node_states = view
            .evaluation_model()
            .calculation_configuration_names()
            .map(|name| (name.to_owned(), Default::default()))
            .collect();

        SingleComputationCycle {
            view,
            valuation_time,
            state: CycleState::Created,
            caches: BTreeMap::new(),
            node_states,
            result_model,
            interrupter: Interrupter(Arc::new(interrupt)),
            start: None,
            end: None,
        }
    }

    /// View the cycle belongs to.
    pub fn view(&self) -> &Arc<View> {
        &self.view
    }

    /// Valuation time of the cycle.
    pub fn valuation_time(&self) -> ValuationTime {
        self.valuation_time
    }

    /// Current state.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Handle to interrupt the cycle.
    pub fn interrupter(&self) -> Interrupter {
        self.interrupter.clone()
    }

    /// Result model, complete once [`populate_result_model`](Self::populate_result_model) returns.
    pub fn result_model(&self) -> &ViewComputationResultModel {
        &self.result_model
    }

    /// Time between preparing inputs and end of execution.
    pub fn duration(&self) -> Option<Duration> {
        Some(self.end?.duration_since(self.start?))
    }

    /// Cache of a calculation configuration.
    pub fn computation_cache(
        &self,
        calculation_configuration_name: &str,
    ) -> Option<&Arc<dyn ComputationCache>> {
        self.caches.get(calculation_configuration_name)
    }

    /// Executed and failed nodes of a calculation configuration.
    ///
    /// Every configuration keeps its own state: a node present in several graphs is executed
    /// once per configuration.
    pub fn node_execution_state(
        &self,
        calculation_configuration_name: &str,
    ) -> Option<&Arc<NodeExecutionState>> {
        self.node_states.get(calculation_configuration_name)
    }

    /// Check whether node was executed for a configuration in this cycle.
    ///
    /// Nothing is executed for a configuration the view does not have.
    pub fn is_executed<'a>(
        &self,
        calculation_configuration_name: &str,
        node: impl Into<Option<&'a DependencyNode>>,
    ) -> bool {
        let node = node.into();

        match self.node_states.get(calculation_configuration_name) {
            Some(state) => state.is_executed(node),
            None => node.is_none(),
        }
    }

    /// Record node as executed for a configuration in this cycle.
    pub fn mark_executed<'a>(
        &self,
        calculation_configuration_name: &str,
        node: impl Into<Option<&'a DependencyNode>>,
    ) -> Result<(), CycleError> {
        self.node_state(calculation_configuration_name)?
            .mark_executed(node);

        Ok(())
    }

    /// Check whether node failed for a configuration in this cycle.
    ///
    /// Nothing is failed for a configuration the view does not have.
    pub fn is_failed<'a>(
        &self,
        calculation_configuration_name: &str,
        node: impl Into<Option<&'a DependencyNode>>,
    ) -> bool {
        let node = node.into();

        match self.node_states.get(calculation_configuration_name) {
            Some(state) => state.is_failed(node),
            None => node.is_none(),
        }
    }

    /// Record node as failed for a configuration in this cycle.
    pub fn mark_failed<'a>(
        &self,
        calculation_configuration_name: &str,
        node: impl Into<Option<&'a DependencyNode>>,
    ) -> Result<(), CycleError> {
        self.node_state(calculation_configuration_name)?
            .mark_failed(node);

        Ok(())
    }

    fn require(
        &self,
        operation: &'static str,
        expected: &'static [CycleState],
    ) -> Result<(), CycleError> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(CycleError::InvalidState {
                operation,
                expected,
                actual: self.state,
            })
        }
    }

    fn cache(&self, name: &str) -> Result<&Arc<dyn ComputationCache>, CycleError> {
        self.caches
            .get(name)
            .ok_or_else(|| CycleError::UnknownConfiguration(name.to_owned()))
    }

    fn node_state(&self, name: &str) -> Result<&Arc<NodeExecutionState>, CycleError> {
        self.node_states
            .get(name)
            .ok_or_else(|| CycleError::UnknownConfiguration(name.to_owned()))
    }

    /// Allocate caches and load live data into them.
    ///
    /// Every live data value is written into the shared partition of every configuration's
    /// cache.
    /// Values the provider does not have are reported in a single warning and otherwise ignored.
    pub fn prepare_inputs(&mut self) -> Result<(), CycleError> {
        self.require("prepare inputs", &[CycleState::Created])?;
        self.start = Some(Instant::now());

        let context = self.view.processing_context();
        let model = self.view.evaluation_model();

        for name in model.calculation_configuration_names() {
            let cache = context
                .cache_source()
                .get_cache(self.view.name(), name, self.valuation_time);
            self.caches.insert(name.to_owned(), cache);
        }

        let mut missing = Vec::new();
        for specification in model.all_live_data_requirements() {
            let requirement = specification.requirement_specification();

            match context
                .live_data()
                .query_snapshot(self.valuation_time, &requirement)
            {
                Some(value) => {
                    for cache in self.caches.values() {
                        cache.put_shared_value(ComputedValue::new(
                            specification.clone(),
                            value.clone(),
                        ));
                    }
                }
                None => missing.push(format_requirement(&requirement)),
            }
        }

        if !missing.is_empty() {
            warn!(
                view = self.view.name(),
                valuation_time = %self.valuation_time,
                missing = missing.len(),
                "missing live data: {}",
                missing.join(", ")
            );
        }

        self.state = CycleState::InputsPrepared;

        Ok(())
    }

    /// Reuse outputs of `previous` cycle for nodes whose live data did not change.
    ///
    /// Such nodes are marked executed and those of their outputs present in the previous cycle's
    /// caches are copied over.
    /// Skipping this step never changes results, it only costs recomputation.
    pub fn compute_delta(&mut self, previous: &SingleComputationCycle) -> Result<(), CycleError> {
        self.require("compute delta", &[CycleState::InputsPrepared])?;
        if previous.state != CycleState::Finished {
            return Err(CycleError::InvalidArgument(format!(
                "previous cycle must be {}, but is {}",
                CycleState::Finished,
                previous.state
            )));
        }

        for (name, graph) in self.view.evaluation_model().dependency_graphs() {
            let cache = self.cache(name)?;
            let node_state = self.node_state(name)?;
            let previous_cache = match previous.caches.get(name) {
                Some(cache) => cache,
                None => {
                    debug!(config = %name, "previous cycle has no cache, skip delta");
                    continue;
                }
            };

            let delta =
                LiveDataDeltaCalculator::new(graph, cache.as_ref(), previous_cache.as_ref())
                    .compute_delta();
            let hint = CacheSelectHint::from_graph(graph);

            for node in &delta.unchanged {
                node_state.mark_executed(&**node);

                let values = node
                    .output_values()
                    .iter()
                    .filter_map(|output| {
                        previous_cache
                            .get_value(output)
                            .map(|value| ComputedValue::new(output.clone(), value))
                    })
                    .collect();
                cache.put_values(values, &hint);
            }

            info!(
                config = %name,
                nodes = graph.size(),
                changed = delta.changed.len(),
                "computed delta, {} of {} nodes require execution",
                delta.changed.len(),
                graph.size()
            );
        }

        Ok(())
    }

    /// Part of `graph` which still needs execution.
    ///
    /// Live data sourcing nodes are marked executed first, then every executed node is filtered
    /// out.
    /// Failed nodes are kept.
    /// Execution state is looked up by the graph's calculation configuration.
    pub fn executable_dependency_graph(
        &self,
        graph: &DependencyGraph,
    ) -> Result<DependencyGraph, CycleError> {
        let node_state = self.node_state(graph.calculation_configuration_name())?;

        for node in graph.nodes() {
            if !node.function().kind().requires_invocation() {
                node_state.mark_executed(&**node);
            }
        }

        Ok(graph.sub_graph(|node| !node_state.is_executed(node)))
    }

    /// Execute every configuration's graph and wait for completion.
    ///
    /// Handles are awaited one at a time for at most the configured poll interval;
    /// a handle which is not done yet goes back to the end of the queue.
    ///
    /// On interruption every outstanding handle is cancelled, the cycle moves to
    /// [`CycleState::ExecutionInterrupted`] and [`CycleError::Interrupted`] is returned.
    /// When a graph fails as a whole, outstanding handles are cancelled as well and
    /// [`CycleError::Execution`] is returned.
    pub async fn execute_plans(&mut self) -> Result<(), CycleError> {
        self.require("execute plans", &[CycleState::InputsPrepared])?;
        self.state = CycleState::Executing;

        let context = self.view.processing_context().clone();
        let poll_interval = context.config().poll_interval();

        let mut pending = VecDeque::new();
        for (name, graph) in self.view.evaluation_model().dependency_graphs() {
            let executable = Arc::new(self.executable_dependency_graph(graph)?);
            info!(
                config = %name,
                nodes = executable.size(),
                total = graph.size(),
                "submit graph for execution"
            );

            let request = ExecutionRequest {
                view_name: self.view.name().to_owned(),
                valuation_time: self.valuation_time,
                graph: executable,
                cache: self.cache(name)?.clone(),
                node_state: self.node_state(name)?.clone(),
                statistics: context.statistics().clone(),
            };
            pending.push_back((name.clone(), context.executor().execute(request)));
        }

        let mut interrupted = self.interrupter.0.subscribe();

        while let Some((name, mut handle)) = pending.pop_front() {
            let outcome = select! {
                biased;

                _ = interrupted.wait_for(|&flag| flag) => None,
                r = tokio::time::timeout(poll_interval, &mut handle) => Some(r),
            };

            match outcome {
                None => {
                    info!(config = %name, outstanding = pending.len() + 1, "execution interrupted");

                    handle.cancel();
                    cancel_all(&pending);
                    self.finish_execution(CycleState::ExecutionInterrupted);

                    return Err(CycleError::Interrupted);
                }
                Some(Err(_)) => {
                    debug!(config = %name, "waiting for execution of {}", name);
                    pending.push_back((name, handle));
                }
                Some(Ok(Ok(()))) => {
                    debug!(config = %name, "execution complete");
                }
                Some(Ok(Err(source))) => {
                    error!(config = %name, error = %source, "execution failed");

                    cancel_all(&pending);
                    self.finish_execution(CycleState::ExecutionInterrupted);

                    return Err(CycleError::Execution {
                        configuration: name,
                        source,
                    });
                }
            }
        }

        self.finish_execution(CycleState::Finished);

        Ok(())
    }

    fn finish_execution(&mut self, state: CycleState) {
        self.end = Some(Instant::now());
        self.state = state;
    }

    /// Copy reported outputs out of caches into the result model.
    ///
    /// Outputs are reported when they are present in cache and the view's result model
    /// definition asks for them.
    pub fn populate_result_model(&mut self) -> Result<(), CycleError> {
        self.require("populate result model", &[CycleState::Finished])?;

        let model = self.view.evaluation_model().clone();
        let definition = self.view.definition().result_model_definition();

        for (name, graph) in model.dependency_graphs() {
            self.result_model.add_calculation_configuration(name.as_str());

            let outputs: Vec<_> = graph
                .output_values()
                .filter(|output| definition.should_output_result(output, graph))
                .cloned()
                .collect();
            let values = self
                .cache(name)?
                .get_values(&outputs, &CacheSelectHint::from_graph(graph));

            for (specification, value) in values {
                if let Some(value) = value {
                    self.result_model
                        .add_value(name, ComputedValue::new(specification, value));
                }
            }
        }

        self.result_model.set_result_timestamp(ResultTimestamp::now());

        Ok(())
    }

    /// Values held in a configuration's cache.
    ///
    /// Values not present in cache are left out.
    pub fn query_computation_caches(
        &self,
        query: &ComputationCycleQuery,
    ) -> Result<Vec<ComputedValue>, CycleError> {
        let cache = self.cache(&query.calculation_configuration_name)?;

        Ok(query
            .value_specifications
            .iter()
            .filter_map(|specification| {
                cache
                    .get_value(specification)
                    .map(|value| ComputedValue::new(specification.clone(), value))
            })
            .collect())
    }

    /// Write every configuration's cache into a text file, entries sorted by key.
    ///
    /// Files are created in [`CycleConfig::dump_directory`](crate::CycleConfig::dump_directory)
    /// and kept after the cycle is gone.
    pub fn dump_computation_caches(&self) -> Result<Vec<PathBuf>, DumpError> {
        let directory = self.view.processing_context().config().dump_directory();

        self.caches
            .iter()
            .map(|(name, cache)| -> Result<PathBuf, DumpError> {
                let mut file = tempfile::Builder::new()
                    .prefix(&format!("computation-cache-{}-", name))
                    .suffix(".txt")
                    .tempfile_in(&directory)?;

                let entries: BTreeMap<_, _> = cache
                    .entries()
                    .into_iter()
                    .map(|(specification, value)| (specification.to_string(), value))
                    .collect();

                for (key, value) in entries {
                    writeln!(file, "{} -> {}", key, value)?;
                }
                file.flush()?;

                let path = file.into_temp_path().keep()?;
                info!(config = %name, path = %path.display(), "dumped computation cache");

                Ok(path)
            })
            .collect()
    }

    /// Release live data snapshot and caches of the cycle.
    ///
    /// If the view asks for it, caches are dumped to disk first.
    /// Failing to dump is logged and does not prevent resources from being released.
    pub fn release_resources(&mut self) -> Result<(), CycleError> {
        self.require(
            "release resources",
            &[CycleState::Finished, CycleState::ExecutionInterrupted],
        )?;

        if self.view.definition().dump_computation_cache_to_disk() {
            if let Err(e) = self.dump_computation_caches() {
                error!(error = %e, "failed to dump computation caches");
            }
        }

        let context = self.view.processing_context();
        context.live_data().release_snapshot(self.valuation_time);
        context
            .cache_source()
            .release_caches(self.view.name(), self.valuation_time);
        self.caches.clear();

        self.state = CycleState::Cleaned;

        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_state(mut self, state: CycleState) -> Self {
        self.state = state;
        self
    }
}

fn cancel_all(pending: &VecDeque<(String, ExecutionHandle)>) {
    for (_, handle) in pending {
        handle.cancel();
    }
}

fn format_requirement(requirement: &ValueRequirement) -> String {
    let target = requirement.target_specification();

    format!(
        "[{} on {}-{}:{}]",
        requirement.value_name(),
        target.target_type(),
        target.identifier().scheme(),
        target.identifier().value()
    )
}

impl Debug for SingleComputationCycle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(SingleComputationCycle))
            .field("view", &self.view.name())
            .field("valuation_time", &self.valuation_time)
            .field("state", &self.state)
            .field("node_states", &self.node_states)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use parking_lot::Mutex;
    use rstest::rstest;

    use super::*;
    use crate::cache::InMemoryComputationCacheSource;
    use crate::calc::{DependencyGraphExecutor, ExecutionError};
    use crate::change::NoopChangeManager;
    use crate::config::CycleConfig;
    use crate::depgraph::test::{chain, spec};
    use crate::livedata::InMemoryLiveDataSnapshotProvider;
    use crate::value::{Value, ValueSpecification};
    use crate::view::{ViewDefinition, ViewEvaluationModel, ViewProcessingContext};

    /// Writes `1` under every output and records size of submitted graphs.
    #[derive(Debug, Default)]
    struct Complete {
        submitted: Mutex<Vec<usize>>,
    }

    impl DependencyGraphExecutor for Complete {
        fn execute(&self, request: ExecutionRequest) -> ExecutionHandle {
            self.submitted.lock().push(request.graph.size());

            let hint = CacheSelectHint::from_graph(&request.graph);
            for node in request.graph.nodes() {
                let values = node
                    .output_values()
                    .iter()
                    .map(|output| ComputedValue::new(output.clone(), Value::from(1)))
                    .collect();
                request.cache.put_values(values, &hint);
                request.node_state.mark_executed(&**node);
            }

            ExecutionHandle::spawn(async { Ok(()) })
        }
    }

    /// Writes length of the configuration name under every output.
    #[derive(Debug, Default)]
    struct PerConfiguration {
        submitted: Mutex<Vec<(String, usize)>>,
    }

    impl DependencyGraphExecutor for PerConfiguration {
        fn execute(&self, request: ExecutionRequest) -> ExecutionHandle {
            let name = request.graph.calculation_configuration_name().to_owned();
            let value = Value::from(name.len() as i64);
            self.submitted.lock().push((name, request.graph.size()));

            let hint = CacheSelectHint::from_graph(&request.graph);
            for node in request.graph.nodes() {
                let values = node
                    .output_values()
                    .iter()
                    .map(|output| ComputedValue::new(output.clone(), value.clone()))
                    .collect();
                request.cache.put_values(values, &hint);
                request.node_state.mark_executed(&**node);
            }

            ExecutionHandle::spawn(async { Ok(()) })
        }
    }

    #[derive(Debug)]
    struct Hang;

    impl DependencyGraphExecutor for Hang {
        fn execute(&self, _request: ExecutionRequest) -> ExecutionHandle {
            ExecutionHandle::spawn(std::future::pending())
        }
    }

    #[derive(Debug)]
    struct Slow(Duration);

    impl DependencyGraphExecutor for Slow {
        fn execute(&self, _request: ExecutionRequest) -> ExecutionHandle {
            let delay = self.0;

            ExecutionHandle::spawn(async move {
                tokio::time::sleep(delay).await;
                Ok(())
            })
        }
    }

    #[derive(Debug)]
    struct Broken;

    impl DependencyGraphExecutor for Broken {
        fn execute(&self, _request: ExecutionRequest) -> ExecutionHandle {
            ExecutionHandle::spawn(async { Err(ExecutionError::Dispatch("no route".to_owned())) })
        }
    }

    struct Fixture {
        live_data: Arc<InMemoryLiveDataSnapshotProvider>,
        caches: Arc<InMemoryComputationCacheSource>,
        view: Arc<View>,
    }

    impl Fixture {
        fn new(executor: Arc<dyn DependencyGraphExecutor>) -> Self {
            Self::with(
                executor,
                ViewDefinition::new("View"),
                vec![chain()],
                CycleConfig::default(),
            )
        }

        fn with(
            executor: Arc<dyn DependencyGraphExecutor>,
            definition: ViewDefinition,
            graphs: Vec<DependencyGraph>,
            config: CycleConfig,
        ) -> Self {
            let live_data = Arc::new(InMemoryLiveDataSnapshotProvider::new(Arc::new(
                NoopChangeManager,
            )));
            live_data.add_value(spot().requirement_specification(), Value::from(42));

            let caches = Arc::new(InMemoryComputationCacheSource::new());
            let context = ViewProcessingContext::new(live_data.clone(), caches.clone(), executor)
                .with_config(config.with_poll_interval(Duration::from_millis(5)));
            let view = Arc::new(View::new(
                definition,
                ViewEvaluationModel::new(graphs),
                context,
            ));

            Fixture {
                live_data,
                caches,
                view,
            }
        }

        fn cycle(&self, millis: i64) -> SingleComputationCycle {
            SingleComputationCycle::new(self.view.clone(), ValuationTime::from_epoch_millis(millis))
        }

        async fn finished_cycle(&self, millis: i64) -> SingleComputationCycle {
            let mut cycle = self.cycle(millis);
            cycle.prepare_inputs().unwrap();
            cycle.execute_plans().await.unwrap();

            cycle
        }
    }

    fn spot() -> ValueSpecification {
        spec("Spot", "A")
    }

    fn price() -> ValueSpecification {
        spec("Price", "C")
    }

    fn stressed() -> DependencyGraph {
        let mut graph = DependencyGraph::new("Stressed");
        for node in chain().nodes() {
            graph.add_node((**node).clone());
        }
        graph.add_terminal_output(price());

        graph
    }

    fn is_invalid_state(r: Result<(), CycleError>, state: CycleState) -> bool {
        matches!(r, Err(CycleError::InvalidState { actual, .. }) if actual == state)
    }

    mod invalid_state {
        use super::*;

        #[rstest]
        fn test_prepare_inputs(
            #[values(
                CycleState::InputsPrepared,
                CycleState::Executing,
                CycleState::ExecutionInterrupted,
                CycleState::Finished,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0).with_state(state);

            assert!(is_invalid_state(cycle.prepare_inputs(), state));
            assert_eq!(cycle.state(), state);
        }

        #[rstest]
        #[tokio::test]
        async fn test_execute_plans(
            #[values(
                CycleState::Created,
                CycleState::Executing,
                CycleState::ExecutionInterrupted,
                CycleState::Finished,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0).with_state(state);

            assert!(is_invalid_state(cycle.execute_plans().await, state));
        }

        #[rstest]
        fn test_populate_result_model(
            #[values(
                CycleState::Created,
                CycleState::InputsPrepared,
                CycleState::Executing,
                CycleState::ExecutionInterrupted,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0).with_state(state);

            assert!(is_invalid_state(cycle.populate_result_model(), state));
        }

        #[rstest]
        fn test_release_resources(
            #[values(
                CycleState::Created,
                CycleState::InputsPrepared,
                CycleState::Executing,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0).with_state(state);

            assert!(is_invalid_state(cycle.release_resources(), state));
        }

        #[rstest]
        fn test_compute_delta(
            #[values(
                CycleState::Created,
                CycleState::Executing,
                CycleState::ExecutionInterrupted,
                CycleState::Finished,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let previous = fixture.cycle(0).with_state(CycleState::Finished);
            let mut cycle = fixture.cycle(1).with_state(state);

            assert!(is_invalid_state(cycle.compute_delta(&previous), state));
        }

        #[test]
        fn test_message() {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0).with_state(CycleState::Finished);

            let message = cycle.prepare_inputs().unwrap_err().to_string();

            assert_eq!(
                message,
                "cannot prepare inputs while cycle is FINISHED, expected one of [Created]"
            );
        }
    }

    mod prepare_inputs {
        use super::*;

        #[test]
        fn test_fans_out_live_data() {
            let fixture = Fixture::with(
                Arc::new(Hang),
                ViewDefinition::new("View"),
                vec![chain(), stressed()],
                CycleConfig::default(),
            );
            let mut cycle = fixture.cycle(0);

            cycle.prepare_inputs().unwrap();

            assert_eq!(cycle.state(), CycleState::InputsPrepared);
            for name in ["Default", "Stressed"] {
                let cache = cycle.computation_cache(name).unwrap();
                assert_eq!(cache.get_value(&spot()), Some(Value::from(42)));
            }
            assert_eq!(fixture.caches.cache_count(), 2);
            assert_eq!(fixture.live_data.snapshot_count(), 1);
        }

        #[test]
        fn test_missing_live_data_is_not_an_error() {
            let fixture = Fixture::new(Arc::new(Hang));
            fixture
                .live_data
                .remove_value(&spot().requirement_specification());
            let mut cycle = fixture.cycle(0);

            cycle.prepare_inputs().unwrap();

            let cache = cycle.computation_cache("Default").unwrap();
            assert_eq!(cache.get_value(&spot()), None);
        }

        #[test]
        fn test_format_requirement() {
            assert_eq!(
                format_requirement(&spot().requirement_specification()),
                "[Spot on SECURITY-Ticker:AAPL]"
            );
        }
    }

    mod node_state {
        use super::*;

        #[test]
        fn test_executable_dependency_graph() {
            let fixture = Fixture::new(Arc::new(Hang));
            let cycle = fixture.cycle(0);
            let graph = chain();
            let nodes = graph.nodes();

            let executable = cycle.executable_dependency_graph(&graph).unwrap();

            assert!(cycle.is_executed("Default", &*nodes[0]));
            assert_eq!(executable.size(), 2);
            assert!(executable.is_terminal_output(&price()));

            cycle.mark_executed("Default", &*nodes[1]).unwrap();
            cycle.mark_failed("Default", &*nodes[2]).unwrap();

            let executable = cycle.executable_dependency_graph(&graph).unwrap();
            assert_eq!(executable.size(), 1);
            assert!(executable.contains(&nodes[2]));
            assert!(cycle.is_failed("Default", &*nodes[2]));
        }

        #[test]
        fn test_configurations_do_not_share_state() {
            let fixture = Fixture::with(
                Arc::new(Hang),
                ViewDefinition::new("View"),
                vec![chain(), stressed()],
                CycleConfig::default(),
            );
            let cycle = fixture.cycle(0);
            let nodes = chain().nodes().to_vec();

            cycle.mark_executed("Default", &*nodes[1]).unwrap();
            cycle.mark_failed("Default", &*nodes[2]).unwrap();

            assert!(!cycle.is_executed("Stressed", &*nodes[1]));
            assert!(!cycle.is_failed("Stressed", &*nodes[2]));
            assert_eq!(
                cycle.executable_dependency_graph(&stressed()).unwrap().size(),
                2
            );
            assert_eq!(
                cycle
                    .node_execution_state("Stressed")
                    .unwrap()
                    .executed_count(),
                1
            );
        }

        #[test]
        fn test_unknown_configuration() {
            let fixture = Fixture::new(Arc::new(Hang));
            let cycle = fixture.cycle(0);
            let node = chain().nodes()[1].clone();

            let mut graph = DependencyGraph::new("Missing");
            graph.add_node((*node).clone());

            assert!(matches!(
                cycle.executable_dependency_graph(&graph),
                Err(CycleError::UnknownConfiguration(name)) if name == "Missing"
            ));
            assert!(cycle.mark_executed("Missing", &*node).is_err());
            assert!(!cycle.is_executed("Missing", &*node));
            assert!(cycle.is_executed("Missing", None));
            assert!(cycle.node_execution_state("Missing").is_none());
        }
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let executor = Arc::new(Complete::default());
        let fixture = Fixture::new(executor.clone());
        let mut cycle = fixture.finished_cycle(0).await;

        assert_eq!(cycle.state(), CycleState::Finished);
        assert_eq!(*executor.submitted.lock(), vec![2]);
        assert!(cycle.duration().is_some());

        cycle.populate_result_model().unwrap();

        let result = cycle.result_model();
        assert_eq!(result.len(), 1);
        assert_eq!(result.value("Default", &price()), Some(&Value::from(1)));
        assert!(result.result_timestamp().is_some());

        cycle.release_resources().unwrap();

        assert_eq!(cycle.state(), CycleState::Cleaned);
        assert_eq!(fixture.caches.cache_count(), 0);
        assert_eq!(fixture.live_data.snapshot_count(), 0);
        assert!(cycle.computation_cache("Default").is_none());
    }

    #[tokio::test]
    async fn test_every_configuration_executes_its_own_graph() {
        let executor = Arc::new(PerConfiguration::default());
        let fixture = Fixture::with(
            executor.clone(),
            ViewDefinition::new("View"),
            vec![chain(), stressed()],
            CycleConfig::default(),
        );

        let mut previous = fixture.finished_cycle(0).await;
        previous.populate_result_model().unwrap();

        assert_eq!(
            *executor.submitted.lock(),
            vec![("Default".to_owned(), 2), ("Stressed".to_owned(), 2)]
        );

        let result = previous.result_model();
        assert_eq!(result.value("Default", &price()), Some(&Value::from(7)));
        assert_eq!(result.value("Stressed", &price()), Some(&Value::from(8)));
        for name in ["Default", "Stressed"] {
            let cache = previous.computation_cache(name).unwrap();
            assert_eq!(cache.get_value(&spot()), Some(Value::from(42)));
        }

        // Delta keeps each configuration's own values.
        let mut cycle = fixture.cycle(1);
        cycle.prepare_inputs().unwrap();
        cycle.compute_delta(&previous).unwrap();
        cycle.execute_plans().await.unwrap();
        cycle.populate_result_model().unwrap();

        assert_eq!(
            executor.submitted.lock()[2..].to_vec(),
            vec![("Default".to_owned(), 0), ("Stressed".to_owned(), 0)]
        );

        let result = cycle.result_model();
        assert_eq!(result.value("Default", &price()), Some(&Value::from(7)));
        assert_eq!(result.value("Stressed", &price()), Some(&Value::from(8)));
    }

    #[tokio::test]
    async fn test_slow_execution_is_awaited() {
        let fixture = Fixture::new(Arc::new(Slow(Duration::from_millis(40))));

        let cycle = fixture.finished_cycle(0).await;

        assert_eq!(cycle.state(), CycleState::Finished);
    }

    mod compute_delta {
        use super::*;

        #[tokio::test]
        async fn test_unchanged_live_data_is_reused() {
            let executor = Arc::new(Complete::default());
            let fixture = Fixture::new(executor.clone());
            let previous = fixture.finished_cycle(0).await;

            let mut cycle = fixture.cycle(1);
            cycle.prepare_inputs().unwrap();
            cycle.compute_delta(&previous).unwrap();
            cycle.execute_plans().await.unwrap();
            cycle.populate_result_model().unwrap();

            assert_eq!(*executor.submitted.lock(), vec![2, 0]);
            assert_eq!(
                cycle.result_model().value("Default", &price()),
                Some(&Value::from(1))
            );
        }

        #[tokio::test]
        async fn test_changed_live_data_is_recomputed() {
            let executor = Arc::new(Complete::default());
            let fixture = Fixture::new(executor.clone());
            let previous = fixture.finished_cycle(0).await;

            fixture
                .live_data
                .add_value(spot().requirement_specification(), Value::from(43));

            let mut cycle = fixture.cycle(1);
            cycle.prepare_inputs().unwrap();
            cycle.compute_delta(&previous).unwrap();
            cycle.execute_plans().await.unwrap();

            assert_eq!(*executor.submitted.lock(), vec![2, 2]);
        }

        #[rstest]
        fn test_previous_must_be_finished(
            #[values(
                CycleState::Created,
                CycleState::InputsPrepared,
                CycleState::Executing,
                CycleState::ExecutionInterrupted,
                CycleState::Cleaned
            )]
            state: CycleState,
        ) {
            let fixture = Fixture::new(Arc::new(Hang));
            let previous = fixture.cycle(0).with_state(state);

            let mut cycle = fixture.cycle(1);
            cycle.prepare_inputs().unwrap();

            assert!(matches!(
                cycle.compute_delta(&previous),
                Err(CycleError::InvalidArgument(_))
            ));
            assert_eq!(cycle.state(), CycleState::InputsPrepared);
        }
    }

    mod execute_plans {
        use super::*;

        #[tokio::test]
        async fn test_interrupt_before_execution() {
            let fixture = Fixture::new(Arc::new(Hang));
            let mut cycle = fixture.cycle(0);
            cycle.prepare_inputs().unwrap();

            cycle.interrupter().interrupt();

            assert!(matches!(
                cycle.execute_plans().await,
                Err(CycleError::Interrupted)
            ));
            assert_eq!(cycle.state(), CycleState::ExecutionInterrupted);

            cycle.release_resources().unwrap();
            assert_eq!(cycle.state(), CycleState::Cleaned);
        }

        #[tokio::test]
        async fn test_interrupt_while_waiting() {
            let fixture = Fixture::with(
                Arc::new(Hang),
                ViewDefinition::new("View"),
                vec![chain(), stressed()],
                CycleConfig::default(),
            );
            let mut cycle = fixture.cycle(0);
            cycle.prepare_inputs().unwrap();

            let interrupter = cycle.interrupter();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                interrupter.interrupt();
            });

            assert!(matches!(
                cycle.execute_plans().await,
                Err(CycleError::Interrupted)
            ));
            assert!(cycle.interrupter().is_interrupted());
            assert_eq!(cycle.state(), CycleState::ExecutionInterrupted);
        }

        #[tokio::test]
        async fn test_failure() {
            let fixture = Fixture::new(Arc::new(Broken));
            let mut cycle = fixture.cycle(0);
            cycle.prepare_inputs().unwrap();

            let e = cycle.execute_plans().await.unwrap_err();

            assert!(matches!(
                e,
                CycleError::Execution {
                    ref configuration,
                    source: ExecutionError::Dispatch(_),
                } if configuration == "Default"
            ));
            assert_eq!(cycle.state(), CycleState::ExecutionInterrupted);
            assert!(cycle.populate_result_model().is_err());
        }
    }

    #[tokio::test]
    async fn test_query_computation_caches() {
        let fixture = Fixture::new(Arc::new(Complete::default()));
        let cycle = fixture.finished_cycle(0).await;

        let found = cycle
            .query_computation_caches(&ComputationCycleQuery::new(
                "Default",
                vec![price(), spec("Unknown", "Z")],
            ))
            .unwrap();

        assert_eq!(found, vec![ComputedValue::new(price(), Value::from(1))]);
        assert!(matches!(
            cycle.query_computation_caches(&ComputationCycleQuery::new("Missing", vec![])),
            Err(CycleError::UnknownConfiguration(name)) if name == "Missing"
        ));
    }

    #[tokio::test]
    async fn test_dump_on_release() {
        let directory = tempfile::tempdir().unwrap();
        let fixture = Fixture::with(
            Arc::new(Complete::default()),
            ViewDefinition::new("View").with_dump_computation_cache_to_disk(true),
            vec![chain()],
            CycleConfig::default().with_dump_directory(directory.path()),
        );
        let mut cycle = fixture.finished_cycle(0).await;

        cycle.release_resources().unwrap();

        let files: Vec<_> = std::fs::read_dir(directory.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);

        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("computation-cache-Default-"));
        assert!(name.ends_with(".txt"));

        let contents = std::fs::read_to_string(&files[0]).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.lines().all(|line| line.contains(" -> ")));
        assert!(contents.contains(&format!("{} -> 1", price())));
    }
}
