//! Views: what gets computed, with which collaborators, and what gets reported.
//!
//! A [`View`] bundles three things a computation cycle needs:
//!
//! *   its [`ViewDefinition`], naming the view and telling which outputs make it into results,
//! *   its [`ViewEvaluationModel`], the dependency graphs compiled for every calculation
//!     configuration,
//! *   its [`ViewProcessingContext`], the collaborators cycles talk to.
//!
//! Compiling dependency graphs out of a definition is not done here: evaluation models are built
//! by the caller and handed in ready to use.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ComputationCacheSource;
use crate::calc::{
    DependencyGraphExecutor, DiscardingStatisticsGatherer, GraphExecutorStatisticsGatherer,
};
use crate::config::CycleConfig;
use crate::depgraph::DependencyGraph;
use crate::livedata::LiveDataSnapshotProvider;
use crate::value::{ComputationTargetType, ValueSpecification};

mod result;

pub use result::ViewComputationResultModel;

/// Which outputs of a target type are reported.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ResultOutputMode {
    /// Nothing.
    None,
    /// Only outputs the view asked for.
    TerminalOutputs,
    /// Every computed output, intermediates included.
    All,
}

impl Default for ResultOutputMode {
    fn default() -> Self {
        ResultOutputMode::TerminalOutputs
    }
}

/// Reporting policy of a view.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultModelDefinition {
    aggregate_position_output_mode: ResultOutputMode,
    position_output_mode: ResultOutputMode,
    security_output_mode: ResultOutputMode,
    primitive_output_mode: ResultOutputMode,
}

impl ResultModelDefinition {
    /// Output mode for targets of given type.
    pub fn output_mode(&self, target_type: ComputationTargetType) -> ResultOutputMode {
        match target_type {
            ComputationTargetType::PortfolioNode => self.aggregate_position_output_mode,
            ComputationTargetType::Position => self.position_output_mode,
            ComputationTargetType::Security => self.security_output_mode,
            ComputationTargetType::Primitive => self.primitive_output_mode,
        }
    }

    /// Set output mode for targets of given type.
    pub fn with_output_mode(
        mut self,
        target_type: ComputationTargetType,
        mode: ResultOutputMode,
    ) -> Self {
        let slot = match target_type {
            ComputationTargetType::PortfolioNode => &mut self.aggregate_position_output_mode,
            ComputationTargetType::Position => &mut self.position_output_mode,
            ComputationTargetType::Security => &mut self.security_output_mode,
            ComputationTargetType::Primitive => &mut self.primitive_output_mode,
        };
        *slot = mode;

        self
    }

    /// Check whether `output` of `graph` should be reported.
    pub fn should_output_result(
        &self,
        output: &ValueSpecification,
        graph: &DependencyGraph,
    ) -> bool {
        match self.output_mode(output.target_specification().target_type()) {
            ResultOutputMode::None => false,
            ResultOutputMode::TerminalOutputs => graph.is_terminal_output(output),
            ResultOutputMode::All => true,
        }
    }
}

/// User-facing description of a view.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    name: String,
    #[serde(default)]
    result_model_definition: ResultModelDefinition,
    #[serde(default)]
    dump_computation_cache_to_disk: bool,
}

impl ViewDefinition {
    /// Create a definition with default reporting policy.
    pub fn new(name: impl Into<String>) -> Self {
        ViewDefinition {
            name: name.into(),
            result_model_definition: Default::default(),
            dump_computation_cache_to_disk: false,
        }
    }

    /// Set reporting policy.
    pub fn with_result_model_definition(mut self, definition: ResultModelDefinition) -> Self {
        self.result_model_definition = definition;
        self
    }

    /// Request caches to be dumped to disk when cycles release their resources.
    pub fn with_dump_computation_cache_to_disk(mut self, dump: bool) -> Self {
        self.dump_computation_cache_to_disk = dump;
        self
    }

    /// Name of the view.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reporting policy.
    pub fn result_model_definition(&self) -> &ResultModelDefinition {
        &self.result_model_definition
    }

    /// Whether caches are dumped to disk.
    pub fn dump_computation_cache_to_disk(&self) -> bool {
        self.dump_computation_cache_to_disk
    }
}

/// Dependency graphs of every calculation configuration of a view.
#[derive(Debug, Clone, Default)]
pub struct ViewEvaluationModel {
    graphs: BTreeMap<String, Arc<DependencyGraph>>,
}

impl ViewEvaluationModel {
    /// Build model out of compiled graphs, keyed by their configuration names.
    pub fn new(graphs: impl IntoIterator<Item = DependencyGraph>) -> Self {
        let graphs = graphs
            .into_iter()
            .map(|graph| {
                (
                    graph.calculation_configuration_name().to_owned(),
                    Arc::new(graph),
                )
            })
            .collect();

        ViewEvaluationModel { graphs }
    }

    /// Names of calculation configurations in sorted order.
    pub fn calculation_configuration_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.graphs.keys().map(String::as_str)
    }

    /// Graph of a calculation configuration.
    pub fn dependency_graph(&self, calculation_configuration_name: &str) -> Option<&Arc<DependencyGraph>> {
        self.graphs.get(calculation_configuration_name)
    }

    /// All graphs keyed by configuration name.
    pub fn dependency_graphs(&self) -> &BTreeMap<String, Arc<DependencyGraph>> {
        &self.graphs
    }

    /// Every value sourced from live data, across all configurations.
    pub fn all_live_data_requirements(&self) -> BTreeSet<ValueSpecification> {
        self.graphs
            .values()
            .flat_map(|graph| graph.nodes().iter())
            .filter(|node| !node.function().kind().requires_invocation())
            .flat_map(|node| node.output_values().iter().cloned())
            .collect()
    }
}

/// Collaborators used by cycles of a view.
#[derive(Clone)]
pub struct ViewProcessingContext {
    live_data: Arc<dyn LiveDataSnapshotProvider>,
    cache_source: Arc<dyn ComputationCacheSource>,
    executor: Arc<dyn DependencyGraphExecutor>,
    statistics: Arc<dyn GraphExecutorStatisticsGatherer>,
    config: CycleConfig,
}

impl ViewProcessingContext {
    /// Assemble context with default configuration and no statistics.
    pub fn new(
        live_data: Arc<dyn LiveDataSnapshotProvider>,
        cache_source: Arc<dyn ComputationCacheSource>,
        executor: Arc<dyn DependencyGraphExecutor>,
    ) -> Self {
        ViewProcessingContext {
            live_data,
            cache_source,
            executor,
            statistics: Arc::new(DiscardingStatisticsGatherer),
            config: Default::default(),
        }
    }

    /// Set statistics gatherer.
    pub fn with_statistics(mut self, statistics: Arc<dyn GraphExecutorStatisticsGatherer>) -> Self {
        self.statistics = statistics;
        self
    }

    /// Set cycle configuration.
    pub fn with_config(mut self, config: CycleConfig) -> Self {
        self.config = config;
        self
    }

    /// Live data snapshot provider.
    pub fn live_data(&self) -> &Arc<dyn LiveDataSnapshotProvider> {
        &self.live_data
    }

    /// Computation cache source.
    pub fn cache_source(&self) -> &Arc<dyn ComputationCacheSource> {
        &self.cache_source
    }

    /// Dependency graph executor.
    pub fn executor(&self) -> &Arc<dyn DependencyGraphExecutor> {
        &self.executor
    }

    /// Statistics gatherer handed to the executor.
    pub fn statistics(&self) -> &Arc<dyn GraphExecutorStatisticsGatherer> {
        &self.statistics
    }

    /// Cycle configuration.
    pub fn config(&self) -> &CycleConfig {
        &self.config
    }
}

impl Debug for ViewProcessingContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(stringify!(ViewProcessingContext))
            .field("live_data", &self.live_data)
            .field("cache_source", &self.cache_source)
            .field("executor", &self.executor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A view ready to run cycles.
#[derive(Debug, Clone)]
pub struct View {
    definition: ViewDefinition,
    evaluation_model: Arc<ViewEvaluationModel>,
    processing_context: ViewProcessingContext,
}

impl View {
    /// Assemble a view.
    pub fn new(
        definition: ViewDefinition,
        evaluation_model: ViewEvaluationModel,
        processing_context: ViewProcessingContext,
    ) -> Self {
        View {
            definition,
            evaluation_model: Arc::new(evaluation_model),
            processing_context,
        }
    }

    /// Name of the view.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// Definition of the view.
    pub fn definition(&self) -> &ViewDefinition {
        &self.definition
    }

    /// Compiled dependency graphs.
    pub fn evaluation_model(&self) -> &Arc<ViewEvaluationModel> {
        &self.evaluation_model
    }

    /// Collaborators.
    pub fn processing_context(&self) -> &ViewProcessingContext {
        &self.processing_context
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::depgraph::test::{chain, spec};

    mod result_model_definition {
        use super::*;

        #[test]
        fn test_default_reports_terminal_outputs() {
            let graph = chain();
            let definition = ResultModelDefinition::default();

            assert!(definition.should_output_result(&spec("Price", "C"), &graph));
            assert!(!definition.should_output_result(&spec("Forward", "B"), &graph));
        }

        #[test]
        fn test_modes() {
            let graph = chain();

            let all = ResultModelDefinition::default()
                .with_output_mode(ComputationTargetType::Security, ResultOutputMode::All);
            let none = ResultModelDefinition::default()
                .with_output_mode(ComputationTargetType::Security, ResultOutputMode::None);

            assert!(all.should_output_result(&spec("Forward", "B"), &graph));
            assert!(!none.should_output_result(&spec("Price", "C"), &graph));
            assert_eq!(
                all.output_mode(ComputationTargetType::Primitive),
                ResultOutputMode::TerminalOutputs
            );
        }
    }

    #[test]
    fn test_view_definition_json() {
        let definition: ViewDefinition = serde_json::from_str(r#"{ "name": "Equity" }"#).unwrap();

        assert_eq!(definition, ViewDefinition::new("Equity"));
        assert!(!definition.dump_computation_cache_to_disk());
    }

    #[test]
    fn test_live_data_requirements_across_configurations() {
        let mut other = DependencyGraph::new("Stressed");
        for node in chain().nodes() {
            other.add_node((**node).clone());
        }

        let model = ViewEvaluationModel::new(vec![chain(), other]);

        assert_eq!(
            model.calculation_configuration_names().collect::<Vec<_>>(),
            vec!["Default", "Stressed"]
        );
        assert_eq!(
            model.all_live_data_requirements().into_iter().collect::<Vec<_>>(),
            vec![spec("Spot", "A")]
        );
    }
}
