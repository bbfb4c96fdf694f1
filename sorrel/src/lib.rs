//! Incremental valuation cycles over dependency graphs.
//!
//! # Contents
//!
//! * [Overview](#overview)
//! * [Quick start](#quick-start)
//! * [How it works](#how-it-works)
//! * [Known limitations](#known-limitations)
//!
//! # Overview
//!
//! A *view* asks for a set of values (prices, risk figures and such) computed over a set of
//! targets.
//! Figuring out which functions produce those values is done ahead of time and results in a
//! [dependency graph](depgraph::DependencyGraph) per *calculation configuration*: a named
//! variant of the same computation, for example a base scenario and a stressed one.
//!
//! `sorrel` takes it from there.
//! Every valuation pass is a [computation cycle](calc::SingleComputationCycle) which
//!
//! 1.  freezes market data at its valuation time and loads it into
//!     [computation caches](cache::ComputationCache),
//! 2.  optionally compares that data against the previous cycle and reuses whatever did not
//!     change,
//! 3.  hands the rest of every graph to a [graph executor](calc::DependencyGraphExecutor),
//!     which ships individual [jobs](calcnode::CalculationJobItem) to calculation nodes,
//! 4.  collects reported outputs into a [result model](view::ViewComputationResultModel).
//!
//! Executors and calculation nodes run on [`tokio`][tokio].
//!
//! [tokio]: https://github.com/tokio-rs/tokio
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use sorrel::cache::{InMemoryComputationCacheSource, InMemoryIdentifierMap};
//! use sorrel::calc::{LocalDependencyGraphExecutor, SingleComputationCycle};
//! use sorrel::calcnode::LocalCalculationNode;
//! use sorrel::change::NoopChangeManager;
//! use sorrel::depgraph::{DependencyGraph, DependencyNode};
//! use sorrel::function::{
//!     FunctionExecutionContext, FunctionInvoker, FunctionKind, FunctionParameters,
//!     InMemoryFunctionRepository, InvocationError,
//! };
//! use sorrel::livedata::InMemoryLiveDataSnapshotProvider;
//! use sorrel::value::{
//!     ComputationTargetSpecification, ComputedValue, UniqueId, Value, ValueProperties,
//!     ValueSpecification,
//! };
//! use sorrel::view::{View, ViewDefinition, ViewEvaluationModel, ViewProcessingContext};
//! use sorrel::ValuationTime;
//!
//! // Functions are plain types implementing `FunctionInvoker`.
//! struct Double;
//!
//! impl FunctionInvoker for Double {
//!     fn kind(&self) -> FunctionKind {
//!         FunctionKind::Security
//!     }
//!
//!     fn execute(
//!         &self,
//!         context: &FunctionExecutionContext<'_>,
//!     ) -> Result<Vec<ComputedValue>, InvocationError> {
//!         let spot = context
//!             .inputs
//!             .value("Spot")
//!             .and_then(Value::as_f64)
//!             .ok_or_else(|| InvocationError::Failed("spot is not a number".to_owned()))?;
//!
//!         Ok(context
//!             .desired_values
//!             .iter()
//!             .map(|r| ComputedValue::new(context.output_specification(r), Value::from(2.0 * spot)))
//!             .collect())
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let functions = Arc::new(InMemoryFunctionRepository::new());
//! let market = functions.add_live_data_sourcing_function("MarketData");
//! let double = functions.add_function("Double", FunctionKind::Security, Arc::new(Double))?;
//!
//! let target = ComputationTargetSpecification::security(UniqueId::of("Ticker", "AAPL"));
//! let spot = ValueSpecification::new("Spot", target.clone(), market.unique_id(), ValueProperties::none());
//! let price = ValueSpecification::new("Price", target.clone(), double.unique_id(), ValueProperties::none());
//!
//! // Graph `MarketData -> Double`, asking for `Price`.
//! let mut graph = DependencyGraph::new("Default");
//! graph.add_node(
//!     DependencyNode::new(market.parameterized(FunctionParameters::empty()), target.clone())
//!         .with_output(spot.clone()),
//! );
//! graph.add_node(
//!     DependencyNode::new(double.parameterized(FunctionParameters::empty()), target)
//!         .with_input(spot.clone())
//!         .with_output(price.clone()),
//! );
//! graph.add_terminal_output(price.clone());
//!
//! let live_data = Arc::new(InMemoryLiveDataSnapshotProvider::new(Arc::new(NoopChangeManager)));
//! live_data.add_value(spot.requirement_specification(), Value::from(21.0));
//!
//! let node = LocalCalculationNode::new(functions, Arc::new(InMemoryIdentifierMap::new()));
//! let context = ViewProcessingContext::new(
//!     live_data,
//!     Arc::new(InMemoryComputationCacheSource::new()),
//!     Arc::new(LocalDependencyGraphExecutor::new(Arc::new(node))),
//! );
//! let view = Arc::new(View::new(
//!     ViewDefinition::new("Equity"),
//!     ViewEvaluationModel::new([graph]),
//!     context,
//! ));
//!
//! let mut cycle = SingleComputationCycle::new(view, ValuationTime::now());
//! cycle.prepare_inputs()?;
//! cycle.execute_plans().await?;
//! cycle.populate_result_model()?;
//!
//! assert_eq!(cycle.result_model().value("Default", &price), Some(&Value::from(42.0)));
//!
//! cycle.release_resources()?;
//! # Ok(())
//! # }
//! ```
//!
//! # How it works
//!
//! Values are keyed by [`ValueSpecification`](value::ValueSpecification): value name, target,
//! producing function and properties.
//! Each node of a dependency graph invokes one function on one target, consumes some values and
//! produces others.
//! Nodes of [`LiveDataSourcing`](function::FunctionKind::LiveDataSourcing) kind are never
//! invoked: their outputs are market values, loaded straight into caches when a cycle prepares
//! its inputs.
//!
//! Caches have two partitions.
//! Market data goes into the *shared* partition, visible to every configuration of the view at
//! the same valuation time.
//! Computed values, terminal outputs included, stay *private* to the configuration which
//! produced them: a base and a stressed configuration report different values under the same
//! specification.
//!
//! Executed and failed nodes are tracked per configuration too, so a node appearing in several
//! graphs runs once for each of them.
//!
//! When a cycle is given a finished previous cycle, it runs a
//! [delta calculation](calc::LiveDataDeltaCalculator): every node which does not
//! (transitively) depend on changed market data is marked executed up front and its outputs are
//! copied over from the previous cycle's cache.
//! Only what is left gets submitted for execution.
//!
//! Jobs travel to calculation nodes in a [wire](wire) encoding, with inputs referenced by
//! compact integer identifiers rather than full specifications.
//!
//! Failures are contained.
//! A function which fails marks its node failed and starves everything downstream, but the rest
//! of the graph carries on.
//! Only a failure of a whole graph execution (say, a panicked executor task) fails the cycle.
//!
//! # Known limitations
//!
//! *   Building dependency graphs out of view definitions is out of scope.
//!     Graphs are handed in ready to use.
//!
//! *   There is no view process driving cycles on a schedule.
//!     Callers create cycles and call them through their life cycle themselves.
//!
//! *   [`LocalDependencyGraphExecutor`](calc::LocalDependencyGraphExecutor) runs calculation
//!     nodes in-process.
//!     Jobs are still encoded and decoded on the way, so other transports can be slotted in
//!     behind [`DependencyGraphExecutor`](calc::DependencyGraphExecutor).

#![warn(missing_docs)]

pub mod cache;
pub mod calc;
pub mod calcnode;
pub mod change;
pub mod depgraph;
pub mod function;
pub mod livedata;
pub mod value;
pub mod view;
pub mod wire;

mod config;
mod time;

pub use calc::{CycleError, CycleState, SingleComputationCycle};
pub use config::CycleConfig;
pub use time::{ResultTimestamp, ValuationTime};
