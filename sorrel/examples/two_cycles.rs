//! Value a small book twice and watch the second cycle skip everything the market did not touch.
//!
//! Run with `cargo run --example two_cycles`.

use std::sync::Arc;
use std::time::Duration;

use sorrel::cache::{InMemoryComputationCacheSource, InMemoryIdentifierMap};
use sorrel::calc::{LocalDependencyGraphExecutor, SingleComputationCycle, TotallingStatisticsGatherer};
use sorrel::calcnode::LocalCalculationNode;
use sorrel::change::BasicChangeManager;
use sorrel::depgraph::{DependencyGraph, DependencyNode};
use sorrel::function::{
    FunctionDefinition, FunctionExecutionContext, FunctionInvoker, FunctionKind,
    FunctionParameters, InMemoryFunctionRepository, InvocationError,
};
use sorrel::livedata::InMemoryLiveDataSnapshotProvider;
use sorrel::value::{
    ComputationTargetSpecification, ComputedValue, UniqueId, Value, ValueProperties,
    ValueSpecification,
};
use sorrel::view::{View, ViewDefinition, ViewEvaluationModel, ViewProcessingContext};
use sorrel::{CycleConfig, ValuationTime};

const TICKERS: [&str; 3] = ["AAPL", "MSFT", "NVDA"];

/// Price is spot times a fixed position size.
struct Notional(f64);

impl FunctionInvoker for Notional {
    fn kind(&self) -> FunctionKind {
        FunctionKind::Security
    }

    fn execute(
        &self,
        context: &FunctionExecutionContext<'_>,
    ) -> Result<Vec<ComputedValue>, InvocationError> {
        let spot = context
            .inputs
            .value("Spot")
            .and_then(Value::as_f64)
            .ok_or_else(|| InvocationError::Failed("spot is not a number".to_owned()))?;

        Ok(context
            .desired_values
            .iter()
            .map(|r| ComputedValue::new(context.output_specification(r), Value::from(spot * self.0)))
            .collect())
    }
}

fn spot(ticker: &str, market: &FunctionDefinition) -> ValueSpecification {
    ValueSpecification::new(
        "Spot",
        ComputationTargetSpecification::security(UniqueId::of("Ticker", ticker)),
        market.unique_id(),
        ValueProperties::none().with("Currency", "USD"),
    )
}

fn book(market: &FunctionDefinition, notional: &FunctionDefinition) -> DependencyGraph {
    let mut graph = DependencyGraph::new("Default");

    for ticker in TICKERS {
        let target = ComputationTargetSpecification::security(UniqueId::of("Ticker", ticker));
        let spot = spot(ticker, market);
        let price = ValueSpecification::new(
            "Notional",
            target.clone(),
            notional.unique_id(),
            ValueProperties::none().with("Currency", "USD"),
        );

        graph.add_node(
            DependencyNode::new(market.parameterized(FunctionParameters::empty()), target.clone())
                .with_output(spot.clone()),
        );
        graph.add_node(
            DependencyNode::new(notional.parameterized(FunctionParameters::empty()), target)
                .with_input(spot)
                .with_output(price.clone()),
        );
        graph.add_terminal_output(price);
    }

    graph
}

fn report(cycle: &SingleComputationCycle) {
    let result = cycle.result_model();

    println!("cycle at {}:", result.valuation_time());
    for value in result.values("Default") {
        println!(
            "    {} {} = {}",
            value.specification().target_specification().identifier(),
            value.specification().value_name(),
            value.value()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let functions = Arc::new(InMemoryFunctionRepository::new());
    let market = functions.add_live_data_sourcing_function("MarketData");
    let notional = functions.add_function("Notional", FunctionKind::Security, Arc::new(Notional(100.0)))?;

    let live_data = Arc::new(InMemoryLiveDataSnapshotProvider::new(Arc::new(
        BasicChangeManager::new(),
    )));
    for (ticker, price) in TICKERS.iter().zip([189.5, 415.25, 121.0]) {
        live_data.add_value(spot(ticker, &market).requirement_specification(), Value::from(price));
    }

    let statistics = Arc::new(TotallingStatisticsGatherer::new());
    let node = LocalCalculationNode::new(functions, Arc::new(InMemoryIdentifierMap::new()));
    let context = ViewProcessingContext::new(
        live_data.clone(),
        Arc::new(InMemoryComputationCacheSource::new()),
        Arc::new(LocalDependencyGraphExecutor::new(Arc::new(node))),
    )
    .with_statistics(statistics.clone())
    .with_config(CycleConfig::default().with_poll_interval(Duration::from_millis(100)));

    let view = Arc::new(View::new(
        ViewDefinition::new("Book"),
        ViewEvaluationModel::new([book(&market, &notional)]),
        context,
    ));

    let mut first = SingleComputationCycle::new(view.clone(), ValuationTime::from_epoch_millis(1_000));
    first.prepare_inputs()?;
    first.execute_plans().await?;
    first.populate_result_model()?;
    report(&first);

    // Only one ticker moves.
    live_data.add_value(
        spot("MSFT", &market).requirement_specification(),
        Value::from(420.0),
    );

    let mut second = SingleComputationCycle::new(view, ValuationTime::from_epoch_millis(2_000));
    second.prepare_inputs()?;
    second.compute_delta(&first)?;
    second.execute_plans().await?;
    second.populate_result_model()?;
    report(&second);

    first.release_resources()?;
    second.release_resources()?;

    if let Some(totals) = statistics.statistics("Default") {
        println!(
            "executed {} of {} submitted nodes over {} cycles",
            totals.executed_nodes, totals.total_nodes, totals.processed_graphs
        );
    }

    Ok(())
}
