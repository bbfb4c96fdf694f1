use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use parking_lot::Mutex;

/// Receiver of graph execution statistics.
pub trait GraphExecutorStatisticsGatherer: Debug + Send + Sync {
    /// A graph was executed to completion.
    fn graph_processed(
        &self,
        calculation_configuration_name: &str,
        total_nodes: usize,
        executed_nodes: usize,
        duration: Duration,
    );

    /// Execution of a graph failed as a whole.
    fn graph_failed(&self, calculation_configuration_name: &str);
}

/// Gatherer throwing everything away.
#[derive(Debug, Default, Copy, Clone)]
pub struct DiscardingStatisticsGatherer;

impl GraphExecutorStatisticsGatherer for DiscardingStatisticsGatherer {
    fn graph_processed(&self, _: &str, _: usize, _: usize, _: Duration) {}

    fn graph_failed(&self, _: &str) {}
}

/// Running totals of one calculation configuration.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct GraphStatistics {
    /// Graphs executed to completion.
    pub processed_graphs: u64,
    /// Graphs which failed as a whole.
    pub failed_graphs: u64,
    /// Nodes across all processed graphs.
    pub total_nodes: u64,
    /// Nodes successfully executed across all processed graphs.
    pub executed_nodes: u64,
    /// Time spent executing processed graphs.
    pub processing_time: Duration,
}

/// Gatherer keeping running totals per configuration.
#[derive(Debug, Default)]
pub struct TotallingStatisticsGatherer {
    totals: Mutex<BTreeMap<String, GraphStatistics>>,
}

impl TotallingStatisticsGatherer {
    /// Create a gatherer with nothing recorded.
    pub fn new() -> Self {
        Default::default()
    }

    /// Totals of a configuration, if anything was recorded for it.
    pub fn statistics(&self, calculation_configuration_name: &str) -> Option<GraphStatistics> {
        self.totals
            .lock()
            .get(calculation_configuration_name)
            .copied()
    }
}

impl GraphExecutorStatisticsGatherer for TotallingStatisticsGatherer {
    fn graph_processed(
        &self,
        calculation_configuration_name: &str,
        total_nodes: usize,
        executed_nodes: usize,
        duration: Duration,
    ) {
        let mut guard = self.totals.lock();
        let totals = guard
            .entry(calculation_configuration_name.to_owned())
            .or_default();

        totals.processed_graphs += 1;
        totals.total_nodes += total_nodes as u64;
        totals.executed_nodes += executed_nodes as u64;
        totals.processing_time += duration;
    }

    fn graph_failed(&self, calculation_configuration_name: &str) {
        self.totals
            .lock()
            .entry(calculation_configuration_name.to_owned())
            .or_default()
            .failed_graphs += 1;
    }
}
