//! Result model.

use std::collections::BTreeMap;

use crate::time::{ResultTimestamp, ValuationTime};
use crate::value::{ComputedValue, Value, ValueSpecification};

/// Values reported by one cycle, grouped by calculation configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewComputationResultModel {
    view_name: String,
    valuation_time: ValuationTime,
    results: BTreeMap<String, Vec<ComputedValue>>,
    result_timestamp: Option<ResultTimestamp>,
}

impl ViewComputationResultModel {
    /// Create an empty model.
    pub fn new(view_name: impl Into<String>, valuation_time: ValuationTime) -> Self {
        ViewComputationResultModel {
            view_name: view_name.into(),
            valuation_time,
            results: BTreeMap::new(),
            result_timestamp: None,
        }
    }

    /// Register a configuration, even if it ends up reporting nothing.
    pub fn add_calculation_configuration(&mut self, name: impl Into<String>) {
        self.results.entry(name.into()).or_default();
    }

    /// Append a value.
    pub fn add_value(&mut self, calculation_configuration_name: &str, value: ComputedValue) {
        match self.results.get_mut(calculation_configuration_name) {
            Some(values) => values.push(value),
            None => {
                self.results
                    .insert(calculation_configuration_name.to_owned(), vec![value]);
            }
        }
    }

    /// Stamp the model as finalized.
    pub fn set_result_timestamp(&mut self, timestamp: ResultTimestamp) {
        self.result_timestamp = Some(timestamp);
    }

    /// Name of the view.
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Valuation time of the cycle.
    pub fn valuation_time(&self) -> ValuationTime {
        self.valuation_time
    }

    /// Moment the model was finalized, `None` while still being populated.
    pub fn result_timestamp(&self) -> Option<ResultTimestamp> {
        self.result_timestamp
    }

    /// Names of calculation configurations.
    pub fn calculation_configuration_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.results.keys().map(String::as_str)
    }

    /// Values reported for a configuration.
    pub fn values(&self, calculation_configuration_name: &str) -> &[ComputedValue] {
        self.results
            .get(calculation_configuration_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Value reported under `specification`.
    pub fn value(
        &self,
        calculation_configuration_name: &str,
        specification: &ValueSpecification,
    ) -> Option<&Value> {
        self.values(calculation_configuration_name)
            .iter()
            .find(|value| value.specification() == specification)
            .map(ComputedValue::value)
    }

    /// Total number of reported values.
    pub fn len(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    /// Check whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::depgraph::test::spec;

    #[test]
    fn test_lookup() {
        let mut model =
            ViewComputationResultModel::new("View", ValuationTime::from_epoch_millis(1));
        model.add_calculation_configuration("Empty");
        model.add_value(
            "Default",
            ComputedValue::new(spec("Price", "C"), Value::from(3)),
        );

        assert_eq!(
            model.calculation_configuration_names().collect::<Vec<_>>(),
            vec!["Default", "Empty"]
        );
        assert_eq!(model.value("Default", &spec("Price", "C")), Some(&Value::from(3)));
        assert_eq!(model.value("Empty", &spec("Price", "C")), None);
        assert!(model.values("Missing").is_empty());
        assert_eq!(model.len(), 1);
        assert_eq!(model.result_timestamp(), None);
    }
}
