// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025 ReifyDB

//! Configuration of a systematic test run.

use serde::{Deserialize, Serialize};
use weave_runtime::{
	CycleDetectionStrategy, PriorityStrategy, RandomStrategy, RoundRobinStrategy, RuntimeConfig, Strategy,
	TemperatureCheckingStrategy,
};
use weave_type::{Error, Result};

/// Exploration strategy used for each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyKind {
	Random,
	RoundRobin,
	/// PCT-style priorities with at most `switches` priority changes.
	Priority {
		switches: usize,
	},
}

/// Liveness check wrapped around the exploration strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LivenessCheck {
	/// Hot monitors are only judged when the execution terminates.
	None,
	CycleDetection,
	Temperature {
		threshold: usize,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfiguration {
	pub iterations: usize,
	pub seed: u64,
	pub strategy: StrategyKind,
	pub liveness: LivenessCheck,
	pub max_steps: usize,
	pub strict_transitions: bool,
	pub record_log: bool,
}

impl Default for TestConfiguration {
	fn default() -> Self {
		Self {
			iterations: 100,
			seed: 0,
			strategy: StrategyKind::Random,
			liveness: LivenessCheck::None,
			max_steps: 10_000,
			strict_transitions: true,
			record_log: true,
		}
	}
}

impl TestConfiguration {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn iterations(mut self, iterations: usize) -> Self {
		self.iterations = iterations;
		self
	}

	pub fn seed(mut self, seed: u64) -> Self {
		self.seed = seed;
		self
	}

	pub fn strategy(mut self, strategy: StrategyKind) -> Self {
		self.strategy = strategy;
		self
	}

	pub fn liveness(mut self, liveness: LivenessCheck) -> Self {
		self.liveness = liveness;
		self
	}

	pub fn max_steps(mut self, max_steps: usize) -> Self {
		self.max_steps = max_steps;
		self
	}

	pub fn strict_transitions(mut self, strict: bool) -> Self {
		self.strict_transitions = strict;
		self
	}

	pub fn record_log(mut self, record: bool) -> Self {
		self.record_log = record;
		self
	}

	pub fn from_json(json: &str) -> Result<Self> {
		let value: serde_json::Value = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
		if !value.is_object() {
			return Err(Error::Config(format!("test configuration must be a JSON object, got {}", json.trim())));
		}
		let config: Self = serde_json::from_value(value).map_err(|e| Error::Config(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn validate(&self) -> Result<()> {
		if self.iterations == 0 {
			return Err(Error::Config("iterations must be positive".to_string()));
		}
		if self.max_steps == 0 {
			return Err(Error::Config("max_steps must be positive".to_string()));
		}
		if let LivenessCheck::Temperature {
			threshold: 0,
		} = self.liveness
		{
			return Err(Error::Config("temperature threshold must be positive".to_string()));
		}
		Ok(())
	}

	/// Runtime settings for one iteration.
	pub fn runtime_config(&self) -> RuntimeConfig {
		RuntimeConfig::new()
			.max_steps(self.max_steps)
			.strict_transitions(self.strict_transitions)
			.record_log(self.record_log)
	}

	/// Fresh strategy; the same instance is reused across iterations.
	pub fn build_strategy(&self) -> Box<dyn Strategy> {
		let base: Box<dyn Strategy> = match self.strategy {
			StrategyKind::Random => Box::new(RandomStrategy::new(self.seed)),
			StrategyKind::RoundRobin => Box::new(RoundRobinStrategy::new()),
			StrategyKind::Priority {
				switches,
			} => Box::new(PriorityStrategy::new(self.seed, switches)),
		};
		match self.liveness {
			LivenessCheck::None => base,
			LivenessCheck::CycleDetection => Box::new(CycleDetectionStrategy::new(base)),
			LivenessCheck::Temperature {
				threshold,
			} => Box::new(TemperatureCheckingStrategy::new(base, threshold)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_from_json_defaults() {
		let config = TestConfiguration::from_json(r#"{"iterations": 5, "strategy": {"kind": "priority", "switches": 3}}"#)
			.unwrap();
		assert_eq!(config.iterations, 5);
		assert_eq!(
			config.strategy,
			StrategyKind::Priority {
				switches: 3
			}
		);
		assert_eq!(config.max_steps, 10_000);
		assert_eq!(config.liveness, LivenessCheck::None);
	}

	#[test]
	fn test_invalid_configuration() {
		assert!(matches!(TestConfiguration::from_json(r#"{"iterations": 0}"#), Err(Error::Config(_))));
		assert!(matches!(
			TestConfiguration::from_json(r#"{"liveness": {"kind": "temperature", "threshold": 0}}"#),
			Err(Error::Config(_))
		));
		assert!(matches!(TestConfiguration::from_json("[]"), Err(Error::Config(_))));
		assert!(matches!(TestConfiguration::from_json("7"), Err(Error::Config(_))));
	}

	#[test]
	fn test_strategy_description() {
		let strategy = TestConfiguration::new()
			.strategy(StrategyKind::RoundRobin)
			.liveness(LivenessCheck::CycleDetection)
			.build_strategy();
		assert!(strategy.is_fair());
		assert!(!strategy.description().is_empty());
	}

	#[test]
	fn test_runtime_config() {
		let runtime = TestConfiguration::new().max_steps(50).strict_transitions(false).runtime_config();
		assert_eq!(runtime.max_steps, 50);
		assert!(!runtime.strict_transitions);
	}
}
