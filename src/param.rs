use crate::error::{Result, TuneError};
use crate::filter;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub de: De,
    #[serde(default)]
    pub pipeline: Pipeline,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    /// Worker threads for concurrent evaluation, 0 = one per core
    #[serde(default = "uzero_default")]
    pub thread_number: usize,
    #[serde(default = "filter_default")]
    pub filter: String,
    #[serde(default = "empty_string")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "testcase_dir_default")]
    pub testcase_dir: String,
    /// Samples taken from every capture excerpt; all testcases share this length
    #[serde(default = "sample_len_default")]
    pub sample_len: usize,
    #[serde(default = "sample_rate_default")]
    pub sample_rate: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct De {
    /// Population size = multiplier x number of tunable parameters
    #[serde(default = "population_multiplier_default")]
    pub population_multiplier: usize,
    #[serde(default = "mutation_factor_default")]
    pub mutation_factor: f64,
    #[serde(default = "crossover_rate_default")]
    pub crossover_rate: f64,
    /// 0 = run until stopped by the operator
    #[serde(default = "uzero_default")]
    pub max_generations: usize,
    #[serde(default = "leaderboard_default")]
    pub leaderboard: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Pipeline {
    #[serde(default = "empty_string")]
    pub encode_command: String,
    #[serde(default = "string_vec_default")]
    pub encode_args: Vec<String>,
    #[serde(default = "empty_string")]
    pub decode_command: String,
    #[serde(default = "string_vec_default")]
    pub decode_args: Vec<String>,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for De {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn get(param_file: &str) -> Result<Param> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let config: Param = serde_yaml::from_reader(param_reader)
        .map_err(|e| TuneError::Config(format!("cannot parse {}: {}", param_file, e)))?;

    validate(&config)?;

    Ok(config)
}

pub fn validate(param: &Param) -> Result<()> {
    let filter = filter::filter(&param.general.filter)?;

    if param.data.sample_len == 0 {
        return Err(TuneError::Config("sample_len must be > 0".to_string()));
    }

    if param.data.sample_rate <= 0.0 {
        return Err(TuneError::Config(format!(
            "invalid sample_rate={}. Must be > 0.",
            param.data.sample_rate
        )));
    }

    if param.de.mutation_factor <= 0.0 || param.de.mutation_factor >= 2.0 {
        return Err(TuneError::Config(format!(
            "invalid mutation_factor={:.3}. Must be in range (0, 2).",
            param.de.mutation_factor
        )));
    }

    if !(0.0..=1.0).contains(&param.de.crossover_rate) {
        return Err(TuneError::Config(format!(
            "invalid crossover_rate={:.3}. Must be in range [0, 1].",
            param.de.crossover_rate
        )));
    }

    let dimensions = filter.param_space(param.data.sample_rate).dimensions();
    if param.de.population_multiplier * dimensions < 4 {
        return Err(TuneError::Config(format!(
            "population size {} is too small: donor selection needs at least 4 members",
            param.de.population_multiplier * dimensions
        )));
    }

    if param.de.mutation_factor > 1.0 {
        warn!(
            "mutation_factor={:.2} > 1: expect many rejected trials near the bounds",
            param.de.mutation_factor
        );
    }

    if param.pipeline.encode_command.is_empty() || param.pipeline.decode_command.is_empty() {
        return Err(TuneError::Config(
            "both encode_command and decode_command must be configured".to_string(),
        ));
    }

    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    1977042042
}
fn empty_string() -> String {
    "".to_string()
}
fn string_vec_default() -> Vec<String> {
    Vec::new()
}
fn filter_default() -> String {
    "biquad".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn testcase_dir_default() -> String {
    "testcases".to_string()
}
fn sample_len_default() -> usize {
    1_000_000
}
fn sample_rate_default() -> f64 {
    40_000_000.0
}
fn population_multiplier_default() -> usize {
    15
}
fn mutation_factor_default() -> f64 {
    0.5
}
fn crossover_rate_default() -> f64 {
    0.3
}
fn leaderboard_default() -> String {
    "leaderboard.jsonl".to_string()
}
fn uzero_default() -> usize {
    0
}
