pub mod candidate;
pub mod de;
pub mod error;
pub mod filter;
pub mod param;
pub mod pipeline;
pub mod population;
pub mod space;
pub mod testcase;

use crate::error::{Result, TuneError};
use crate::param::Param;
use crate::population::Population;
use log::info;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Runs the whole search: builds the filter and its parameter space, loads
/// the testcases, restores the leaderboard if one exists and hands over to
/// the differential-evolution engine. The engine keeps going until the
/// running flag drops (or `de.max_generations` is hit) and returns the final
/// population.
pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<Population> {
    let start = std::time::Instant::now();

    let filter = filter::filter(&param.general.filter)?;
    let space = filter.param_space(param.data.sample_rate);
    space.validate()?;

    let testcases = testcase::load_dir(Path::new(&param.data.testcase_dir), param.data.sample_len)?;
    info!(
        "{} testcase(s) of {} samples loaded from {}",
        testcases.len(),
        param.data.sample_len,
        param.data.testcase_dir
    );

    let (population, start_generation) = Population::load(Path::new(&param.de.leaderboard))?;
    if population.members.is_empty() {
        info!("no leaderboard at {}, starting fresh", param.de.leaderboard);
    } else {
        info!(
            "resumed {} candidate(s) from {}, continuing at generation {}",
            population.members.len(),
            param.de.leaderboard,
            start_generation
        );
        for member in &population.members {
            for name in space.defaults().keys() {
                if !member.values.contains_key(name) {
                    return Err(TuneError::Config(format!(
                        "leaderboard entry is missing parameter {}; was it written by another filter family?",
                        name
                    )));
                }
            }
        }
    }

    let population = de::tune(
        &space,
        &filter,
        &testcases,
        population,
        start_generation,
        param,
        running,
    )?;

    info!("search finished in {:.2?}", start.elapsed());
    Ok(population)
}
