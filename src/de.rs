use crate::candidate::Candidate;
use crate::error::{Result, TuneError};
use crate::filter::Filter;
use crate::param::Param;
use crate::pipeline;
use crate::population::Population;
use crate::space::ParamSpace;
use crate::testcase::Testcase;
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Selection weight offset: keeps zero-scoring members pickable as a base.
const BASE_WEIGHT_OFFSET: u64 = 1000;

//-----------------------------------------------------------------------------
// Differential Evolution core functions
//-----------------------------------------------------------------------------

/// Runs the differential-evolution search until the running flag drops, or
/// until `max_generations` is reached when it is non-zero.
///
/// Every generation moves the population from one fully scored state to the
/// next: below the required size the population is topped up with uniformly
/// sampled candidates (the only unconditional admissions); at full size each
/// slot derives one trial by mutation and crossover, all trials are evaluated
/// concurrently, and slots are overwritten in submission order whenever their
/// trial scores strictly higher. The leaderboard is rewritten after every
/// generation so a crash resumes where it left off.
pub fn tune(
    space: &ParamSpace,
    filter: &Filter,
    testcases: &[Testcase],
    mut population: Population,
    start_generation: usize,
    param: &Param,
    running: Arc<AtomicBool>,
) -> Result<Population> {
    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
    let required = Population::required_size(space, param.de.population_multiplier);
    let leaderboard = Path::new(&param.de.leaderboard);
    let mut generation = start_generation;

    if population.members.len() > required {
        warn!(
            "leaderboard holds {} candidates but the population needs {}: keeping the best",
            population.members.len(),
            required
        );
        let mut members = std::mem::take(&mut population.members);
        members.sort_by(|a, b| b.score.cmp(&a.score));
        members.truncate(required);
        population.members = members;
    }

    info!(
        "population size {} ({} x {} tunable parameters)",
        required,
        param.de.population_multiplier,
        space.dimensions()
    );

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("stop requested, leaving after generation {}", generation);
            break;
        }
        if param.de.max_generations > 0 && generation >= param.de.max_generations {
            info!("reached max_generations={}", param.de.max_generations);
            break;
        }

        let started = Instant::now();
        let replaced;

        if population.members.len() < required {
            let missing = required - population.members.len();
            info!(
                "generation {}: filling population with {} random candidates",
                generation, missing
            );
            let mut fresh: Vec<Candidate> = (0..missing)
                .map(|_| Candidate::new(space.sample(&mut rng), generation, None))
                .collect();
            evaluate_batch(&mut fresh, filter, testcases, param)?;
            replaced = fresh.len();
            population.members.extend(fresh);
        } else {
            let mut trials = generate_trials(&population, space, param, generation, &mut rng)?;
            evaluate_batch(&mut trials, filter, testcases, param)?;
            replaced = select(&mut population, trials);
        }

        population.save(leaderboard)?;

        let best = population.best().and_then(|c| c.score).unwrap_or(0);
        info!(
            "generation {} done in {:.2?}: best score {}, {} slot(s) updated",
            generation,
            started.elapsed(),
            best,
            replaced
        );
        generation += 1;
    }

    Ok(population)
}

/// Builds one trial per population slot from the generation-start population.
fn generate_trials(
    population: &Population,
    space: &ParamSpace,
    param: &Param,
    generation: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Vec<Candidate>> {
    let weights: Vec<u64> = population
        .members
        .iter()
        .map(|c| c.score.unwrap_or(0) + BASE_WEIGHT_OFFSET)
        .collect();
    let base_picker = WeightedIndex::new(&weights)
        .map_err(|e| TuneError::Config(format!("cannot build selection weights: {}", e)))?;

    (0..population.members.len())
        .map(|slot| make_trial(slot, population, space, param, &base_picker, generation, rng))
        .collect()
}

/// Derives the trial for one slot: a score-weighted base member plus the
/// scaled difference of two uniformly drawn members, crossed over parameter
/// by parameter with probability CR. A trial with any tunable parameter
/// outside its bound is thrown away wholesale and rebuilt from freshly drawn
/// donors; resampling instead of clamping keeps the donor-difference
/// distribution intact.
fn make_trial(
    slot: usize,
    population: &Population,
    space: &ParamSpace,
    param: &Param,
    base_picker: &WeightedIndex<u64>,
    generation: usize,
    rng: &mut ChaCha8Rng,
) -> Result<Candidate> {
    let f = param.de.mutation_factor;
    let cr = param.de.crossover_rate;
    let mut rejected = 0usize;

    loop {
        let (base, rand2, rand3) = pick_donors(slot, population.members.len(), base_picker, rng);
        let base = &population.members[base].values;
        let rand2 = &population.members[rand2].values;
        let rand3 = &population.members[rand3].values;

        let mut values = population.members[slot].values.clone();
        for name in space.bounds().keys() {
            if rng.gen::<f64>() < cr {
                let donor = base[name] + f * (rand2[name] - rand3[name]);
                values.insert(name.clone(), donor);
            }
        }

        if space.in_bounds(&values) {
            if rejected > 0 {
                debug!("slot {}: {} out-of-bound trial(s) resampled", slot, rejected);
            }
            return Ok(Candidate::new(values, generation, Some(slot)));
        }
        rejected += 1;
    }
}

/// Draws the three donor indices: the base by score-weighted sampling, the
/// two difference members uniformly; all four indices (slot included) must be
/// pairwise distinct, retried until satisfied.
fn pick_donors(
    slot: usize,
    size: usize,
    base_picker: &WeightedIndex<u64>,
    rng: &mut ChaCha8Rng,
) -> (usize, usize, usize) {
    loop {
        let base = base_picker.sample(rng);
        let rand2 = rng.gen_range(0..size);
        let rand3 = rng.gen_range(0..size);
        if base != slot
            && rand2 != slot
            && rand3 != slot
            && base != rand2
            && base != rand3
            && rand2 != rand3
        {
            return (base, rand2, rand3);
        }
    }
}

/// Evaluates a batch of candidates: every (candidate, testcase) unit is
/// submitted to the worker pool before any result is awaited, then the
/// collected counters are merged back and each candidate's score fixed.
/// The first failed unit aborts the batch and with it the whole search.
fn evaluate_batch(
    candidates: &mut [Candidate],
    filter: &Filter,
    testcases: &[Testcase],
    param: &Param,
) -> Result<()> {
    let outcomes = {
        let shared = &*candidates;
        let units: Vec<(usize, &Testcase)> = (0..shared.len())
            .flat_map(|index| testcases.iter().map(move |testcase| (index, testcase)))
            .collect();
        units
            .into_par_iter()
            .map(|(index, testcase)| {
                pipeline::evaluate(filter, &shared[index].values, testcase, &param.pipeline)
                    .map(|counters| (index, testcase.source.clone(), counters))
            })
            .collect::<Result<Vec<_>>>()
    };

    for (index, source, counters) in outcomes? {
        candidates[index].results.insert(source, counters);
    }
    for candidate in candidates.iter_mut() {
        candidate.finalize();
    }
    Ok(())
}

/// Steady-state selection, processed in the order the trials were generated:
/// a trial overwrites its target slot only when it scores strictly higher
/// than the slot holds at comparison time, so later trials in the same
/// generation see earlier replacements. Returns the number of replaced slots.
fn select(population: &mut Population, trials: Vec<Candidate>) -> usize {
    let mut replaced = 0;
    for trial in trials {
        let slot = match trial.target {
            Some(slot) => slot,
            None => continue,
        };
        if trial.score > population.members[slot].score {
            debug!(
                "slot {}: {:?} replaces {:?}",
                slot, trial.score, population.members[slot].score
            );
            population.members[slot] = trial;
            replaced += 1;
        }
    }
    replaced
}
