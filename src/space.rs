use crate::error::{Result, TuneError};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// The search space of a filter family: a default value for every parameter
/// the transform reads, and a `[min, max]` bound for the subset the engine is
/// allowed to mutate. Parameters without a bound always keep their default.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpace {
    defaults: BTreeMap<String, f64>,
    bounds: BTreeMap<String, (f64, f64)>,
}

impl ParamSpace {
    pub fn new(defaults: BTreeMap<String, f64>, bounds: BTreeMap<String, (f64, f64)>) -> Self {
        ParamSpace { defaults, bounds }
    }

    pub fn defaults(&self) -> &BTreeMap<String, f64> {
        &self.defaults
    }

    pub fn bounds(&self) -> &BTreeMap<String, (f64, f64)> {
        &self.bounds
    }

    /// Number of tunable parameters; the DE population is sized from this.
    pub fn dimensions(&self) -> usize {
        self.bounds.len()
    }

    pub fn validate(&self) -> Result<()> {
        for (name, &(min, max)) in &self.bounds {
            if !self.defaults.contains_key(name) {
                return Err(TuneError::Config(format!(
                    "bounded parameter {} has no default value",
                    name
                )));
            }
            if min > max {
                return Err(TuneError::Config(format!(
                    "invalid bound for {}: min {} > max {}",
                    name, min, max
                )));
            }
        }
        Ok(())
    }

    /// Draws a full parameter mapping: uniform within each bound, defaults
    /// for everything else.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> BTreeMap<String, f64> {
        let mut values = self.defaults.clone();
        for (name, &(min, max)) in &self.bounds {
            values.insert(name.clone(), rng.gen_range(min..=max));
        }
        values
    }

    pub fn in_bounds(&self, values: &BTreeMap<String, f64>) -> bool {
        self.bounds.iter().all(|(name, &(min, max))| {
            values
                .get(name)
                .map_or(false, |&v| v >= min && v <= max)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn toy_space() -> ParamSpace {
        let mut defaults = BTreeMap::new();
        defaults.insert("x".to_string(), 0.5);
        defaults.insert("y".to_string(), 0.0);
        defaults.insert("rate".to_string(), 48_000.0);
        let mut bounds = BTreeMap::new();
        bounds.insert("x".to_string(), (0.0, 1.0));
        bounds.insert("y".to_string(), (-1.0, 1.0));
        ParamSpace::new(defaults, bounds)
    }

    #[test]
    fn dimensions_counts_bounded_parameters_only() {
        assert_eq!(toy_space().dimensions(), 2);
    }

    #[test]
    fn sample_stays_within_bounds_and_keeps_defaults() {
        let space = toy_space();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..500 {
            let values = space.sample(&mut rng);
            assert!(values["x"] >= 0.0 && values["x"] <= 1.0);
            assert!(values["y"] >= -1.0 && values["y"] <= 1.0);
            assert_eq!(values["rate"], 48_000.0);
        }
    }

    #[test]
    fn in_bounds_rejects_out_of_range_values() {
        let space = toy_space();
        let mut values = space.defaults().clone();
        assert!(space.in_bounds(&values));
        values.insert("x".to_string(), 1.3);
        assert!(!space.in_bounds(&values));
    }

    #[test]
    fn validate_rejects_bound_without_default() {
        let mut bounds = BTreeMap::new();
        bounds.insert("ghost".to_string(), (0.0, 1.0));
        let space = ParamSpace::new(BTreeMap::new(), bounds);
        assert!(space.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_bound() {
        let mut defaults = BTreeMap::new();
        defaults.insert("x".to_string(), 0.5);
        let mut bounds = BTreeMap::new();
        bounds.insert("x".to_string(), (1.0, 0.0));
        let space = ParamSpace::new(defaults, bounds);
        assert!(space.validate().is_err());
    }
}
