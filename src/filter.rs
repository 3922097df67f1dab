use crate::error::{Result, TuneError};
use crate::space::ParamSpace;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Filter families the engine can tune. The family is fixed at configuration
/// time; every evaluation rebuilds the concrete filter from the candidate's
/// parameter mapping, so `transform` stays pure and deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// RBJ biquad cascade: lowpass followed by a peaking EQ section
    Biquad,
    /// Windowed-sinc lowpass with a Kaiser window
    Fir,
}

/// Converts a filter family string to its engine representation.
pub fn filter(filter_string: &str) -> Result<Filter> {
    match filter_string.to_lowercase().as_str() {
        "biquad" | "iir" => Ok(Filter::Biquad),
        "fir" => Ok(Filter::Fir),
        other => Err(TuneError::Config(format!(
            "unrecognized filter family {}",
            other
        ))),
    }
}

impl Filter {
    /// The parameter space of this family. Frequency bounds scale with the
    /// sample rate so every in-bounds trial stays below Nyquist.
    pub fn param_space(&self, sample_rate: f64) -> ParamSpace {
        let mut defaults = BTreeMap::new();
        let mut bounds = BTreeMap::new();
        defaults.insert("sample_rate".to_string(), sample_rate);
        match self {
            Filter::Biquad => {
                defaults.insert("lowpass_cutoff".to_string(), 0.018 * sample_rate);
                defaults.insert("lowpass_q".to_string(), std::f64::consts::FRAC_1_SQRT_2);
                defaults.insert("peak_freq".to_string(), 0.0225 * sample_rate);
                defaults.insert("peak_q".to_string(), 1.0);
                defaults.insert("peak_gain_db".to_string(), 0.0);
                bounds.insert(
                    "lowpass_cutoff".to_string(),
                    (0.01 * sample_rate, 0.04 * sample_rate),
                );
                bounds.insert("lowpass_q".to_string(), (0.3, 4.0));
                bounds.insert(
                    "peak_freq".to_string(),
                    (0.005 * sample_rate, 0.035 * sample_rate),
                );
                bounds.insert("peak_q".to_string(), (0.3, 8.0));
                bounds.insert("peak_gain_db".to_string(), (-12.0, 12.0));
            }
            Filter::Fir => {
                defaults.insert("taps".to_string(), 127.0);
                defaults.insert("cutoff".to_string(), 0.018 * sample_rate);
                defaults.insert("kaiser_beta".to_string(), 5.0);
                defaults.insert("gain_db".to_string(), 0.0);
                bounds.insert(
                    "cutoff".to_string(),
                    (0.01 * sample_rate, 0.04 * sample_rate),
                );
                bounds.insert("kaiser_beta".to_string(), (0.5, 12.0));
                bounds.insert("gain_db".to_string(), (-12.0, 12.0));
            }
        }
        ParamSpace::new(defaults, bounds)
    }

    /// Applies the filter described by `values` to `samples`. Pure: no I/O,
    /// identical inputs give identical outputs.
    pub fn transform(
        &self,
        values: &BTreeMap<String, f64>,
        samples: &[f64],
    ) -> Result<Vec<f64>> {
        let filtered = match self {
            Filter::Biquad => {
                let srate = value(values, "sample_rate")?;
                let mut lowpass = Biquad::lowpass(
                    value(values, "lowpass_cutoff")?,
                    srate,
                    value(values, "lowpass_q")?,
                )?;
                let mut peak = Biquad::peak(
                    value(values, "peak_freq")?,
                    srate,
                    value(values, "peak_q")?,
                    value(values, "peak_gain_db")?,
                )?;
                samples
                    .iter()
                    .map(|&x| peak.process(lowpass.process(x)))
                    .collect::<Vec<f64>>()
            }
            Filter::Fir => {
                let srate = value(values, "sample_rate")?;
                let taps = value(values, "taps")?.round() as usize;
                let coeffs = kaiser_lowpass(
                    taps,
                    value(values, "cutoff")?,
                    srate,
                    value(values, "kaiser_beta")?,
                    value(values, "gain_db")?,
                )?;
                convolve(&coeffs, samples)
            }
        };
        if filtered.iter().any(|v| !v.is_finite()) {
            return Err(TuneError::Filter(
                "transform produced a non-finite sample".to_string(),
            ));
        }
        Ok(filtered)
    }
}

fn value(values: &BTreeMap<String, f64>, name: &str) -> Result<f64> {
    values
        .get(name)
        .copied()
        .ok_or_else(|| TuneError::Filter(format!("missing parameter {}", name)))
}

/// One RBJ biquad section with its processing state.
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn lowpass(freq: f64, srate: f64, q: f64) -> Result<Self> {
        check_section(freq, srate, q)?;
        let omega = 2.0 * PI * freq / srate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * q);

        let b0 = (1.0 - cs) / 2.0;
        let b1 = 1.0 - cs;
        let b2 = (1.0 - cs) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cs;
        let a2 = 1.0 - alpha;

        Ok(Biquad::normalized(b0, b1, b2, a0, a1, a2))
    }

    fn peak(freq: f64, srate: f64, q: f64, db_gain: f64) -> Result<Self> {
        check_section(freq, srate, q)?;
        let a = 10.0_f64.powf(db_gain / 40.0);
        let omega = 2.0 * PI * freq / srate;
        let sn = omega.sin();
        let cs = omega.cos();
        let alpha = sn / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cs;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cs;
        let a2 = 1.0 - alpha / a;

        Ok(Biquad::normalized(b0, b1, b2, a0, a1, a2))
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }
}

fn check_section(freq: f64, srate: f64, q: f64) -> Result<()> {
    if freq <= 0.0 || freq >= srate / 2.0 {
        return Err(TuneError::Filter(format!(
            "frequency {} outside (0, {}) at sample rate {}",
            freq,
            srate / 2.0,
            srate
        )));
    }
    if q <= 0.0 {
        return Err(TuneError::Filter(format!("non-positive Q {}", q)));
    }
    Ok(())
}

/// Windowed-sinc lowpass coefficients, DC gain normalized to `gain_db`.
fn kaiser_lowpass(taps: usize, cutoff: f64, srate: f64, beta: f64, gain_db: f64) -> Result<Vec<f64>> {
    if taps < 3 {
        return Err(TuneError::Filter(format!("too few taps: {}", taps)));
    }
    if cutoff <= 0.0 || cutoff >= srate / 2.0 {
        return Err(TuneError::Filter(format!(
            "cutoff {} outside (0, {}) at sample rate {}",
            cutoff,
            srate / 2.0,
            srate
        )));
    }
    if beta < 0.0 {
        return Err(TuneError::Filter(format!("negative Kaiser beta {}", beta)));
    }

    let m = (taps - 1) as f64 / 2.0;
    let fc = cutoff / srate;
    let i0_beta = bessel_i0(beta);

    let mut coeffs = Vec::with_capacity(taps);
    for k in 0..taps {
        let t = k as f64 - m;
        let window = bessel_i0(beta * (1.0 - (t / m).powi(2)).max(0.0).sqrt()) / i0_beta;
        coeffs.push(2.0 * fc * sinc(2.0 * fc * t) * window);
    }

    let sum: f64 = coeffs.iter().sum();
    if sum.abs() < f64::EPSILON {
        return Err(TuneError::Filter("degenerate FIR design".to_string()));
    }
    let gain = 10.0_f64.powf(gain_db / 20.0);
    for c in coeffs.iter_mut() {
        *c *= gain / sum;
    }
    Ok(coeffs)
}

fn sinc(t: f64) -> f64 {
    if t == 0.0 {
        1.0
    } else {
        (PI * t).sin() / (PI * t)
    }
}

/// Zeroth-order modified Bessel function of the first kind (series expansion).
fn bessel_i0(x: f64) -> f64 {
    let half = x / 2.0;
    let mut sum = 1.0;
    let mut term = 1.0;
    for m in 1..64 {
        term *= (half / m as f64) * (half / m as f64);
        sum += term;
        if term < 1e-12 * sum {
            break;
        }
    }
    sum
}

/// Causal direct-form convolution; output has the input's length.
fn convolve(coeffs: &[f64], samples: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(samples.len());
    for n in 0..samples.len() {
        let mut acc = 0.0;
        for (k, &c) in coeffs.iter().enumerate() {
            if k > n {
                break;
            }
            acc += c * samples[n - k];
        }
        out.push(acc);
    }
    out
}
