//! Sampler-side parameter state: current values, per-parameter proposal
//! scale, acceptance tracking, and adaptation status.
//!
//! All identity lives in the instance. The name list is insertion-stable, so
//! every serialization and every output header uses the same ordering for
//! the life of a run.

use crate::input::SerializationData;
use std::collections::BTreeMap;
use stm_common::{Error, ParMap, ParName, ParValue, Result};

pub const VARIANCE_MIN: f64 = 1e-3;
pub const VARIANCE_MAX: f64 = 1e3;

const DEFAULT_VARIANCE: f64 = 1.0;
const DEFAULT_OPTIMAL_ACCEPTANCE_RATE: f64 = 0.234;
const DEFAULT_TARGET_ACCEPTANCE_INTERVAL: (f64, f64) = (0.15, 0.5);

/// Initial state and tuning for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSettings {
    pub name: ParName,
    pub initial_value: ParValue,
    pub variance: f64,
    pub acceptance_rate: f64,
    pub is_constant: bool,
}

impl ParameterSettings {
    pub fn new(name: impl Into<ParName>, initial_value: ParValue) -> Self {
        Self {
            name: name.into(),
            initial_value,
            variance: DEFAULT_VARIANCE,
            acceptance_rate: 0.0,
            is_constant: false,
        }
    }

    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = variance.clamp(VARIANCE_MIN, VARIANCE_MAX);
        self
    }

    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }
}

/// The full parameter vector plus sampler bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    names: Vec<ParName>,
    active_names: Vec<ParName>,
    settings: BTreeMap<ParName, ParameterSettings>,
    values: ParMap,
    iteration: u64,
    target_acceptance_interval: (f64, f64),
    optimal_acceptance_rate: f64,
}

impl Parameters {
    /// Build from initial settings. Insertion order is preserved; a repeated
    /// name keeps its first settings.
    pub fn new(inits: Vec<ParameterSettings>) -> Self {
        let mut names = Vec::with_capacity(inits.len());
        let mut active_names = Vec::new();
        let mut settings = BTreeMap::new();
        for mut par in inits {
            if settings.contains_key(&par.name) {
                continue;
            }
            par.variance = par.variance.clamp(VARIANCE_MIN, VARIANCE_MAX);
            names.push(par.name.clone());
            if !par.is_constant {
                active_names.push(par.name.clone());
            }
            settings.insert(par.name.clone(), par);
        }
        let mut out = Self {
            names,
            active_names,
            settings,
            values: ParMap::new(),
            iteration: 0,
            target_acceptance_interval: DEFAULT_TARGET_ACCEPTANCE_INTERVAL,
            optimal_acceptance_rate: DEFAULT_OPTIMAL_ACCEPTANCE_RATE,
        };
        out.reset();
        out
    }

    /// Rebuild from a `Parameters` resume block.
    pub fn from_resume(sd: &SerializationData) -> Result<Self> {
        let names: Vec<ParName> = sd.strings("parNames")?.to_vec();
        let inits: Vec<f64> = sd.vector("initialVals")?;
        let variances: Vec<f64> = sd.vector("samplerVariance")?;
        let accepts: Vec<f64> = sd.vector("acceptanceRates")?;
        let constants: Vec<i64> = sd.vector("isConstant")?;
        let values: Vec<f64> = sd.vector("parameterValues")?;
        for (key, len) in [
            ("initialVals", inits.len()),
            ("samplerVariance", variances.len()),
            ("acceptanceRates", accepts.len()),
            ("isConstant", constants.len()),
            ("parameterValues", values.len()),
        ] {
            if len != names.len() {
                return Err(Error::ResumeCorrupt(format!(
                    "`{key}` has {len} entries for {} parameters",
                    names.len()
                )));
            }
        }

        let interval: Vec<f64> = sd.vector("targetAcceptanceInterval")?;
        if interval.len() != 2 {
            return Err(Error::ResumeCorrupt(
                "`targetAcceptanceInterval` needs exactly two values".into(),
            ));
        }

        let mut settings = BTreeMap::new();
        let mut active_names = Vec::new();
        let mut value_map = ParMap::new();
        for (i, name) in names.iter().enumerate() {
            let par = ParameterSettings {
                name: name.clone(),
                initial_value: inits[i],
                variance: variances[i].clamp(VARIANCE_MIN, VARIANCE_MAX),
                acceptance_rate: accepts[i],
                is_constant: constants[i] != 0,
            };
            if !par.is_constant {
                active_names.push(name.clone());
            }
            value_map.insert(name.clone(), values[i]);
            settings.insert(name.clone(), par);
        }

        Ok(Self {
            names,
            active_names,
            settings,
            values: value_map,
            iteration: sd.scalar("iterationCount")?,
            target_acceptance_interval: (interval[0], interval[1]),
            optimal_acceptance_rate: sd.scalar("optimalAcceptanceRate")?,
        })
    }

    /// All parameter names in file order.
    pub fn names(&self) -> &[ParName] {
        &self.names
    }

    /// Names subject to proposal and adaptation.
    pub fn active_names(&self) -> &[ParName] {
        &self.active_names
    }

    pub fn size(&self) -> usize {
        self.names.len()
    }

    /// Current value of every parameter.
    pub fn current_state(&self) -> &ParMap {
        &self.values
    }

    /// Current value of one parameter.
    pub fn value(&self, name: &str) -> Result<ParValue> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| unknown(name))
    }

    /// Write one parameter value.
    pub fn update(&mut self, name: &str, value: ParValue) -> Result<()> {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(unknown(name)),
        }
    }

    pub fn sampler_variance(&self, name: &str) -> Result<f64> {
        Ok(self.setting(name)?.variance)
    }

    /// Set the proposal variance, silently clamped to the legal range.
    pub fn set_sampler_variance(&mut self, name: &str, variance: f64) -> Result<()> {
        self.setting_mut(name)?.variance = variance.clamp(VARIANCE_MIN, VARIANCE_MAX);
        Ok(())
    }

    pub fn acceptance_rate(&self, name: &str) -> Result<f64> {
        Ok(self.setting(name)?.acceptance_rate)
    }

    pub fn set_acceptance_rate(&mut self, name: &str, rate: f64) -> Result<()> {
        self.setting_mut(name)?.acceptance_rate = rate;
        Ok(())
    }

    pub fn set_acceptance_rates(&mut self, rates: &BTreeMap<ParName, f64>) -> Result<()> {
        for (name, rate) in rates {
            self.set_acceptance_rate(name, *rate)?;
        }
        Ok(())
    }

    /// Whether every active parameter's acceptance rate sits inside the
    /// target interval.
    pub fn adapted(&self) -> bool {
        self.names.iter().all(|n| self.parameter_adapted(n))
    }

    /// Single-parameter adaptation check; constants are always adapted.
    pub fn is_adapted(&self, name: &str) -> Result<bool> {
        if !self.settings.contains_key(name) {
            return Err(unknown(name));
        }
        Ok(self.parameter_adapted(name))
    }

    /// -1 below the optimal acceptance rate, +1 above, 0 at it.
    pub fn adaptation_status(&self, name: &str) -> Result<i8> {
        let rate = self.acceptance_rate(name)?;
        Ok(if rate < self.optimal_acceptance_rate {
            -1
        } else if rate > self.optimal_acceptance_rate {
            1
        } else {
            0
        })
    }

    pub fn optimal_acceptance_rate(&self) -> f64 {
        self.optimal_acceptance_rate
    }

    pub fn target_acceptance_interval(&self) -> (f64, f64) {
        self.target_acceptance_interval
    }

    /// Current values back to initial values, iteration to zero. Variance
    /// and acceptance are deliberately untouched.
    pub fn reset(&mut self) {
        for name in &self.names {
            if let Some(par) = self.settings.get(name) {
                self.values.insert(name.clone(), par.initial_value);
            }
        }
        self.iteration = 0;
    }

    pub fn increment(&mut self, n: u64) {
        self.iteration += n;
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// The `Parameters` block of the resume format.
    pub fn serialize(&self, sep: char) -> String {
        let mut out = String::new();
        let join = |values: Vec<String>| -> String {
            values
                .into_iter()
                .map(|v| format!("{sep}{v}"))
                .collect::<String>()
        };
        let per_par = |f: &dyn Fn(&ParameterSettings) -> String| -> Vec<String> {
            self.names
                .iter()
                .filter_map(|n| self.settings.get(n))
                .map(f)
                .collect()
        };

        out.push_str("parNames");
        out.push_str(&join(self.names.iter().cloned().collect()));
        out.push_str("\ninitialVals");
        out.push_str(&join(per_par(&|p| p.initial_value.to_string())));
        out.push_str("\nsamplerVariance");
        out.push_str(&join(per_par(&|p| p.variance.to_string())));
        out.push_str("\nacceptanceRates");
        out.push_str(&join(per_par(&|p| p.acceptance_rate.to_string())));
        out.push_str("\nisConstant");
        out.push_str(&join(per_par(&|p| i32::from(p.is_constant).to_string())));
        out.push_str(&format!(
            "\ntargetAcceptanceInterval{sep}{}{sep}{}",
            self.target_acceptance_interval.0, self.target_acceptance_interval.1
        ));
        out.push_str(&format!(
            "\noptimalAcceptanceRate{sep}{}",
            self.optimal_acceptance_rate
        ));
        out.push_str(&format!("\niterationCount{sep}{}", self.iteration));
        out.push_str("\nparameterValues");
        let values: Vec<String> = self
            .names
            .iter()
            .filter_map(|n| self.values.get(n))
            .map(|v| v.to_string())
            .collect();
        out.push_str(&join(values));
        out.push('\n');
        out
    }

    /// Acceptance/variance table on stderr, active parameters only, with
    /// parameters still outside the target interval highlighted.
    pub fn print_adaptation(&self, color: bool) {
        const RED: &str = "\x1b[1;31m";
        const CYAN: &str = "\x1b[1;36m";
        const RESET: &str = "\x1b[0m";
        const COLUMNS: usize = 3;

        let mut header = String::new();
        for _ in 0..COLUMNS {
            header.push_str(&format!("{:<8}{:>12}{:>12}     ", "par", "acceptance", "variance"));
        }
        eprintln!("{}", header.trim_end());

        let mut col = 0;
        let mut line = String::new();
        for name in &self.active_names {
            let Some(par) = self.settings.get(name) else { continue };
            let cell = format!(
                "{:<8}{:>12.3}{:>12.3}",
                name, par.acceptance_rate, par.variance
            );
            if color {
                let tint = if self.parameter_adapted(name) { CYAN } else { RED };
                line.push_str(&format!("{tint}{cell}{RESET}"));
            } else {
                line.push_str(&cell);
            }
            col += 1;
            if col == COLUMNS {
                eprintln!("{line}");
                line.clear();
                col = 0;
            } else {
                line.push_str("     ");
            }
        }
        if !line.is_empty() {
            eprintln!("{}", line.trim_end());
        }
    }

    fn parameter_adapted(&self, name: &str) -> bool {
        let Some(par) = self.settings.get(name) else {
            return true;
        };
        if par.is_constant {
            return true;
        }
        let (lo, hi) = self.target_acceptance_interval;
        (lo..=hi).contains(&par.acceptance_rate)
    }

    fn setting(&self, name: &str) -> Result<&ParameterSettings> {
        self.settings.get(name).ok_or_else(|| unknown(name))
    }

    fn setting_mut(&mut self, name: &str) -> Result<&mut ParameterSettings> {
        self.settings.get_mut(name).ok_or_else(|| unknown(name))
    }
}

fn unknown(name: &str) -> Error {
    Error::Parameter(format!("unknown parameter `{name}`"))
}
