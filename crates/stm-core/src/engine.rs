//! Adaptive componentwise Metropolis-Hastings driver.
//!
//! One run moves through: optional adaptation (regression tuning, then
//! ratio tuning), burn-in, posterior sampling, optional DIC finalization,
//! and a final checkpoint. Each sweep proposes every active parameter once,
//! in an order shuffled per batch; acceptance is the usual
//! exp(trial - current) log-posterior ratio with NaN degrading to a
//! rejection.

use crate::input::SerializationData;
use crate::likelihood::Likelihood;
use crate::output::{OutputOptions, OutputQueue, OutputRecord};
use crate::parameters::{ParameterSettings, Parameters};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Gamma, Normal};
use std::collections::BTreeMap;
use std::sync::Arc;
use stm_common::{Error, OutputLevel, ParMap, ParName, Result};
use stm_math::{pearson, weighted_mean, LinearFit, WeightedMean};
use tracing::{info, warn};

pub const ENGINE_VERSION: &str = "Metropolis1.5";

/// Trial proposal variances during regression adaptation are drawn from a
/// Gamma with mean 2.38 and sd 2.
const ADAPT_GAMMA_SHAPE: f64 = 1.4161;
const ADAPT_GAMMA_SCALE: f64 = 1.681;
const REGRESSION_STEPS: usize = 10;
const REGRESSION_STEP_SIZE: usize = 100;

type RateMap = BTreeMap<ParName, f64>;

/// Run-level sampler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Samples per batch pushed to the sink (and per burn-in chunk).
    pub output_buffer_size: usize,
    /// Record every `thin`-th sweep.
    pub thin: u32,
    /// Sweeps discarded before sampling starts.
    pub burnin: u64,
    /// Batch size during ratio adaptation.
    pub adaptation_sample_size: usize,
    pub min_adaptation_loops: u32,
    pub max_adaptation_loops: u32,
    /// Fixed seed; `None` seeds from system entropy.
    pub seed: Option<u64>,
    pub compute_dic: bool,
    pub output_level: OutputLevel,
    pub save_resume_data: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            output_buffer_size: 500,
            thin: 1,
            burnin: 0,
            adaptation_sample_size: 500,
            min_adaptation_loops: 5,
            max_adaptation_loops: 25,
            seed: None,
            compute_dic: false,
            output_level: OutputLevel::Normal,
            save_resume_data: false,
        }
    }
}

/// The sampler. Owns the parameter state and the RNG; borrows the
/// likelihood; shares the sink with the writer thread.
pub struct Metropolis<'a> {
    parameters: Parameters,
    likelihood: &'a mut Likelihood,
    queue: Arc<OutputQueue>,
    options: OutputOptions,
    settings: EngineSettings,
    rng: ChaCha20Rng,
    rng_seed: u64,
    rng_set_seed: bool,
    current_ll: f64,
    current_posterior: f64,
    dbar: WeightedMean,
    theta_bar: ParMap,
    theta_bar_count: u64,
    sample_deviance: Vec<(f64, u64)>,
    current_samples: Vec<ParMap>,
}

impl<'a> Metropolis<'a> {
    pub fn new(
        inits: Vec<ParameterSettings>,
        likelihood: &'a mut Likelihood,
        queue: Arc<OutputQueue>,
        options: OutputOptions,
        settings: EngineSettings,
    ) -> Result<Self> {
        let parameters = Parameters::new(inits);
        Self::build(parameters, likelihood, queue, options, settings)
    }

    /// Rebuild a sampler mid-chain from parsed resume blocks.
    pub fn from_resume(
        blocks: &BTreeMap<String, SerializationData>,
        likelihood: &'a mut Likelihood,
        queue: Arc<OutputQueue>,
    ) -> Result<Self> {
        let block = |name: &str| -> Result<&SerializationData> {
            blocks
                .get(name)
                .ok_or_else(|| Error::ResumeCorrupt(format!("missing `{name}` block")))
        };
        let engine = block("Metropolis")?;

        let version: String = engine.scalar("version")?;
        if version != ENGINE_VERSION {
            return Err(Error::ResumeVersionMismatch {
                expected: ENGINE_VERSION.into(),
                found: version,
            });
        }

        let parameters = Parameters::from_resume(block("Parameters")?)?;
        let options = OutputOptions::from_resume(block("OutputOptions")?)?;

        let output_level_tag: i64 = engine.scalar("outputLevel")?;
        let settings = EngineSettings {
            output_buffer_size: engine.scalar("outputBufferSize")?,
            thin: engine.scalar("thinSize")?,
            burnin: engine.scalar("burnin")?,
            adaptation_sample_size: engine.scalar("adaptationSampleSize")?,
            min_adaptation_loops: engine.scalar("minAdaptationLoops")?,
            max_adaptation_loops: engine.scalar("maxAdaptationLoops")?,
            seed: Some(engine.scalar("rngSeed")?),
            compute_dic: engine.scalar::<i64>("computeDIC")? != 0,
            output_level: OutputLevel::from_int(output_level_tag).ok_or_else(|| {
                Error::ResumeCorrupt(format!("unknown output level {output_level_tag}"))
            })?,
            save_resume_data: true,
        };

        let dbar_raw = engine.strings("DBar")?;
        let dbar = match dbar_raw {
            [mean, count] => {
                let mean: f64 = parse_resume(mean, "DBar")?;
                let count: u64 = parse_resume(count, "DBar")?;
                WeightedMean::new(mean, count)
            }
            _ => return Err(Error::ResumeCorrupt("`DBar` needs a mean and a count".into())),
        };

        let mut theta_bar = ParMap::new();
        for name in parameters.names() {
            theta_bar.insert(name.clone(), engine.scalar(&format!("thetaBar_{name}"))?);
        }

        let mut out = Self::build(parameters, likelihood, queue, options, settings)?;
        out.rng_set_seed = engine.scalar::<i64>("rngSetSeed")? != 0;
        out.rng.set_word_pos(engine.scalar::<u128>("rngStreamPos")?);
        out.current_ll = engine.scalar("currentLL")?;
        out.current_posterior = engine.scalar("currentPosteriorProb")?;
        out.dbar = dbar;
        out.theta_bar = theta_bar;
        out.theta_bar_count = engine.scalar("thetaBar_sampSize")?;
        Ok(out)
    }

    fn build(
        parameters: Parameters,
        likelihood: &'a mut Likelihood,
        queue: Arc<OutputQueue>,
        options: OutputOptions,
        settings: EngineSettings,
    ) -> Result<Self> {
        if settings.thin < 1 {
            return Err(Error::InvalidConfig("thin must be at least 1".into()));
        }
        let missing: Vec<ParName> = likelihood
            .model()
            .required_parameters()
            .into_iter()
            .filter(|name| !parameters.names().contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(Error::Parameter(format!(
                "parameter file does not define {}",
                missing.join(", ")
            )));
        }

        let (rng_seed, rng_set_seed) = match settings.seed {
            Some(seed) => (seed, true),
            None => (rand::rng().random(), false),
        };
        Ok(Self {
            parameters,
            likelihood,
            queue,
            options,
            settings,
            rng: ChaCha20Rng::seed_from_u64(rng_seed),
            rng_seed,
            rng_set_seed,
            current_ll: f64::NEG_INFINITY,
            current_posterior: f64::NEG_INFINITY,
            dbar: WeightedMean::empty(),
            theta_bar: ParMap::new(),
            theta_bar_count: 0,
            sample_deviance: Vec::new(),
            current_samples: Vec::new(),
        })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Draw `n` posterior samples (after adaptation and burn-in), pushing
    /// them to the sink in batches.
    pub fn run_sampler(&mut self, n: usize) -> Result<()> {
        self.current_ll = self.likelihood.log_likelihood(self.parameters.current_state());
        self.current_posterior = self.current_ll;
        self.say(OutputLevel::Normal, || {
            format!(
                "starting sampler: {} transitions, {} active of {} parameters, seed {}",
                self.likelihood.transition_count(),
                self.parameters.active_names().len(),
                self.parameters.size(),
                self.rng_seed
            )
        });

        if !self.parameters.adapted() {
            let saved_thin = self.settings.thin;
            self.settings.thin = 1;
            self.regression_adapt(REGRESSION_STEPS, REGRESSION_STEP_SIZE)?;
            self.ratio_adapt()?;
            self.settings.thin = saved_thin;
        }

        // Burn-in: the iteration counter persists through checkpoints, so a
        // resumed chain never re-burns.
        let mut burned = self.settings.burnin.min(self.parameters.iteration());
        while burned < self.settings.burnin {
            let m = (self.settings.burnin - burned).min(self.settings.output_buffer_size as u64);
            let rates = self.do_sample(m as usize, false)?;
            self.parameters.set_acceptance_rates(&rates)?;
            self.current_samples.clear();
            burned += m;
            self.say(OutputLevel::Normal, || {
                format!("burn-in: {burned} of {}", self.settings.burnin)
            });
        }

        let mut completed = 0usize;
        while completed < n {
            let m = (n - completed).min(self.settings.output_buffer_size);
            let rates = self.do_sample(m, self.settings.compute_dic)?;
            self.parameters.set_acceptance_rates(&rates)?;
            self.queue.push(OutputRecord::posterior(
                self.current_samples.clone(),
                self.parameters.names().to_vec(),
            ));
            if self.settings.compute_dic {
                self.prepare_deviance();
            }
            self.current_samples.clear();
            completed += m;
            self.say(OutputLevel::Normal, || {
                format!(
                    "iteration {}: completed {completed} of {n}",
                    self.parameters.iteration()
                )
            });
            self.say(OutputLevel::Verbose, || {
                format!("current log likelihood {}", self.current_ll)
            });
        }

        if self.settings.compute_dic {
            self.finalize_dic();
        }
        if self.settings.save_resume_data {
            let checkpoint = self.serialize_all()?;
            self.queue.push(OutputRecord::resume_data(checkpoint));
        }
        Ok(())
    }

    /// One batch of `m` recorded sweeps. Returns the per-parameter
    /// acceptance rate over the `m * thin` proposals made for each.
    fn do_sample(&mut self, m: usize, save_deviance: bool) -> Result<RateMap> {
        let mut order: Vec<ParName> = self.parameters.active_names().to_vec();
        order.shuffle(&mut self.rng);

        let mut accepted: BTreeMap<ParName, u64> =
            order.iter().map(|n| (n.clone(), 0)).collect();
        let thin = self.settings.thin;

        self.current_samples.reserve(m);
        for _ in 0..m {
            for _ in 0..thin {
                for name in &order {
                    let hit = self.propose_and_select(name)?;
                    if let Some(count) = accepted.get_mut(name) {
                        *count += hit;
                    }
                }
            }
            self.parameters.increment(1);
            self.current_samples.push(self.parameters.current_state().clone());
            if save_deviance {
                self.sample_deviance.push((-2.0 * self.current_ll, 1));
            }
            self.say(OutputLevel::ExtraVerbose, || {
                let state = self
                    .parameters
                    .names()
                    .iter()
                    .filter_map(|n| self.parameters.current_state().get(n))
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("state: {state}")
            });
        }

        let proposals = (m as f64) * f64::from(thin);
        Ok(accepted
            .into_iter()
            .map(|(name, hits)| (name, hits as f64 / proposals))
            .collect())
    }

    /// Gaussian random-walk proposal for one parameter; returns 1 on
    /// acceptance. A rejected proposal leaves every piece of state exactly
    /// as it was.
    fn propose_and_select(&mut self, name: &str) -> Result<u64> {
        let scale = self.parameters.sampler_variance(name)?;
        let step = Normal::new(0.0, scale)
            .map_err(|e| Error::InvalidConfig(format!("proposal scale for `{name}`: {e}")))?;
        let current_value = self.parameters.value(name)?;
        let candidate = current_value + step.sample(&mut self.rng);

        let mut trial = self.parameters.current_state().clone();
        trial.insert(name.to_string(), candidate);
        let trial_ll = self.likelihood.log_likelihood(&trial);
        let trial_posterior = trial_ll + self.likelihood.log_prior(name, candidate)?;
        let current_posterior = self.current_ll + self.likelihood.log_prior(name, current_value)?;

        let mut acceptance = (trial_posterior - current_posterior).exp();
        if acceptance.is_nan() {
            acceptance = 0.0;
        }
        let draw: f64 = self.rng.random();
        if draw < acceptance {
            self.parameters.update(name, candidate)?;
            self.current_ll = trial_ll;
            self.current_posterior = trial_posterior;
            Ok(1)
        } else {
            Ok(0)
        }
    }

    /// Stage one of adaptation: observe acceptance at Gamma-drawn trial
    /// variances, regress acceptance on variance (or log variance,
    /// whichever correlates more strongly), and jump to the variance the
    /// fit predicts for the optimal acceptance rate.
    fn regression_adapt(&mut self, steps: usize, step_size: usize) -> Result<()> {
        self.say(OutputLevel::Normal, || "regression adaptation".to_string());
        let active = self.parameters.active_names().to_vec();
        if active.is_empty() {
            return Ok(());
        }
        let trial_variance = Gamma::new(ADAPT_GAMMA_SHAPE, ADAPT_GAMMA_SCALE)
            .map_err(|e| Error::InvalidConfig(format!("adaptation gamma: {e}")))?;

        let mut variances: BTreeMap<ParName, Vec<f64>> =
            active.iter().map(|n| (n.clone(), Vec::with_capacity(steps))).collect();
        let mut acceptances = variances.clone();

        for _ in 0..steps {
            let rates = self.do_sample(step_size, false)?;
            self.parameters.set_acceptance_rates(&rates)?;
            self.current_samples.clear();
            for name in &active {
                let variance = self.parameters.sampler_variance(name)?;
                if let (Some(vs), Some(accs)) =
                    (variances.get_mut(name), acceptances.get_mut(name))
                {
                    vs.push(variance);
                    accs.push(rates.get(name).copied().unwrap_or(0.0));
                }
                let next: f64 = trial_variance.sample(&mut self.rng);
                self.parameters.set_sampler_variance(name, next)?;
            }
        }

        let optimal = self.parameters.optimal_acceptance_rate();
        for name in &active {
            let (Some(vars), Some(accs)) = (variances.get(name), acceptances.get(name)) else {
                continue;
            };
            let log_vars: Vec<f64> = vars.iter().map(|v| v.ln()).collect();
            let corr_linear = pearson(vars, accs);
            let corr_log = pearson(&log_vars, accs);
            let use_log = match (corr_linear, corr_log) {
                (Some(lin), Some(log)) => log.abs() > lin.abs(),
                (None, Some(_)) => true,
                _ => false,
            };
            let xs = if use_log { &log_vars } else { vars };
            let solved = LinearFit::fit(xs, accs).and_then(|fit| fit.solve_for(optimal));
            if let Some(x) = solved {
                let variance = if use_log { x.exp() } else { x };
                if variance.is_finite() {
                    self.parameters.set_sampler_variance(name, variance)?;
                }
            }
        }
        if self.settings.output_level >= OutputLevel::Talkative {
            self.parameters.print_adaptation(true);
        }
        Ok(())
    }

    /// Stage two of adaptation: multiplicative variance updates until every
    /// active acceptance rate lands in the target interval. Bounded by the
    /// loop limits; if the chain still is not adapted at the cap it
    /// proceeds with whatever variances it reached. Ends with a parameter
    /// reset, so adaptation never contaminates the chain.
    fn ratio_adapt(&mut self) -> Result<()> {
        self.say(OutputLevel::Normal, || "ratio adaptation".to_string());
        let active = self.parameters.active_names().to_vec();
        let optimal = self.parameters.optimal_acceptance_rate();

        for loop_count in 1..=self.settings.max_adaptation_loops {
            let rates = self.do_sample(self.settings.adaptation_sample_size, false)?;
            self.parameters.set_acceptance_rates(&rates)?;
            self.current_samples.clear();

            for name in &active {
                let mut rate = rates.get(name).copied().unwrap_or(0.0);
                if rate == 0.0 {
                    rate = 0.01;
                }
                let variance = self.parameters.sampler_variance(name)?;
                self.parameters.set_sampler_variance(name, variance * rate / optimal)?;
            }

            self.say(OutputLevel::Normal, || {
                format!("adaptation loop {loop_count}")
            });
            if self.settings.output_level >= OutputLevel::Talkative {
                self.parameters.print_adaptation(true);
            }

            if loop_count >= self.settings.min_adaptation_loops && self.parameters.adapted() {
                break;
            }
            if loop_count == self.settings.max_adaptation_loops {
                warn!(
                    "not adapted after {} loops; continuing with current proposal variances",
                    self.settings.max_adaptation_loops
                );
            }
        }
        self.parameters.reset();
        Ok(())
    }

    /// Fold the batch into the running deviance mean and the running
    /// posterior mean of the parameters.
    fn prepare_deviance(&mut self) {
        if !self.dbar.is_empty() {
            self.sample_deviance.push((self.dbar.mean, self.dbar.count));
        }
        self.dbar = weighted_mean(&self.sample_deviance);

        let batch = self.current_samples.len() as u64;
        if batch > 0 {
            for name in self.parameters.names() {
                let batch_mean = self
                    .current_samples
                    .iter()
                    .filter_map(|s| s.get(name))
                    .sum::<f64>()
                    / batch as f64;
                let previous = WeightedMean::new(
                    self.theta_bar.get(name).copied().unwrap_or(0.0),
                    self.theta_bar_count,
                );
                let merged = previous.merge(WeightedMean::new(batch_mean, batch));
                self.theta_bar.insert(name.clone(), merged.mean);
            }
            self.theta_bar_count += batch;
        }
        self.sample_deviance.clear();
    }

    /// DIC = D(theta-bar) + 2 pD, with pD = DBar - D(theta-bar).
    fn finalize_dic(&mut self) {
        if self.theta_bar_count == 0 {
            warn!("DIC requested but no posterior batches were accumulated");
            return;
        }
        let d_theta_bar = -2.0 * self.likelihood.log_likelihood(&self.theta_bar);
        let p_d = self.dbar.mean - d_theta_bar;
        let dic = d_theta_bar + 2.0 * p_d;
        self.queue.push(OutputRecord::dic(format!(
            "pD: {p_d}\nMean deviance (d-bar): {}\nDeviance of mean (d(theta-bar)): {d_theta_bar}\nDIC: {dic}\n",
            self.dbar.mean
        )));
    }

    /// The full checkpoint: four named brace-delimited blocks.
    pub fn serialize_all(&self) -> Result<String> {
        let sep = ' ';
        let mut out = String::new();
        out.push_str("Metropolis\n{\n");
        out.push_str(&self.serialize_engine(sep));
        out.push_str("}\nLikelihood\n{\n");
        out.push_str(&self.likelihood.serialize(sep, self.parameters.names())?);
        out.push_str("}\nParameters\n{\n");
        out.push_str(&self.parameters.serialize(sep));
        out.push_str("}\nOutputOptions\n{\n");
        out.push_str(&self.options.serialize(sep));
        out.push_str("}\n");
        Ok(out)
    }

    fn serialize_engine(&self, sep: char) -> String {
        let mut out = String::new();
        out.push_str(&format!("version{sep}{ENGINE_VERSION}\n"));
        out.push_str(&format!("outputBufferSize{sep}{}\n", self.settings.output_buffer_size));
        out.push_str(&format!("thinSize{sep}{}\n", self.settings.thin));
        out.push_str(&format!("burnin{sep}{}\n", self.settings.burnin));
        out.push_str(&format!(
            "adaptationSampleSize{sep}{}\n",
            self.settings.adaptation_sample_size
        ));
        out.push_str(&format!("minAdaptationLoops{sep}{}\n", self.settings.min_adaptation_loops));
        out.push_str(&format!("maxAdaptationLoops{sep}{}\n", self.settings.max_adaptation_loops));
        out.push_str(&format!("rngSetSeed{sep}{}\n", i32::from(self.rng_set_seed)));
        out.push_str(&format!("rngSeed{sep}{}\n", self.rng_seed));
        out.push_str(&format!("rngStreamPos{sep}{}\n", self.rng.get_word_pos()));
        out.push_str(&format!("outputLevel{sep}{}\n", self.settings.output_level.as_int()));
        out.push_str(&format!("currentPosteriorProb{sep}{}\n", self.current_posterior));
        out.push_str(&format!("currentLL{sep}{}\n", self.current_ll));
        out.push_str(&format!("computeDIC{sep}{}\n", i32::from(self.settings.compute_dic)));
        out.push_str(&format!("DBar{sep}{}{sep}{}\n", self.dbar.mean, self.dbar.count));
        for name in self.parameters.names() {
            let value = self.theta_bar.get(name).copied().unwrap_or(0.0);
            out.push_str(&format!("thetaBar_{name}{sep}{value}\n"));
        }
        out.push_str(&format!("thetaBar_sampSize{sep}{}\n", self.theta_bar_count));
        out
    }

    fn say(&self, level: OutputLevel, message: impl FnOnce() -> String) {
        if self.settings.output_level >= level {
            info!("{}", message());
        }
    }
}

fn parse_resume<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::ResumeCorrupt(format!("cannot parse `{raw}` under key `{key}`")))
}
