//! Log-likelihood aggregation over the transition data, plus prior
//! evaluation for single parameters.

use crate::input::SerializationData;
use crate::model::TransitionModel;
use crate::transition::Transition;
use rayon::prelude::*;
use std::collections::BTreeMap;
use stm_common::{Error, ParMap, ParName, PrevalenceModel, PriorDist, PriorFamily, Result};
use stm_math::{log_cauchy_pdf, log_normal_pdf};
use tracing::warn;

pub const DEFAULT_THREADS: usize = 8;

/// Owns the transition data and priors; sums per-transition log
/// probabilities on its own worker pool.
pub struct Likelihood {
    model: TransitionModel,
    transitions: Vec<Transition>,
    priors: BTreeMap<ParName, PriorDist>,
    transition_file: String,
    threads: usize,
    target_interval: u32,
    prevalence_model: PrevalenceModel,
    pool: rayon::ThreadPool,
    checked: bool,
}

impl Likelihood {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model: TransitionModel,
        transitions: Vec<Transition>,
        transition_file: impl Into<String>,
        priors: BTreeMap<ParName, PriorDist>,
        threads: usize,
        target_interval: u32,
        prevalence_model: PrevalenceModel,
    ) -> Result<Self> {
        if threads < 1 {
            return Err(Error::InvalidConfig("likelihood threads must be at least 1".into()));
        }
        if target_interval < 1 {
            return Err(Error::InvalidConfig("target interval must be at least 1".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot build worker pool: {e}")))?;
        Ok(Self {
            model,
            transitions,
            priors,
            transition_file: transition_file.into(),
            threads,
            target_interval,
            prevalence_model,
            pool,
            checked: false,
        })
    }

    /// Rebuild from the `Likelihood` resume block. The transitions are
    /// re-read from the transition file by the caller (they are not part of
    /// the resume data) and must already use the block's prevalence model.
    pub fn from_resume(
        sd: &SerializationData,
        par_names: &[ParName],
        model: TransitionModel,
        transitions: Vec<Transition>,
    ) -> Result<Self> {
        let transition_file: String = sd.scalar("transitionFileName")?;
        let threads: usize = sd.scalar("likelihoodThreads")?;
        let target_interval: u32 = sd.scalar("targetInterval")?;
        let prevalence_model = PrevalenceModel::from_int(sd.scalar("prevalenceModel")?)
            .ok_or_else(|| Error::ResumeCorrupt("unknown prevalence model tag".into()))?;

        let means: Vec<f64> = sd.vector("priorMeans")?;
        let sds: Vec<f64> = sd.vector("priorSD")?;
        let families: Vec<i64> = sd.vector("priorFamily")?;
        if means.len() != par_names.len()
            || sds.len() != par_names.len()
            || families.len() != par_names.len()
        {
            return Err(Error::ResumeCorrupt(format!(
                "prior vectors do not cover {} parameters",
                par_names.len()
            )));
        }
        let mut priors = BTreeMap::new();
        for (i, name) in par_names.iter().enumerate() {
            let family = PriorFamily::from_int(families[i])
                .ok_or_else(|| Error::ResumeCorrupt(format!("unknown prior family {}", families[i])))?;
            priors.insert(name.clone(), PriorDist::new(means[i], sds[i], family));
        }

        Self::new(
            model,
            transitions,
            transition_file,
            priors,
            threads,
            target_interval,
            prevalence_model,
        )
    }

    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    pub fn target_interval(&self) -> u32 {
        self.target_interval
    }

    pub fn prevalence_model(&self) -> PrevalenceModel {
        self.prevalence_model
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// Sum of `ln P(final | initial, params)` over the transition data.
    ///
    /// The first call screens the data: any transition whose log probability
    /// is non-finite under the supplied parameters is dropped with a
    /// warning, and never re-enters the sum. The reduction runs on the
    /// worker pool but folds per-chunk partial sums in index order, so the
    /// result does not depend on scheduling.
    pub fn log_likelihood(&mut self, params: &ParMap) -> f64 {
        if !self.checked {
            self.self_check(params);
        }
        if self.transitions.is_empty() {
            return 0.0;
        }
        let chunk = (self.transitions.len() / (self.threads * 4)).max(1);
        let transitions = &self.transitions;
        let model = &self.model;
        let target = self.target_interval;
        let partials: Vec<f64> = self.pool.install(|| {
            transitions
                .par_chunks(chunk)
                .map(|block| {
                    block
                        .iter()
                        .map(|t| t.prob(model, params, target).ln())
                        .sum::<f64>()
                })
                .collect()
        });
        partials.into_iter().sum()
    }

    /// Log prior density of one (name, value) pair.
    pub fn log_prior(&self, name: &str, value: f64) -> Result<f64> {
        let prior = self
            .priors
            .get(name)
            .ok_or_else(|| Error::Parameter(format!("no prior for parameter `{name}`")))?;
        Ok(match prior.family {
            PriorFamily::Normal => log_normal_pdf(value, prior.mean, prior.sd),
            PriorFamily::Cauchy => log_cauchy_pdf(value, prior.mean, prior.sd),
        })
    }

    /// The `Likelihood` block of the resume format.
    pub fn serialize(&self, sep: char, par_names: &[ParName]) -> Result<String> {
        let mut out = String::new();
        out.push_str(&format!("transitionFileName{sep}{}\n", self.transition_file));
        out.push_str(&format!("likelihoodThreads{sep}{}\n", self.threads));
        out.push_str(&format!("targetInterval{sep}{}\n", self.target_interval));
        out.push_str(&format!(
            "prevalenceModel{sep}{}\n",
            self.prevalence_model.as_int()
        ));

        let mut means = String::from("priorMeans");
        let mut sds = String::from("priorSD");
        let mut families = String::from("priorFamily");
        for name in par_names {
            let prior = self
                .priors
                .get(name)
                .ok_or_else(|| Error::Parameter(format!("no prior for parameter `{name}`")))?;
            means.push_str(&format!("{sep}{}", prior.mean));
            sds.push_str(&format!("{sep}{}", prior.sd));
            families.push_str(&format!("{sep}{}", prior.family.as_int()));
        }
        out.push_str(&means);
        out.push('\n');
        out.push_str(&sds);
        out.push('\n');
        out.push_str(&families);
        out.push('\n');
        Ok(out)
    }

    fn self_check(&mut self, params: &ParMap) {
        let model = self.model;
        let target = self.target_interval;
        let mut removed = 0usize;
        let mut line = 1usize; // data starts on line 2 of the file
        self.transitions.retain(|t| {
            line += 1;
            let keep = t.prob(&model, params, target).ln().is_finite();
            if !keep {
                warn!(
                    "non-finite log likelihood on initialization for transition data line {line}; \
                     removing it from the likelihood"
                );
                removed += 1;
            }
            keep
        });
        if removed > 0 {
            warn!("removed {removed} transitions during the initial screen");
        }
        self.checked = true;
    }
}
