//! Command-line entry point: load inputs, wire the sampler to the writer
//! thread, run, drain.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use stm_common::{Error, OutputLevel, PrevalenceModel, Result};
use stm_core::engine::{EngineSettings, Metropolis};
use stm_core::likelihood::Likelihood;
use stm_core::model::{ModelVariant, TransitionModel};
use stm_core::output::{OutputMethod, OutputOptions, OutputQueue, OutputWorker};
use stm_core::{input, logging};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelArg {
    TwoState,
    FourState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PrevalenceArg {
    Empirical,
    Stm,
    Global,
}

impl From<PrevalenceArg> for PrevalenceModel {
    fn from(arg: PrevalenceArg) -> Self {
        match arg {
            PrevalenceArg::Empirical => PrevalenceModel::Empirical,
            PrevalenceArg::Stm => PrevalenceModel::Stm,
            PrevalenceArg::Global => PrevalenceModel::Global,
        }
    }
}

/// Adaptive MCMC sampler for landscape state-transition models.
#[derive(Parser)]
#[command(name = "stm-core", version, about)]
struct Cli {
    /// Parameter file: name, initialValue, priorMean, priorSD, priorDist
    #[arg(short = 'p', long, default_value = "inp/inits.txt")]
    parameter_file: PathBuf,

    /// Transition data file
    #[arg(short = 't', long, default_value = "inp/trans.txt")]
    transition_file: PathBuf,

    /// Output directory (ignored with --stdout)
    #[arg(short = 'o', long, default_value = "output")]
    output_dir: PathBuf,

    /// Thinning interval
    #[arg(short = 'n', long, default_value_t = 1)]
    thin: u32,

    /// Number of burn-in samples
    #[arg(short = 'b', long, default_value_t = 0)]
    burnin: u64,

    /// Number of MCMC iterations (after adaptation and burn-in)
    #[arg(short = 'i', long, default_value_t = 100)]
    iterations: usize,

    /// Worker threads for the likelihood
    #[arg(short = 'c', long, default_value_t = stm_core::likelihood::DEFAULT_THREADS)]
    threads: usize,

    /// Target transition interval in years for the fitted parameters
    #[arg(short = 'l', long, default_value_t = 1)]
    target_interval: u32,

    /// Verbosity: 0 quiet, 1 normal, 2 acceptance tables, 3 likelihoods,
    /// 4 parameter values
    #[arg(short = 'v', long, default_value_t = 1)]
    verbosity: i64,

    /// Resume from a checkpoint; the transition file must still be supplied,
    /// and -p, -o, -n, -b, -c, and -v are read from the checkpoint instead
    #[arg(short = 'r', long)]
    resume: Option<PathBuf>,

    /// Write output to stdout instead of CSV files
    #[arg(short = 's', long)]
    stdout: bool,

    /// Model variant
    #[arg(long, value_enum, default_value_t = ModelArg::TwoState)]
    model: ModelArg,

    /// Add cubic environment terms to the two-state rate polynomials
    #[arg(long)]
    cubic: bool,

    /// Where expected prevalences come from
    #[arg(long, value_enum, default_value_t = PrevalenceArg::Empirical)]
    prevalence: PrevalenceArg,

    /// Fix the RNG seed for a reproducible chain
    #[arg(long, env = "STM_SEED")]
    seed: Option<u64>,

    /// Accumulate and report DIC
    #[arg(long)]
    dic: bool,

    /// Write a resume checkpoint when the run completes
    #[arg(long)]
    save_resume: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let level = OutputLevel::from_int(cli.verbosity)
        .ok_or_else(|| Error::InvalidConfig(format!("verbosity must be 0..=4, got {}", cli.verbosity)))?;
    logging::init_logging(level);

    let variant = match cli.model {
        ModelArg::TwoState => ModelVariant::TwoState { cubic: cli.cubic },
        ModelArg::FourState => ModelVariant::FourState,
    };
    let model = TransitionModel::new(variant);
    let queue = Arc::new(OutputQueue::new());

    if let Some(resume_path) = &cli.resume {
        let blocks = input::read_resume(resume_path)?;
        let likelihood_block = blocks
            .get("Likelihood")
            .ok_or_else(|| Error::ResumeCorrupt("missing `Likelihood` block".into()))?;
        let parameters_block = blocks
            .get("Parameters")
            .ok_or_else(|| Error::ResumeCorrupt("missing `Parameters` block".into()))?;
        let options_block = blocks
            .get("OutputOptions")
            .ok_or_else(|| Error::ResumeCorrupt("missing `OutputOptions` block".into()))?;

        let prevalence_tag: i64 = likelihood_block.scalar("prevalenceModel")?;
        let prevalence = PrevalenceModel::from_int(prevalence_tag)
            .ok_or_else(|| Error::ResumeCorrupt(format!("unknown prevalence model {prevalence_tag}")))?;
        let transitions = input::read_transitions(&cli.transition_file, &model, prevalence)?;
        info!("loaded {} transitions", transitions.len());

        let par_names = parameters_block.strings("parNames")?.to_vec();
        let mut likelihood =
            Likelihood::from_resume(likelihood_block, &par_names, model, transitions)?;
        let options = OutputOptions::from_resume(options_block)?;
        let engine = Metropolis::from_resume(&blocks, &mut likelihood, Arc::clone(&queue))?;
        info!("engine resumed from {}", resume_path.display());
        drive(engine, queue, options, cli.iterations)
    } else {
        let (inits, priors) = input::read_parameters(&cli.parameter_file)?;
        info!("read {} parameters", inits.len());
        let prevalence = cli.prevalence.into();
        let transitions = input::read_transitions(&cli.transition_file, &model, prevalence)?;
        info!("loaded {} transitions", transitions.len());

        let mut likelihood = Likelihood::new(
            model,
            transitions,
            cli.transition_file.display().to_string(),
            priors,
            cli.threads,
            cli.target_interval,
            prevalence,
        )?;
        let method = if cli.stdout { OutputMethod::Stdout } else { OutputMethod::Csv };
        let options = OutputOptions::new(&cli.output_dir, method);
        let settings = EngineSettings {
            thin: cli.thin,
            burnin: cli.burnin,
            seed: cli.seed,
            compute_dic: cli.dic,
            output_level: level,
            save_resume_data: cli.save_resume,
            ..EngineSettings::default()
        };
        let engine = Metropolis::new(
            inits,
            &mut likelihood,
            Arc::clone(&queue),
            options.clone(),
            settings,
        )?;
        info!("engine started");
        drive(engine, queue, options, cli.iterations)
    }
}

/// Run the engine with the writer draining the queue in the background.
fn drive(
    mut engine: Metropolis<'_>,
    queue: Arc<OutputQueue>,
    options: OutputOptions,
    iterations: usize,
) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let worker = OutputWorker::new(Arc::clone(&queue), Arc::clone(&stop), options);
    let handle = thread::spawn(move || worker.run());

    let result = engine.run_sampler(iterations);

    stop.store(true, Ordering::Release);
    if handle.join().is_err() {
        warn!("output worker exited abnormally");
    }
    result
}
