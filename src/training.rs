//! Actor-critic training loop
use crate::actors::{InnerSolve, SoftmaxLinearActor};
use crate::config::{ConfigError, ExperimentConfig};
use crate::critics::LinearTdCritic;
use crate::envs::{EnvError, SimulatedModel};
use crate::error::Error;
use crate::features::{FeatureMatrix, TileCoder};
use crate::logging::{LogError, StatsLogger};
use crate::results::ResultSink;
use crate::targets::TargetSource;
use crate::utils::stats::mean_confidence_interval;
use crate::Prng;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use std::panic;

/// Confidence level of the cross-run interval on the expected return.
pub const CONFIDENCE: f64 = 0.95;

/// Diagnostic sequences of one training run, one entry per outer iteration.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunHistory {
    /// Expected return `J` of the policy at the start of each iteration.
    pub j: Vec<f64>,
    /// Frobenius norm of the difference between the true and estimated advantage.
    pub td_error: Vec<f64>,
}

/// Statistics of a single outer iteration.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IterationStats {
    pub iteration: u64,
    /// Divergence coefficient used for the policy update.
    pub eta: f64,
    pub j: f64,
    pub td_error: f64,
    pub solve: InnerSolve,
    /// Ridge coefficient needed by the critic fit.
    pub critic_ridge: f64,
}

impl IterationStats {
    /// Log as one group, with the iteration counter last.
    pub fn log<L: StatsLogger + ?Sized>(&self, logger: &mut L) -> Result<(), LogError> {
        logger.group_start();
        let result = self.log_values(logger);
        logger.group_end();
        result
    }

    fn log_values<L: StatsLogger + ?Sized>(&self, logger: &mut L) -> Result<(), LogError> {
        logger.log_scalar("J", self.j)?;
        logger.log_scalar("td_error", self.td_error)?;
        logger.log_scalar("eta", self.eta)?;
        // Iteration counts are far below 2^52
        logger.log_scalar("actor/inner_iters", self.solve.iterations as f64)?;
        logger.log_scalar("actor/grad_norm", self.solve.grad_norm)?;
        logger.log_scalar(
            "actor/objective_gain",
            self.solve.objective_end - self.solve.objective_start,
        )?;
        logger.log_message("actor/termination", self.solve.termination.as_str())?;
        logger.log_scalar("critic/ridge", self.critic_ridge)?;
        logger.log_counter_increment("iteration", 1)
    }
}

/// Seed of a run's random number generator.
pub const fn run_seed(base_seed: u64, run_index: u64) -> u64 {
    base_seed.wrapping_mul(run_index)
}

/// State of one training run.
///
/// Owns the actor, the critic (each with its own tile coder) and the critic target source.
pub struct TrainingRun<'a, M: ?Sized> {
    config: &'a ExperimentConfig,
    model: &'a M,
    actor: SoftmaxLinearActor,
    critic: LinearTdCritic,
    target: Box<dyn TargetSource + 'a>,
    iteration: u64,
}

impl<'a, M: SimulatedModel + ?Sized> TrainingRun<'a, M> {
    /// Initialize a run.
    ///
    /// The run generator is seeded with `base_seed * run_index`. It draws the initial actor
    /// parameters from `Normal(0, init_stddev)` and then the seed of the Monte-Carlo sampler.
    ///
    /// # Errors
    /// If the configuration is invalid.
    pub fn new(
        config: &'a ExperimentConfig,
        model: &'a M,
        run_index: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut rng = Prng::seed_from_u64(run_seed(config.base_seed, run_index));

        let mut actor_coder = TileCoder::new(config.actor.tiles);
        let actor_features = FeatureMatrix::build(&mut actor_coder, model);
        let mut critic_coder = TileCoder::new(config.critic.tiles);
        let critic_features = FeatureMatrix::build(&mut critic_coder, model);

        let init = Normal::new(0.0, config.actor.init_stddev).map_err(|_| {
            ConfigError::InvalidOption {
                name: "actor_init_stddev",
                value: config.actor.init_stddev.to_string(),
            }
        })?;
        let theta: Array1<f64> = (&mut rng)
            .sample_iter(init)
            .take(actor_features.dim())
            .collect();
        let sampler_rng = Prng::seed_from_u64(rng.gen());

        Ok(Self {
            config,
            model,
            actor: SoftmaxLinearActor::new(
                actor_features,
                theta,
                config.eta.eta_at(0),
                config.actor.mdpo,
            ),
            critic: LinearTdCritic::new(config.critic.algorithm, critic_features),
            target: config.sampling.build_target(model, sampler_rng),
            iteration: 0,
        })
    }

    pub const fn actor(&self) -> &SoftmaxLinearActor {
        &self.actor
    }

    pub const fn critic(&self) -> &LinearTdCritic {
        &self.critic
    }

    /// Number of completed outer iterations.
    pub const fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Run one outer iteration.
    ///
    /// Evaluates the current policy exactly, fits the critic to the configured target,
    /// and updates the actor towards the estimated advantage.
    pub fn step(&mut self) -> Result<IterationStats, EnvError> {
        let eta = self.config.eta.eta_at(self.iteration);
        self.actor.set_eta(eta);

        let policy = self.actor.current_policy();
        let evaluation = self.model.evaluate_policy(policy.view())?;
        let q_sample = self.target.q_target(policy.view(), evaluation.q.view())?;
        let advantage = self.critic.advantage_estimate(
            q_sample.view(),
            policy.view(),
            evaluation.visitation.view(),
        );
        let td_error = frobenius_distance(&evaluation.advantage, &advantage);
        let solve = self
            .actor
            .update_policy_param(advantage.view(), evaluation.visitation.view());

        let stats = IterationStats {
            iteration: self.iteration,
            eta,
            j: evaluation.expected_return,
            td_error,
            solve,
            critic_ridge: self.critic.last_ridge(),
        };
        self.iteration += 1;
        Ok(stats)
    }
}

fn frobenius_distance(a: &Array2<f64>, b: &Array2<f64>) -> f64 {
    (a - b).mapv(|x| x * x).sum().sqrt()
}

/// Train one run for the configured number of iterations.
pub fn train_run<M, L>(
    config: &ExperimentConfig,
    model: &M,
    run_index: u64,
    logger: &mut L,
) -> Result<RunHistory, Error>
where
    M: SimulatedModel + ?Sized,
    L: StatsLogger + ?Sized,
{
    let mut run = TrainingRun::new(config, model, run_index)?;
    let capacity = usize::try_from(config.num_iterations).unwrap_or(0);
    let mut history = RunHistory {
        j: Vec::with_capacity(capacity),
        td_error: Vec::with_capacity(capacity),
    };
    for _ in 0..config.num_iterations {
        let stats = run.step()?;
        stats.log(logger)?;
        history.j.push(stats.j);
        history.td_error.push(stats.td_error);
    }
    Ok(history)
}

/// Results of all runs of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentResults {
    /// Run histories in run order.
    pub runs: Vec<RunHistory>,
    /// Mean of `J` across runs at each iteration.
    pub mean: Array1<f64>,
    /// Confidence interval half-width of the mean of `J` at each iteration.
    pub interval: Array1<f64>,
}

/// Run all independent runs of an experiment and persist the results.
///
/// With `num_threads > 1` runs execute concurrently on scoped threads and only the per-run
/// summaries reach `logger`. The results do not depend on the number of threads.
///
/// Saves `J` and `TD_error` of every run, then `mean` and `interval` of `J` across runs.
pub fn run_experiment<M, S, L>(
    config: &ExperimentConfig,
    model: &M,
    sink: &mut S,
    logger: &mut L,
) -> Result<ExperimentResults, Error>
where
    M: SimulatedModel + Sync + ?Sized,
    S: ResultSink + ?Sized,
    L: StatsLogger + ?Sized,
{
    config.validate()?;
    let runs = if config.num_threads > 1 && config.num_runs > 1 {
        let runs = train_parallel(config, model)?;
        for (run_index, history) in (0..).zip(&runs) {
            log_run_summary(run_index, history, logger)?;
        }
        runs
    } else {
        let mut runs = Vec::new();
        for run_index in 0..config.num_runs {
            let history = train_run(config, model, run_index, logger)?;
            log_run_summary(run_index, &history, logger)?;
            runs.push(history);
        }
        runs
    };
    logger.flush();

    for (run_index, history) in (0..).zip(&runs) {
        sink.save_run(run_index, "J", &history.j)?;
        sink.save_run(run_index, "TD_error", &history.td_error)?;
    }

    let num_iterations = runs.first().map_or(0, |h| h.j.len());
    let returns = Array2::from_shape_fn((runs.len(), num_iterations), |(i, t)| runs[i].j[t]);
    let (mean, interval) = mean_confidence_interval(returns.view(), CONFIDENCE);
    sink.save_summary("mean", &mean.to_vec())?;
    sink.save_summary("interval", &interval.to_vec())?;

    Ok(ExperimentResults {
        runs,
        mean,
        interval,
    })
}

fn log_run_summary<L: StatsLogger + ?Sized>(
    run_index: u64,
    history: &RunHistory,
    logger: &mut L,
) -> Result<(), LogError> {
    logger.group_start();
    let result = log_run_values(run_index, history, logger);
    logger.group_end();
    result
}

fn log_run_values<L: StatsLogger + ?Sized>(
    run_index: u64,
    history: &RunHistory,
    logger: &mut L,
) -> Result<(), LogError> {
    if let (Some(j), Some(td_error)) = (history.j.last(), history.td_error.last()) {
        logger.log_scalar("run/final_J", *j)?;
        logger.log_scalar("run/final_td_error", *td_error)?;
    }
    // Run indices are small
    logger.log_scalar("run/index", run_index as f64)
}

/// Train all runs on up to `num_threads` scoped threads; thread `k` takes runs `k, k + n, ...`.
fn train_parallel<M>(config: &ExperimentConfig, model: &M) -> Result<Vec<RunHistory>, Error>
where
    M: SimulatedModel + Sync + ?Sized,
{
    let num_runs = config.num_runs;
    let num_threads = config
        .num_threads
        .min(usize::try_from(num_runs).unwrap_or(usize::MAX));

    let outcome = crossbeam::scope(|scope| {
        let threads: Vec<_> = (0..num_threads)
            .map(|offset| {
                scope.spawn(move |_scope| {
                    (offset as u64..num_runs)
                        .step_by(num_threads)
                        .map(|run| (run, train_run(config, model, run, &mut ())))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        threads
            .into_iter()
            .map(|t| t.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
            .collect::<Vec<_>>()
    });
    let batches = outcome.unwrap_or_else(|payload| panic::resume_unwind(payload));

    let mut by_index: Vec<(u64, Result<RunHistory, Error>)> =
        batches.into_iter().flatten().collect();
    by_index.sort_by_key(|(run_index, _)| *run_index);
    by_index.into_iter().map(|(_, history)| history).collect()
}
