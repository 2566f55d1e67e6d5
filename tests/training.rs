//! End-to-end training on small tabular models.
use mdpo_lfa::actors::MdpoConfig;
use mdpo_lfa::config::{
    ActorConfig, ConfigError, CriticConfig, EnvName, ExperimentConfig, SamplingConfig,
};
use mdpo_lfa::envs::{BuildModel, TabularMdp, TabularModel, TwoStateMdp};
use mdpo_lfa::results::MemorySink;
use mdpo_lfa::training::TrainingRun;
use mdpo_lfa::{
    run_experiment, train_run, CriticAlgorithm, EtaSchedule, SamplingMode, TileCodingConfig,
};
use rstest::{fixture, rstest};

#[fixture]
fn model() -> TabularMdp {
    TwoStateMdp::default().build_model().unwrap()
}

#[fixture]
fn config() -> ExperimentConfig {
    ExperimentConfig {
        env: EnvName::CliffWorld,
        num_iterations: 50,
        num_runs: 4,
        base_seed: 42,
        eta: EtaSchedule::new(1.0),
        critic: CriticConfig {
            algorithm: CriticAlgorithm::Td,
            tiles: TileCodingConfig::new(4, 1, 2),
        },
        actor: ActorConfig {
            tiles: TileCodingConfig::new(4, 1, 2),
            init_stddev: 0.1,
            mdpo: MdpoConfig {
                max_inner_iters: 200,
                max_step_size: 10.0,
                ..MdpoConfig::default()
            },
        },
        sampling: SamplingConfig::default(),
        num_threads: 1,
    }
}

#[rstest]
#[case(CriticAlgorithm::Td)]
#[case(CriticAlgorithm::AdvantageTd)]
fn two_state_policy_improves(
    model: TabularMdp,
    config: ExperimentConfig,
    #[case] algorithm: CriticAlgorithm,
) {
    let mut config = config;
    config.critic.algorithm = algorithm;
    let mut run = TrainingRun::new(&config, &model, 1).unwrap();
    let mut returns = Vec::new();
    for _ in 0..config.num_iterations {
        returns.push(run.step().unwrap().j);
    }
    let head = returns[..10].iter().sum::<f64>() / 10.0;
    let tail = returns[returns.len() - 10..].iter().sum::<f64>() / 10.0;
    assert!(tail > head, "{} <= {}", tail, head);

    // Moving out of state 0 and staying in state 1 are optimal
    let policy = run.actor().current_policy();
    assert!(policy[(0, 1)] > policy[(0, 0)], "{}", policy);
    assert!(policy[(1, 0)] > policy[(1, 1)], "{}", policy);
    for row in policy.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
        assert!(row.iter().all(|p| *p > 0.0));
    }
}

#[rstest]
fn runs_are_deterministic(model: TabularMdp, config: ExperimentConfig) {
    let first = run_experiment(&config, &model, &mut (), &mut ()).unwrap();
    let second = run_experiment(&config, &model, &mut (), &mut ()).unwrap();
    assert_eq!(first, second);
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(8)]
fn thread_count_does_not_change_results(
    model: TabularMdp,
    config: ExperimentConfig,
    #[case] num_threads: usize,
) {
    let mut serial_sink = MemorySink::new();
    let serial = run_experiment(&config, &model, &mut serial_sink, &mut ()).unwrap();
    let mut parallel_sink = MemorySink::new();
    let parallel_config = ExperimentConfig {
        num_threads,
        ..config
    };
    let parallel = run_experiment(&parallel_config, &model, &mut parallel_sink, &mut ()).unwrap();
    assert_eq!(serial, parallel);
    assert_eq!(serial_sink, parallel_sink);
}

#[rstest]
fn monte_carlo_targets_are_deterministic(model: TabularMdp, config: ExperimentConfig) {
    let mut config = config;
    config.num_iterations = 10;
    config.sampling = SamplingConfig {
        mode: SamplingMode::MonteCarlo,
        rollouts: 20,
        horizon: 30,
    };
    let a = train_run(&config, &model, 3, &mut ()).unwrap();
    let b = train_run(&config, &model, 3, &mut ()).unwrap();
    assert_eq!(a, b);
    // Sampled targets are noisy
    assert!(a.td_error.iter().any(|e| *e > 0.0));
    assert!(a.td_error.iter().all(|e| e.is_finite()));
}

#[rstest]
#[case(CriticAlgorithm::Td)]
#[case(CriticAlgorithm::AdvantageTd)]
fn colliding_critic_features_stay_finite(
    model: TabularMdp,
    config: ExperimentConfig,
    #[case] algorithm: CriticAlgorithm,
) {
    let mut config = config;
    config.critic = CriticConfig {
        algorithm,
        tiles: TileCodingConfig::new(2, 3, 4),
    };
    let history = train_run(&config, &model, 1, &mut ()).unwrap();
    assert!(history.j.iter().all(|j| j.is_finite()));
    assert!(history.td_error.iter().all(|e| e.is_finite()));
}

#[rstest]
#[case(EnvName::CliffWorld, 50)]
#[case(EnvName::CliffWorld, 100)]
#[case(EnvName::FrozenLake, 40)]
#[case(EnvName::FrozenLake, 60)]
fn presets_take_a_step(#[case] env: EnvName, #[case] dim: usize) {
    let mut config = ExperimentConfig::preset(env, dim).unwrap();
    config.actor.mdpo.max_inner_iters = 20;
    let model = env.build().unwrap();
    let mut run = TrainingRun::new(&config, &model, 1).unwrap();
    let stats = run.step().unwrap();
    assert!(stats.j.is_finite());
    assert!(stats.td_error.is_finite());
    assert_eq!(stats.eta, 0.01);
    assert_eq!(run.critic().weights().len(), dim);
    assert_eq!(
        run.actor().current_policy().dim(),
        (model.num_states(), model.num_actions())
    );
}

#[rstest]
#[case(EnvName::CliffWorld, 70)]
#[case(EnvName::FrozenLake, 80)]
fn unsupported_preset_fails(#[case] env: EnvName, #[case] dim: usize) {
    assert_eq!(
        ExperimentConfig::preset(env, dim),
        Err(ConfigError::UnsupportedCriticDimension { env, dim })
    );
}

#[test]
fn unknown_names_are_rejected() {
    assert!("Grid".parse::<EnvName>().is_err());
    assert!("LSTD".parse::<CriticAlgorithm>().is_err());
    assert!("TD".parse::<SamplingMode>().is_err());
}
