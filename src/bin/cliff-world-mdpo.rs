use mdpo_lfa::config::{EnvName, ExperimentConfig};
use mdpo_lfa::logging::{ByCounter, DisplayLogger};
use mdpo_lfa::results::DirectorySink;
use mdpo_lfa::run_experiment;
use std::error::Error;

const CRITIC_DIM: usize = 50;

fn main() -> Result<(), Box<dyn Error>> {
    let mut config = ExperimentConfig::preset(EnvName::CliffWorld, CRITIC_DIM)?;
    config.num_threads = num_cpus::get();

    let model = config.env.build()?;
    let mut sink = DirectorySink::new(format!(
        "results/{}/{}_{}_dim{}",
        config.env, config.critic.algorithm, config.sampling.mode, CRITIC_DIM
    ))?;
    sink.save_value("config", &config)?;

    let mut logger = DisplayLogger::new(ByCounter::default());
    let results = run_experiment(&config, &model, &mut sink, &mut logger)?;
    if let (Some(mean), Some(interval)) = (results.mean.last(), results.interval.last()) {
        println!("final J: {:.4} +- {:.4}", mean, interval);
    }
    Ok(())
}
