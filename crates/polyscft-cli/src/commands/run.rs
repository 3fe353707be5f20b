use crate::cli::RunArgs;
use crate::config::{PartialRunConfig, RunConfig};
use crate::error::{CliError, Result};
use crate::output::{FieldCheckpoint, FieldSnapshot, checkpoint_path};
use crate::utils::progress::CliProgressHandler;
use polyscft::{
    core::spectral::RustFftTransform,
    engine::{
        anderson::AndersonMixing,
        progress::{Progress, ProgressReporter},
        propagator::PropagatorSolver,
    },
    workflows::{langevin, saddle_point},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

/// Random Gaussian fields with zero mean, as the starting point of a run.
fn initial_fields(config: &RunConfig) -> Result<(Vec<f64>, Vec<f64>)> {
    let sim_box = &config.sim_box;
    let sigma = langevin::noise_sigma(sim_box, config.langevin.dt, config.langevin.nbar);
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| CliError::Config(format!("Invalid initial field amplitude: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(config.langevin.seed.wrapping_add(1));

    let mut w_plus: Vec<f64> = (0..sim_box.grid_size())
        .map(|_| normal.sample(&mut rng))
        .collect();
    let mut w_minus: Vec<f64> = (0..sim_box.grid_size())
        .map(|_| normal.sample(&mut rng))
        .collect();
    sim_box.zero_mean(&mut w_plus);
    sim_box.zero_mean(&mut w_minus);
    Ok((w_plus, w_minus))
}

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = PartialRunConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let sim_box = &config.sim_box;
    let chain = &config.chain;
    info!(
        nx = ?sim_box.nx(),
        lx = ?sim_box.lx(),
        volume = sim_box.volume(),
        f = chain.f(),
        n_segment = chain.n_segment(),
        chi_n = chain.chi_n(),
        model = %chain.model(),
        "Simulation set up."
    );

    let mut solver = PropagatorSolver::with_options(
        sim_box,
        chain,
        RustFftTransform::new(sim_box.nx()),
        config.solver,
    )?;
    let mut mixer = AndersonMixing::new(sim_box, config.anderson.clone())?;
    let (mut w_plus, mut w_minus) = initial_fields(&config)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let langevin_steps = config.langevin.max_steps;
    let mut neg_log_partitions = Vec::new();
    let last = if langevin_steps == 0 {
        println!("Searching for the saddle point...");
        reporter.report(Progress::PhaseStart {
            name: "Saddle-point search",
        });
        let result = saddle_point::run(
            &mut solver,
            &mut mixer,
            &mut w_plus,
            &w_minus,
            &config.saddle,
            &reporter,
        )?;
        reporter.report(Progress::PhaseFinish);
        result
    } else {
        println!(
            "Running {} Langevin step(s) with the {} scheme...",
            langevin_steps, config.langevin.scheme
        );
        let result = langevin::run(
            &mut solver,
            &mut mixer,
            &mut w_plus,
            &mut w_minus,
            &config.saddle,
            &config.langevin,
            &reporter,
        )?;
        if result.unconverged_searches > 0 {
            println!(
                "Warning: {} saddle-point search(es) stopped before reaching the tolerance.",
                result.unconverged_searches
            );
        }
        for snapshot in result.snapshots {
            let checkpoint = FieldCheckpoint {
                step: snapshot.step,
                nx: sim_box.nx(),
                lx: sim_box.lx(),
                n_segment: chain.n_segment(),
                f: chain.f(),
                chi_n: chain.chi_n(),
                chain_model: chain.model().to_string(),
                nbar: config.langevin.nbar,
                seed: config.langevin.seed,
                w_plus: snapshot.w_plus,
                w_minus: snapshot.w_minus,
            };
            checkpoint.write_to(&checkpoint_path(&config.output, snapshot.step))?;
        }
        neg_log_partitions = result.neg_log_partitions;
        result.last_saddle
    };

    if !last.converged {
        warn!(
            error_level = last.error_level,
            "Final fields are not at the saddle point."
        );
        println!(
            "Warning: saddle-point search did not converge (error level {:.3e}).",
            last.error_level
        );
    }

    let snapshot = FieldSnapshot {
        nx: sim_box.nx(),
        lx: sim_box.lx(),
        n_segment: chain.n_segment(),
        f: chain.f(),
        chi_n: chain.chi_n(),
        chain_model: chain.model().to_string(),
        seed: config.langevin.seed,
        langevin_steps,
        langevin_scheme: config.langevin.scheme.to_string(),
        converged: last.converged,
        partition_function: last.partition_function,
        hamiltonian: last.hamiltonian,
        neg_log_partitions,
        w_plus,
        w_minus,
        phi_a: last.phi_a,
        phi_b: last.phi_b,
    };
    snapshot.write_to(&config.output)?;

    println!(
        "✓ Final fields (H = {:.9}, Q/V = {:.7e}) written to: {}",
        last.hamiltonian,
        last.partition_function / sim_box.volume(),
        config.output.display()
    );
    Ok(())
}
