use std::sync::Arc;

use clap::Parser;
use fluid_sim_core::{
    create_gpu_context_blocking, spawn, GpuSimulation, ScalarField, SimulationSettings,
    SmoothingKernel,
};

/// Fluid simulation demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "fluid-sim-demo")]
#[command(about = "Headless 2D SPH fluid simulation demo", long_about = None)]
struct Args {
    /// Number of particles (must be a power of two)
    #[arg(short, long, default_value_t = 4096)]
    particles: usize,

    /// Number of fixed time steps to simulate
    #[arg(short, long, default_value_t = 600)]
    steps: u32,

    /// Density kernel (spiky, soft)
    #[arg(short, long, default_value = "spiky")]
    kernel: String,

    /// Downward gravity
    #[arg(short, long, default_value_t = 9.8)]
    gravity: f32,

    /// Report interval in steps
    #[arg(short, long, default_value_t = 60)]
    report_interval: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let density_kernel = match args.kernel.as_str() {
        "spiky" => SmoothingKernel::Spiky,
        "soft" => SmoothingKernel::Soft,
        other => return Err(format!("unknown kernel '{other}' (spiky, soft)").into()),
    };
    let settings = SimulationSettings {
        gravity: args.gravity,
        density_kernel,
        selected_field: ScalarField::Density,
        ..SimulationSettings::default()
    };

    let context = Arc::new(create_gpu_context_blocking()?);
    println!("Adapter: {}", context.adapter_info().name);

    let mut rng = rand::rng();
    let positions = spawn::jittered_block(
        args.particles,
        settings.scene_size * 0.5,
        settings.smoothing_radius * 0.5,
        &mut rng,
    );
    let mut sim = GpuSimulation::new(context, settings, &positions)?;
    println!("Simulating {} particles for {} steps", args.particles, args.steps);

    for step in 0..args.steps {
        sim.advance();
        if step % args.report_interval.max(1) == 0 {
            let ranges = sim.read_ranges();
            println!(
                "step {step:>6}  density range [{:.3}, {:.3}]",
                ranges[0], ranges[1]
            );
        }
    }

    let velocities = sim.read_velocities();
    let max_speed = velocities
        .chunks(2)
        .map(|v| v[0].hypot(v[1]))
        .fold(0.0_f32, f32::max);
    println!("Done: {} steps, max particle speed {max_speed:.3}", args.steps);
    Ok(())
}
