/// LiDAR preprocessor: reads point files and writes a multiresolution octree.
mod cli;
mod loaders;
mod transform;

use cli::{Invocation, Step, USAGE_OPTIONS};
use lidar_core::accumulator::PointAccumulator;
use lidar_core::builder::OctreeBuilder;
use lidar_core::config::{Config, PreprocessorConfig};
use lidar_core::format::read_offset_file;
use std::env;
use std::path::Path;
use std::time::Instant;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config = Config::from_env().preprocessor;
    let invocation = cli::parse(args.get(1..).unwrap_or_default(), &mut config);
    for note in &invocation.notes {
        eprintln!("{note}");
    }

    let Some(output) = invocation.output.as_deref() else {
        let program = args.first().map(String::as_str).unwrap_or("LidarPreprocessor");
        eprintln!(
            "Usage: {program} -o <output file name stem> [<option 1>] ... [<option n>] <input file spec 1> ... <input file spec n>"
        );
        eprintln!("{USAGE_OPTIONS}");
        std::process::exit(1);
    };

    if let Err(e) = run(&invocation, output, &config) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }
}

fn run(invocation: &Invocation, output: &Path, config: &PreprocessorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let load_start = Instant::now();
    let mut acc = PointAccumulator::new(config.accumulator_settings());
    for step in &invocation.steps {
        match step {
            Step::SetOffset(offset) => acc.set_point_offset(*offset)?,
            Step::ReadOffsetFile(path) => match read_offset_file(path) {
                Ok(offset) => acc.set_point_offset(offset)?,
                Err(e) => eprintln!(
                    "Ignoring lasOffsetFile argument due to error {e} when reading file {}",
                    path.display()
                ),
            },
            Step::ResetOffset => acc.reset_point_offset()?,
            Step::SetTransform(transform) => acc.set_transform(*transform)?,
            Step::ResetTransform => acc.reset_transform()?,
            Step::ColorMask(mask) => acc.set_color_mask(*mask),
            Step::Load(spec) => {
                acc.reset_extents();
                println!(
                    "Processing {} input file {}...",
                    spec.format.description(),
                    spec.path.display()
                );
                match loaders::load(&mut acc, spec, true) {
                    Ok(n) => println!("  done, {n} points read."),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!("{}: {e}", spec.path.display()),
                }
                acc.print_extents();
            }
            Step::Unrecognized(path) => {
                eprintln!("Input file {} has an unrecognized file format", path.display())
            }
        }
    }
    acc.finish_reading()?;
    if acc.num_points() == 0 {
        return Err("no points were read from the input files".into());
    }
    let load_time = load_start.elapsed();

    let build_start = Instant::now();
    let summary = OctreeBuilder::new(acc.temp_octrees(), config.build_settings())?.build(output, acc.point_offset())?;
    let build_time = build_start.elapsed();

    let cleanup_start = Instant::now();
    acc.delete_temp_octrees()?;
    let cleanup_time = cleanup_start.elapsed();

    println!(
        "Wrote {} input points ({} point records) into {} nodes ({} leaves, depth {}) at {}",
        summary.num_input_points,
        summary.num_stored_points,
        summary.num_nodes,
        summary.num_leaves,
        summary.max_depth,
        output.display()
    );
    if summary.oversized_leaves > 0 {
        println!("  {} leaves hold coincident points beyond the node bound", summary.oversized_leaves);
    }
    println!(
        "Time to load input data: {:.3}s, time to create and write octree: {:.3}s, time to delete temporary files: {:.3}s",
        load_time.as_secs_f64(),
        build_time.as_secs_f64(),
        cleanup_time.as_secs_f64()
    );
    Ok(())
}
