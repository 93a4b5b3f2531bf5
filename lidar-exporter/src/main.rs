/// LiDAR exporter: writes the points of an octree, or of a box inside it, to a flat file.
use constants::exporter::DEFAULT_CACHE_SIZE_MIB;
use glam::DVec3;
use lidar_core::export::{export_points, ExportFormat, ExportOptions, DEFAULT_LAS_SCALE};
use lidar_core::reader::ReaderOptions;
use lidar_core::{Aabb, PagedOctree};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE_DETAILS: &str = "\
  -readColors <colors file name> requests to read the additional point color file of the given name
  -cache <cache size> sets the size of the LiDAR memory cache in MB (default: 512)
  -box <box spec> specifies a box in source coordinates from which to export points (default: export all points)
     box specification: <min_x> <min_y> <min_z> <max_x> <max_y> <max_z>
  -bin requests to write exported points into a binary file (default: write into ASCII file)
  -las requests to write exported points into a LAS file (default: write into ASCII file)
  -lasScale <x scale> <y scale> <z scale> defines the quantization scaling factors for LAS files";

#[derive(Debug, PartialEq)]
struct ExportArgs {
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    colors: Option<PathBuf>,
    cache_size_mib: usize,
    bbox: Option<Aabb>,
    binary: bool,
    las: bool,
    las_scale: DVec3,
    notes: Vec<String>,
}

impl Default for ExportArgs {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            colors: None,
            cache_size_mib: DEFAULT_CACHE_SIZE_MIB,
            bbox: None,
            binary: false,
            las: false,
            las_scale: DEFAULT_LAS_SCALE,
            notes: Vec::new(),
        }
    }
}

impl ExportArgs {
    fn format(&self) -> ExportFormat {
        if self.las {
            ExportFormat::Las { scale: self.las_scale }
        } else if self.binary {
            ExportFormat::Binary
        } else {
            ExportFormat::Ascii
        }
    }
}

fn numbers<'a>(args: &mut impl Iterator<Item = &'a String>, n: usize) -> Option<Vec<f64>> {
    let values: Vec<f64> = args.take(n).map_while(|a| a.parse().ok()).collect();
    (values.len() == n).then_some(values)
}

fn parse_args(args: &[String]) -> ExportArgs {
    let mut parsed = ExportArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let Some(flag) = arg.strip_prefix('-') else {
            if parsed.input.is_none() {
                parsed.input = Some(PathBuf::from(arg));
            } else if parsed.output.is_none() {
                parsed.output = Some(PathBuf::from(arg));
            } else {
                parsed.notes.push(format!("Ignoring command line argument {arg}"));
            }
            continue;
        };
        match flag.to_ascii_lowercase().as_str() {
            "readcolors" => match iter.next() {
                Some(path) => parsed.colors = Some(PathBuf::from(path)),
                None => parsed.notes.push("Ignoring dangling -readColors option".to_string()),
            },
            "cache" => match iter.next().map(|v| v.parse::<usize>()) {
                Some(Ok(mib)) => parsed.cache_size_mib = mib,
                _ => parsed.notes.push("Ignoring malformed -cache option".to_string()),
            },
            "box" => match numbers(&mut iter, 6) {
                Some(v) => {
                    parsed.bbox = Some(Aabb::new(DVec3::new(v[0], v[1], v[2]), DVec3::new(v[3], v[4], v[5])))
                }
                None => parsed.notes.push("Ignoring malformed -box option".to_string()),
            },
            "bin" => parsed.binary = true,
            "las" => parsed.las = true,
            "lasscale" => match numbers(&mut iter, 3) {
                Some(v) => parsed.las_scale = DVec3::new(v[0], v[1], v[2]),
                None => parsed.notes.push("Ignoring dangling -lasScale option".to_string()),
            },
            _ => parsed.notes.push(format!("Ignoring command line option {arg}")),
        }
    }
    parsed
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let parsed = parse_args(args.get(1..).unwrap_or_default());
    for note in &parsed.notes {
        eprintln!("{note}");
    }
    let (Some(input), Some(output)) = (&parsed.input, &parsed.output) else {
        let program = args.first().map(String::as_str).unwrap_or("LidarExporter");
        eprintln!(
            "Usage: {program} [-cache <cache size>] [-box <box spec>] <LiDAR file name> [-bin] [-las] [-lasScale <x scale> <y scale> <z scale>] <output file name>"
        );
        eprintln!("{USAGE_DETAILS}");
        std::process::exit(1);
    };

    let options = ReaderOptions {
        memory_cache_size: parsed.cache_size_mib * 1024 * 1024,
        colors_path: parsed.colors.clone(),
        ..Default::default()
    };
    let result = PagedOctree::open_with(input, options).map_err(|e| e.to_string()).and_then(|mut tree| {
        let export = ExportOptions {
            format: parsed.format(),
            bbox: parsed.bbox,
            show_progress: true,
        };
        export_points(&mut tree, output, &export).map_err(|e| e.to_string())
    });
    match result {
        Ok(count) => {
            println!("{count} points saved");
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn positional_arguments_and_flags_mix() {
        let parsed = parse_args(&args("-cache 64 -box 10 20 0 0 30 5 In.lidar -LAS -lasScale 0.01 0.01 0.1 out.las extra"));
        assert_eq!(parsed.input, Some(PathBuf::from("In.lidar")));
        assert_eq!(parsed.output, Some(PathBuf::from("out.las")));
        assert_eq!(parsed.cache_size_mib, 64);
        assert_eq!(
            parsed.bbox,
            Some(Aabb::new(DVec3::new(0.0, 20.0, 0.0), DVec3::new(10.0, 30.0, 5.0)))
        );
        assert_eq!(parsed.format(), ExportFormat::Las { scale: DVec3::new(0.01, 0.01, 0.1) });
        assert_eq!(parsed.notes, vec!["Ignoring command line argument extra".to_string()]);
    }

    #[test]
    fn defaults_write_ascii_with_millimetre_las_scale() {
        let parsed = parse_args(&args("In.lidar out.xyz -bin"));
        assert_eq!(parsed.format(), ExportFormat::Binary);
        assert_eq!(parsed.las_scale, DEFAULT_LAS_SCALE);
        assert!(parsed.bbox.is_none() && parsed.colors.is_none());
    }

    #[test]
    fn dangling_options_are_reported() {
        let parsed = parse_args(&args("In.lidar -lasScale 0.1 -frob"));
        assert_eq!(
            parsed.notes,
            vec![
                "Ignoring dangling -lasScale option".to_string(),
            ]
        );
        assert!(parsed.output.is_none());
    }
}
