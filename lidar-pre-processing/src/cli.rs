/// Order-dependent command line of the preprocessor.
///
/// Settings flags apply to every input file named after them, so the command
/// line is turned into a sequence of [`Step`]s executed in order.
use crate::loaders::{Columns, FileFormat, InputSpec};
use crate::transform::parse_transform;
use glam::{DAffine3, DVec3};
use lidar_core::config::PreprocessorConfig;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    SetOffset(DVec3),
    ReadOffsetFile(PathBuf),
    ResetOffset,
    SetTransform(DAffine3),
    ResetTransform,
    ColorMask([f32; 3]),
    Load(InputSpec),
    /// Input file whose format could not be determined.
    Unrecognized(PathBuf),
}

#[derive(Debug, Default)]
pub struct Invocation {
    pub output: Option<PathBuf>,
    pub steps: Vec<Step>,
    /// Complaints about the command line, printed before processing starts.
    pub notes: Vec<String>,
}

pub const USAGE_OPTIONS: &str = "\
Options: -np <max points per node>
         -nt <number of threads>
         -ooc <memory cache size in MB>
         -to <temporary octree file name template>
         -tp <temporary point file name template>
         -lasOffset <offset x> <offset y> <offset z>
         -lasOffsetFile <binary offset file name>
         -noLasOffset
         -transform <orthogonal transformation specification>
         -notransform
         -lasClasses <class> ... <class>
Input file spec: [-c <red> <green> <blue>] [-header <number of header lines>] <format spec> <file name>
Format spec: -AUTO
             -BIN
             -BINRGB
             -LAS
             -XYZI
             -XYZRGB
             -ASCII <x column> <y column> <z column> [<intensity column>]
             -ASCIIRGB <x column> <y column> <z column> [<r column> <g column> <b column>]
             -CSV <x column> <y column> <z column> [<intensity column>]
             -CSVRGB <x column> <y column> <z column> [<r column> <g column> <b column>]
             -BLOCKEDASCII <x column> <y column> <z column> [<intensity column>]
             -BLOCKEDASCIIRGB <x column> <y column> <z column> [<r column> <g column> <b column>]
             -OCT
             -LIDAR";

struct ArgCursor<'a> {
    args: &'a [String],
    pos: usize,
}

impl<'a> ArgCursor<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let arg = self.args.get(self.pos)?;
        self.pos += 1;
        Some(arg.as_str())
    }

    /// Next argument if it parses as `T`; otherwise nothing is consumed.
    fn next_parsed<T: std::str::FromStr>(&mut self) -> Option<T> {
        let value = self.args.get(self.pos)?.parse().ok()?;
        self.pos += 1;
        Some(value)
    }

    /// Exactly `N` numbers, or `None` when arguments run out or do not parse.
    fn numbers<const N: usize>(&mut self) -> Option<[f64; N]> {
        let mut values = [0.0; N];
        for v in &mut values {
            *v = self.next()?.parse().ok()?;
        }
        Some(values)
    }

    /// Skip `n` arguments of any kind; false when fewer remain.
    fn skip(&mut self, n: usize) -> bool {
        if self.pos + n > self.args.len() {
            self.pos = self.args.len();
            return false;
        }
        self.pos += n;
        true
    }
}

/// Parse `args` (without the program name), overriding `config` with the settings flags.
pub fn parse(args: &[String], config: &mut PreprocessorConfig) -> Invocation {
    let mut inv = Invocation::default();
    let mut cursor = ArgCursor { args, pos: 0 };
    let mut format = Some(FileFormat::Auto);
    let mut columns: Columns = [None; 6];
    let mut header_lines = 0usize;
    let mut las_classes = !0u32;
    let mut have_input = false;

    while let Some(arg) = cursor.next() {
        let Some(flag) = arg.strip_prefix('-').filter(|f| !f.is_empty()) else {
            let path = PathBuf::from(arg);
            let resolved = match format {
                Some(FileFormat::Auto) => FileFormat::detect(&path),
                other => other,
            };
            inv.steps.push(match resolved {
                Some(format) => Step::Load(InputSpec {
                    path,
                    format,
                    header_lines,
                    columns,
                    las_classes,
                }),
                None => Step::Unrecognized(path),
            });
            have_input = true;
            continue;
        };

        let lower = flag.to_ascii_lowercase();
        let dangling = |inv: &mut Invocation| inv.notes.push(format!("Dangling -{flag} flag on command line"));
        let too_late = |inv: &mut Invocation| {
            inv.notes.push(format!(
                "Ignoring {flag} argument; must be specified before any input files are read"
            ))
        };
        match lower.as_str() {
            "o" => match cursor.next() {
                Some(path) => inv.output = Some(PathBuf::from(path)),
                None => dangling(&mut inv),
            },
            "np" => match cursor.next() {
                Some(v) => match v.parse() {
                    Ok(n) => config.max_points_per_node = n,
                    Err(_) => inv.notes.push(format!("Ignoring invalid -np value {v}")),
                },
                None => dangling(&mut inv),
            },
            "nt" => match cursor.next() {
                Some(v) => match v.parse() {
                    Ok(n) => config.num_threads = n,
                    Err(_) => inv.notes.push(format!("Ignoring invalid -nt value {v}")),
                },
                None => dangling(&mut inv),
            },
            "ooc" => match cursor.next() {
                Some(v) => match v.parse() {
                    Ok(n) => config.memory_cache_size = n,
                    Err(_) => inv.notes.push(format!("Ignoring invalid -ooc value {v}")),
                },
                None => dangling(&mut inv),
            },
            "to" => match cursor.next() {
                Some(_) if have_input => too_late(&mut inv),
                Some(template) => config.temp_octree_template = template.to_string(),
                None => dangling(&mut inv),
            },
            "tp" => match cursor.next() {
                Some(template) => config.temp_point_template = template.to_string(),
                None => dangling(&mut inv),
            },
            "lasoffset" => {
                let values = cursor.numbers::<3>();
                if have_input {
                    too_late(&mut inv);
                } else {
                    match values {
                        Some(v) => inv.steps.push(Step::SetOffset(DVec3::from(v))),
                        None => dangling(&mut inv),
                    }
                }
            }
            "lasoffsetfile" => match cursor.next() {
                Some(_) if have_input => too_late(&mut inv),
                Some(path) => inv.steps.push(Step::ReadOffsetFile(PathBuf::from(path))),
                None => dangling(&mut inv),
            },
            "nolasoffset" if have_input => too_late(&mut inv),
            "nolasoffset" => inv.steps.push(Step::ResetOffset),
            "transform" => match cursor.next() {
                Some(_) if have_input => too_late(&mut inv),
                Some(text) => match parse_transform(text) {
                    Ok(t) => inv.steps.push(Step::SetTransform(t)),
                    Err(e) => inv.notes.push(format!("Ignoring -transform: {e}")),
                },
                None => dangling(&mut inv),
            },
            "notransform" if have_input => too_late(&mut inv),
            "notransform" => inv.steps.push(Step::ResetTransform),
            "c" => match cursor.numbers::<3>() {
                Some(v) => inv.steps.push(Step::ColorMask(v.map(|c| c as f32))),
                None => dangling(&mut inv),
            },
            "header" => match cursor.next().map(str::parse::<usize>) {
                Some(Ok(n)) => header_lines = n,
                Some(Err(_)) => inv.notes.push("Ignoring invalid -header value".to_string()),
                None => dangling(&mut inv),
            },
            "lasclasses" => {
                las_classes = 0;
                while let Some(class) = cursor.next_parsed::<u32>() {
                    match 1u32.checked_shl(class) {
                        Some(bit) => las_classes |= bit,
                        None => inv.notes.push(format!("Ignoring LAS class {class}")),
                    }
                }
            }
            "tiffimageindex" => {
                if !cursor.skip(1) {
                    dangling(&mut inv);
                }
            }
            "plycolornames" => {
                if cursor.skip(3) {
                    inv.notes.push("Ignoring -plyColorNames; PLY input is not supported".to_string());
                } else {
                    dangling(&mut inv);
                }
            }
            name => match FileFormat::from_flag(name) {
                Some(selected) if selected.takes_columns() => match read_columns(&mut cursor) {
                    Some(c) => {
                        columns = c;
                        format = Some(selected);
                    }
                    None => {
                        inv.notes
                            .push(format!("Invalid column indices for {} file", selected.description()));
                        format = None;
                    }
                },
                Some(selected) => format = Some(selected),
                None => inv.notes.push(format!("Unrecognized command line option {arg}")),
            },
        }
    }
    inv
}

/// Up to six column indices; x, y and z are required.
fn read_columns(cursor: &mut ArgCursor<'_>) -> Option<Columns> {
    let mut columns: Columns = [None; 6];
    for c in &mut columns {
        match cursor.next_parsed::<usize>() {
            Some(index) => *c = Some(index),
            None => break,
        }
    }
    columns[..3].iter().all(Option::is_some).then_some(columns)
}
