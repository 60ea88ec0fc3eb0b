//! Command-line surface (out of scope per the spec, but the binary needs
//! one to run). Kept as a small hand-rolled parser in the teacher's style
//! rather than pulling in a dependency for an out-of-scope concern.

use std::env;

pub struct Opts {
    pub subcommand: String,
    pub path: String,
    pub format: String,
    pub overrides: Vec<(String, String)>,
}

pub fn get_opts() -> Opts {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: tasker <run|validate> <task-file> [--format text] [--set key=value ...]");
        std::process::exit(1);
    }

    let subcommand = args[1].clone();
    let path = args[2].clone();
    let mut format = "text".to_string();
    let mut overrides = Vec::new();

    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--format" => {
                i += 1;
                match args.get(i) {
                    Some(v) => format = v.clone(),
                    None => {
                        eprintln!("--format requires a value");
                        std::process::exit(1);
                    }
                }
            }
            "--set" => {
                i += 1;
                match args.get(i).and_then(|v| v.split_once('=')) {
                    Some((k, v)) => overrides.push((k.to_string(), v.to_string())),
                    None => {
                        eprintln!("--set requires key=value");
                        std::process::exit(1);
                    }
                }
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    Opts {
        subcommand,
        path,
        format,
        overrides,
    }
}
