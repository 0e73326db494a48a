use std::path::PathBuf;

/// Command line arguments of the launcher.
#[derive(Debug, Default)]
pub(crate) struct Args {
    /// Home directory override (`-d`). Defaults to `$HOME/.lattice`.
    pub(crate) home: Option<PathBuf>,
}

/// Parses the command line. `--help`, `--license` and `--version` print and
/// exit; unknown flags warn and are skipped.
pub(crate) fn parse() -> Args {
    let mut parsed = Args::default();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-l" | "--license" => {
                print_license();
                std::process::exit(0);
            }
            "-d" | "--dir" => match args.next() {
                Some(path) => parsed.home = Some(path.into()),
                None => {
                    eprintln!("Error: '--dir <PATH>' requires a directory path");
                    std::process::exit(1);
                }
            },
            other => {
                eprintln!("Warning: unknown option '{}', ignored", other);
            }
        }
    }

    parsed
}

fn print_version() {
    println!("lattice {}", env!("CARGO_PKG_VERSION"));
}

fn print_help() {
    print_version();
    println!(
        "\
{}

USAGE:
    lattice [OPTIONS]

OPTIONS:
    -d, --dir <PATH>    Use this directory for config and logs
                        (default: ~/.lattice)
    -h, --help          Print help information
    -l, --license       Print license information
    -v, --version       Print version information",
        env!("CARGO_PKG_DESCRIPTION"),
    )
}

fn print_license() {
    print_version();
    println!(
        "\
lattice is released under the MIT license.

Permission is hereby granted, free of charge, to any person obtaining a
copy of this software and associated documentation files, to deal in the
Software without restriction, subject to the conditions of the MIT
license. See the LICENSE file for the full text."
    )
}
