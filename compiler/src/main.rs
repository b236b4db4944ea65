use clap::Parser;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mro::diag::Error;
use mro::registry::SourceRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "mrf",
    version,
    about = "MRO formatter — prints Martian pipeline definitions in canonical form"
)]
struct Cli {
    /// Input .mro source files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Include search directory (repeatable; defaults to $MROPATH)
    #[arg(short = 'I', long = "mro-path")]
    mro_path: Vec<PathBuf>,

    /// Write canonical text back to each file
    #[arg(long, conflicts_with = "check")]
    rewrite: bool,

    /// Resolve @include directives and print the flattened unit
    #[arg(long, conflicts_with = "rewrite")]
    includes: bool,

    /// Check references before formatting
    #[arg(long)]
    strict: bool,

    /// Print the JSON projection of all files instead of formatting
    #[arg(long, conflicts_with_all = ["rewrite", "check", "includes"])]
    json: bool,

    /// Exit with status 1 if any file is not already canonical
    #[arg(long, conflicts_with = "includes")]
    check: bool,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long, default_value = "warn")]
    log_level: String,
}

/// Exit status of a failed file: 2 for I/O, 1 for everything else.
fn status(err: &Error) -> i32 {
    match err {
        Error::Io { .. } => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    let level = LevelFilter::from_str(&cli.log_level).unwrap_or_else(|_| {
        eprintln!("mrf: invalid log level '{}', using 'warn'", cli.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::new()
        .filter_level(level)
        .parse_env(env_logger::Env::default())
        .init();

    // ── Search paths: -I wins over $MROPATH ──
    let search_paths = if cli.mro_path.is_empty() {
        std::env::var_os("MROPATH")
            .map(|v| std::env::split_paths(&v).collect())
            .unwrap_or_default()
    } else {
        cli.mro_path.clone()
    };
    log::debug!("search paths: {:?}", search_paths);
    let registry = SourceRegistry::new(search_paths);

    if cli.json {
        let mut asts = Vec::new();
        for path in &cli.files {
            match registry.parse_file(path) {
                Ok(ast) => asts.push(ast),
                Err(e) => {
                    eprintln!("mrf: error: {}", e);
                    std::process::exit(status(&e));
                }
            }
        }
        match mro::export::json_dump(&asts) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("mrf: error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut exit = 0;
    for path in &cli.files {
        match format_file(&cli, &registry, path) {
            Ok(true) => {}
            Ok(false) => {
                eprintln!("mrf: {} is not canonical", path.display());
                exit = exit.max(1);
            }
            Err(e) => {
                eprintln!("mrf: error: {}", e);
                exit = exit.max(status(&e));
            }
        }
    }
    std::process::exit(exit);
}

/// Format one file per the CLI flags. Returns whether the file already was
/// canonical.
fn format_file(cli: &Cli, registry: &SourceRegistry, path: &Path) -> mro::Result<bool> {
    let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path.display().to_string();

    if cli.strict {
        let mut unit = registry.parse_unit(&source, path)?;
        mro::check::check_ast(&mut unit)?;
    }
    let text = if cli.includes {
        let unit = registry.parse_unit(&source, path)?;
        mro::format::format_ast(&unit, false)
    } else {
        mro::format::format_source(&source, &name)?
    };
    let canonical = text == source;

    if cli.check {
        return Ok(canonical);
    }
    if cli.rewrite {
        if !canonical {
            std::fs::write(path, &text).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
            log::info!("rewrote {}", name);
        }
    } else {
        print!("{}", text);
    }
    Ok(true)
}
