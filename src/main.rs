use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use memix::config::Config;
use memix::db::Database;
use memix::export::{self, ExportFormat};
use memix::mixer::{Mixer, PickStrategy, Recorded, RunSettings};
use memix::{imaging, logging, MixError};

#[derive(Debug, PartialEq)]
enum Command {
    Mix {
        count: usize,
        how: Option<PickStrategy>,
        out: Option<PathBuf>,
    },
    Export {
        path: PathBuf,
        format: Option<ExportFormat>,
    },
    DeletePost(i64),
    Stats,
}

#[derive(Debug, PartialEq)]
struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str> {
    match args.get(i + 1) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{} requires an argument", flag),
    }
}

fn parse(args: &[String]) -> Result<Args> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut count = 1;
    let mut how = None;
    let mut out = None;
    let mut format = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("memix {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(value(args, i, "--config")?));
                i += 1;
            }
            "--count" | "-n" => {
                let raw = value(args, i, "--count")?;
                count = raw
                    .parse()
                    .with_context(|| format!("Invalid count: {}", raw))?;
                i += 1;
            }
            "--how" => {
                how = Some(value(args, i, "--how")?.parse::<PickStrategy>()?);
                i += 1;
            }
            "--out" | "-o" => {
                out = Some(PathBuf::from(value(args, i, "--out")?));
                i += 1;
            }
            "--format" | "-f" => {
                format = Some(value(args, i, "--format")?.parse::<ExportFormat>()?);
                i += 1;
            }
            flag if flag.starts_with('-') => bail!("Unknown argument: {}", flag),
            word => positional.push(word.to_string()),
        }
        i += 1;
    }

    let command = match positional.as_slice() {
        [] => bail!("No command given"),
        [cmd] if cmd == "mix" => Command::Mix { count, how, out },
        [cmd, path] if cmd == "export" => Command::Export {
            path: PathBuf::from(path),
            format,
        },
        [cmd, id] if cmd == "delete-post" => Command::DeletePost(
            id.parse()
                .with_context(|| format!("Invalid post id: {}", id))?,
        ),
        [cmd] if cmd == "stats" => Command::Stats,
        other => bail!("Unknown command: {}", other.join(" ")),
    };

    Ok(Args {
        config_path,
        command,
    })
}

fn print_help() {
    println!(
        r#"memix - composite image mixer

USAGE:
    memix [OPTIONS] <COMMAND>

COMMANDS:
    mix [--count N] [--how NAME] [--out DIR]
                        Produce N composites (default 1); NAME is aligned or firstonly
    export PATH [--format json|csv]
                        Write the lineage of every composite to PATH
    delete-post ID      Delete a post and everything generated from it
    stats               Show corpus counts

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEMIX_CONFIG        Path to config file (overrides default location)
    MEMIX_LOG           Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/memix/config.toml"#
    );
}

fn run_mix(
    db: &Database,
    config: &Config,
    count: usize,
    how: PickStrategy,
    out: Option<PathBuf>,
) -> Result<()> {
    let mixer = Mixer::new(db);
    let settings = RunSettings {
        jpeg_quality: config.output.jpeg_quality,
        skip_duplicates: config.mix.skip_duplicates,
    };
    let out_dir = out.unwrap_or_else(|| config.output.dir.clone());

    let mut produced = 0;
    for _ in 0..count {
        let outcome = match mixer.run(&config.mix.filters, how, &settings) {
            Ok(outcome) => outcome,
            Err(e @ MixError::NoEligibleContent(_)) => {
                tracing::warn!("{}", e);
                eprintln!("{}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match outcome.recorded {
            Recorded::Duplicate(id) => {
                println!("Duplicate of generated post {}, skipped", id);
            }
            Recorded::New(id) => {
                produced += 1;
                println!(
                    "Generated post {} from base post {}",
                    id, outcome.base_post_id
                );
                if config.output.save_files {
                    let target = out_dir.join(format!("mix_{}.jpg", id));
                    for path in imaging::save_numbered(&outcome.images, &target)? {
                        println!("  {}", path.display());
                    }
                }
            }
        }
    }

    if produced == 0 && count > 0 {
        bail!("No new composite produced");
    }
    Ok(())
}

fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().collect();
    let args = match parse(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match &args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    db.initialize()?;

    match args.command {
        Command::Mix { count, how, out } => {
            run_mix(&db, &config, count, how.unwrap_or(config.mix.how), out)?
        }
        Command::Export { path, format } => {
            let format = format
                .or_else(|| ExportFormat::from_path(&path))
                .unwrap_or(ExportFormat::Json);
            let rows = export::export_lineage(&db, &path, format)?;
            println!("Exported {} rows to {}", rows, path.display());
        }
        Command::DeletePost(id) => {
            db.delete_post(id)?;
            println!("Deleted post {}", id);
        }
        Command::Stats => {
            let stats = db.stats()?;
            println!("publics:            {}", stats.publics);
            println!("posts:              {}", stats.posts);
            println!("pictures:           {}", stats.pictures);
            println!("uncropped pictures: {}", stats.uncropped_pictures);
            println!("crops:              {}", stats.crops);
            println!("generated posts:    {}", stats.generated_posts);
            println!("unposted:           {}", db.unposted_generated()?.len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(words: &[&str]) -> Vec<String> {
        std::iter::once("memix")
            .chain(words.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_mix() {
        let parsed = parse(&args(&["-c", "cfg.toml", "mix", "--count", "3", "--how", "aligned"]))
            .unwrap();
        assert_eq!(parsed.config_path, Some(PathBuf::from("cfg.toml")));
        assert_eq!(
            parsed.command,
            Command::Mix {
                count: 3,
                how: Some(PickStrategy::Aligned),
                out: None
            }
        );
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            parse(&args(&["export", "out.csv", "--format", "csv"]))
                .unwrap()
                .command,
            Command::Export {
                path: PathBuf::from("out.csv"),
                format: Some(ExportFormat::Csv)
            }
        );
        assert_eq!(
            parse(&args(&["delete-post", "42"])).unwrap().command,
            Command::DeletePost(42)
        );
        assert_eq!(parse(&args(&["stats"])).unwrap().command, Command::Stats);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse(&args(&[])).is_err());
        assert!(parse(&args(&["mix", "--how", "abstract"])).is_err());
        assert!(parse(&args(&["mix", "--count"])).is_err());
        assert!(parse(&args(&["delete-post", "x"])).is_err());
        assert!(parse(&args(&["frobnicate"])).is_err());
    }
}
