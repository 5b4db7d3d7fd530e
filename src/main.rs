use clap::{Parser, Subcommand};
use fcstd_tool::config::DEFAULT_CONFIG_PATH;
use fcstd_tool::{paths, workspace, Config, ZipConverter};
use path_absolutize::Absolutize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "fcstd-tool",
    about = "Round-trip converter between .FCStd archives and version-control-friendly directories"
)]
struct Cli {
    /// Load behavior from a JSON configuration file. With a configuration,
    /// output paths are derived instead of given: use --config=PATH or bare
    /// --config for the default location.
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = DEFAULT_CONFIG_PATH
    )]
    config: Option<PathBuf>,

    /// Suppress all console output
    #[arg(long, global = true)]
    silent: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export (expand) a .FCStd archive into a directory
    Export {
        /// The .FCStd file to export
        input: PathBuf,
        /// Destination directory (omit with --config; derived from it)
        output: Option<PathBuf>,
    },
    /// Import (repack) an expanded directory into a .FCStd archive
    Import {
        /// The expanded directory (or, with --config, the .FCStd file whose
        /// directory is derived)
        input: PathBuf,
        /// Destination .FCStd file (omit with --config)
        output: Option<PathBuf>,
    },
    /// Print the expanded-directory path derived for an archive. Requires
    /// --config; does not guarantee the directory exists.
    Dir {
        /// The .FCStd file to derive from
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.silent {
        EnvFilter::try_new("off")
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))
    }?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Some(Config::load(path)?),
        None => None,
    };
    // Thumbnails are included by default when no configuration is supplied.
    let include_thumbnails = config.as_ref().map_or(true, |c| c.include_thumbnails);

    let converter = match &config {
        Some(c) => {
            ZipConverter::with_excludes(&[format!("{}*.zip", c.compression.bucket_prefix)])?
        }
        None => ZipConverter::new(),
    };

    match cli.command {
        // ── Export ───────────────────────────────────────────────────────────
        Commands::Export { input, output } => {
            let target = resolve_export_target(&config, &input, output)?;
            workspace::export(&converter, &input, &target, config.as_ref(), include_thumbnails)?;
            if !cli.silent {
                println!("Exported {} to {}", input.display(), target.display());
            }
        }

        // ── Import ───────────────────────────────────────────────────────────
        Commands::Import { input, output } => {
            let (expanded_dir, archive) = match &config {
                Some(c) => {
                    if output.is_some() {
                        return Err("import with --config takes only the .FCStd file; \
                             the directory is derived"
                            .into());
                    }
                    (paths::expanded_dir_for(&input, c)?, input.clone())
                }
                None => {
                    let archive = output
                        .ok_or("import without --config requires an output .FCStd path")?;
                    (input.clone(), archive)
                }
            };
            workspace::import(
                &converter,
                &expanded_dir,
                &archive,
                config.as_ref(),
                include_thumbnails,
            )?;
            if !cli.silent {
                println!("Created {} from {}", archive.display(), expanded_dir.display());
            }
        }

        // ── Dir ──────────────────────────────────────────────────────────────
        Commands::Dir { input } => {
            let config = config.ok_or("dir requires --config")?;
            if cli.silent {
                return Err("dir cannot be combined with --silent".into());
            }
            let derived = paths::expanded_dir_for(&input, &config)?;
            println!("{}", derived.absolutize()?.display());
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn resolve_export_target(
    config: &Option<Config>,
    input: &PathBuf,
    output: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match config {
        Some(c) => {
            if output.is_some() {
                return Err("export with --config takes only the .FCStd file; \
                     the directory is derived"
                    .into());
            }
            Ok(paths::expanded_dir_for(input, c)?)
        }
        None => {
            output.ok_or_else(|| "export without --config requires an output path".into())
        }
    }
}
