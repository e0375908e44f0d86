use anyhow::{Context, Result};
use clap::Parser;
use clap_verbosity_flag::Verbosity;
use mr_decgen::{generate, logging, GenerateOption, Stage};

// Decode-table compiler for the MR CPU pipeline
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = logging::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the instruction-table CSV file
    input: String,

    /// Write the generated decoder body to this file
    #[arg(short = 'd', long)]
    decoder: Option<String>,

    /// Write the generated signal definitions to this file
    #[arg(short = 's', long)]
    sigdefs: Option<String>,

    /// Include string inserted into generated files (reserved)
    #[arg(short = 'i', long)]
    include: Option<String>,

    /// Print logs while compiling the table
    #[command(flatten)]
    verbose: Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose.log_level() {
        Some(clap_verbosity_flag::Level::Error) => &tracing::Level::WARN,
        Some(clap_verbosity_flag::Level::Warn) => &tracing::Level::INFO,
        Some(clap_verbosity_flag::Level::Info) => &tracing::Level::DEBUG,
        Some(clap_verbosity_flag::Level::Debug) => &tracing::Level::TRACE,
        Some(clap_verbosity_flag::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    };
    logging::logging_setup(log_level, None::<&std::fs::File>);

    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("could not read file `{}`", &args.input))?;

    let mut option = GenerateOption::default();
    if let Some(include) = &args.include {
        option = option.set_include(include);
    }
    let out = generate(&content, option)?;

    for stage in [Stage::Decode, Stage::Execute, Stage::Memory, Stage::Writeback] {
        let names = out.registry.stage_names(stage);
        tracing::debug!(
            "{stage:?}: {} signals: {}",
            names.len(),
            names.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    tracing::debug!(
        "writeback ports: {}",
        out.registry.wb_ports().collect::<Vec<_>>().join(", ")
    );

    if let Some(path) = &args.decoder {
        std::fs::write(path, &out.decoder)
            .with_context(|| format!("could not write file `{path}`"))?;
    }
    if let Some(path) = &args.sigdefs {
        std::fs::write(path, &out.sigdefs)
            .with_context(|| format!("could not write file `{path}`"))?;
    }
    Ok(())
}
