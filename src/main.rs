use clap::Parser;
use decharge_gen::{CellLayout, CellRef, GeneratorConfig, config::DEFAULT_EXPORT_DIR};
use std::{path::PathBuf, process::ExitCode};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "decharge-gen")]
#[command(about = "Generate every syndicat's décharge workbook from one template")]
#[command(version)]
struct Cli {
    /// Template workbook (.xlsx)
    template: PathBuf,

    /// Workbook giving the quotité of each syndicat (.xlsx)
    #[arg(short, long, value_name = "FILE")]
    quotite: PathBuf,

    /// Password protecting the generated sheets
    #[arg(short, long, env = "DECHARGE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Cell receiving the syndicat name
    #[arg(long, value_name = "COORD", default_value = "A64")]
    name_cell: CellRef,

    /// Cell receiving the quotité
    #[arg(long, value_name = "COORD", default_value = "B64")]
    rate_cell: CellRef,

    /// Output directory, emptied at each run
    #[arg(short = 'o', long, value_name = "DIR", default_value = DEFAULT_EXPORT_DIR)]
    export_dir: PathBuf,

    /// Log every step
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose {
        "decharge_gen=debug"
    } else {
        "decharge_gen=info"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = CellLayout::new(cli.name_cell, cli.rate_cell).and_then(|layout| {
        let config = GeneratorConfig::new(&cli.template, &cli.quotite)
            .with_export_dir(&cli.export_dir)
            .with_layout(layout)
            .with_password(cli.password);
        decharge_gen::run(&config)
    });

    match result {
        Ok(report) => {
            info!(
                written = report.written.len(),
                skipped = report.skipped,
                "done"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.exit_code();
            eprintln!("Error ({}): {:#}", e.stage(), anyhow::Error::new(e));
            ExitCode::from(code)
        }
    }
}
