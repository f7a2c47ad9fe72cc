use std::io;
use std::process;

use clap::error::ErrorKind;
use clap::Parser;

use psd_layer_export::options::{prompt_options, Options};
use psd_layer_export::utils::export_config::load_export_config;
use psd_layer_export::utils::logging::{init_logging, log_info_ctx, log_success_ctx, log_warning_ctx};
use psd_layer_export::utils::progress::LogProgress;
use psd_layer_export::utils::{report_error, ExportFailure};
use psd_layer_export::{LayerExporter, PngWriter, PsdDocument};

fn main() {
    let mut options = parse_args_or_prompt();
    init_logging(options.verbose, options.quiet);

    if let Err(failure) = run(&mut options) {
        report_error(failure.context(), &failure);
        process::exit(failure.exit_code());
    }
}

/// Command line first; anything but help/version falls back to questions on stdin
fn parse_args_or_prompt() -> Options {
    match Options::try_parse() {
        Ok(options) => options,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => err.exit(),
        Err(err) => {
            let _ = err.print();
            println!("----------");
            println!("Arguments are missing or invalid. Switching to interactive mode.");
            let options = match prompt_options(io::stdin().lock(), io::stdout()) {
                Ok(options) => options,
                Err(e) => {
                    eprintln!("Error: failed to read answers: {}", e);
                    process::exit(2);
                }
            };
            println!("----------");
            options
        }
    }
}

fn configure_thread_pool(jobs: Option<usize>) {
    let threads = jobs.unwrap_or_else(num_cpus::get).max(1);
    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
        log_warning_ctx("export", format!("Failed to configure thread pool: {}", e));
    }
}

fn run(options: &mut Options) -> Result<(), ExportFailure> {
    let config = load_export_config(options.config.as_deref()).map_err(ExportFailure::Config)?;
    options.merge_config(&config);

    if !options.input.is_file() {
        return Err(ExportFailure::InputNotFound(options.input.clone()));
    }
    if options.parallel {
        configure_thread_pool(options.jobs);
    }

    log_info_ctx("psd", format!("PSD file: {}", options.input.display()));
    let document = PsdDocument::open(&options.input).map_err(ExportFailure::Decode)?;

    let export_options = options.to_export_options();
    let output_dir = export_options.output_dir.clone();
    let progress = LogProgress::new();
    let summary = LayerExporter::new(&document, &PngWriter, export_options)
        .with_progress(&progress)
        .export()
        .map_err(ExportFailure::from_export_error)?;

    log_success_ctx(
        "export",
        format!(
            "{} layer images written to {} ({} empty skipped, {} overwritten by name collisions)",
            summary.emitted.len() - summary.collisions,
            output_dir.display(),
            summary.skipped_empty,
            summary.collisions
        ),
    );
    Ok(())
}
