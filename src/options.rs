use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::processing::layer_export::ExportOptions;
use crate::processing::path_builder::Layout;
use crate::utils::export_config::ExportConfig;

#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "psd-layer-export", version, about = "Export every layer of a PSD file as a transparent PNG")]
pub struct Options {
    /// Path of the PSD file to convert
    pub input: PathBuf,

    /// Output directory (defaults to a folder named after the input file, next to it)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Ignore the folder structure and write everything into a single folder
    #[arg(short, long)]
    pub single: bool,

    /// Append a sequence number to the names of layers that carry a layer id
    #[arg(short, long)]
    pub numbering: bool,

    /// Crop each image to the layer bounds instead of the full canvas
    #[arg(short, long)]
    pub crop: bool,

    /// Decode and write layers on all cores
    #[arg(long)]
    pub parallel: bool,

    /// Worker threads for --parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// JSON file with default export options
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Options {
    /// Explicit output directory, or `<input dir>/<input stem>`
    pub fn output_directory(&self) -> PathBuf {
        if let Some(output) = self.output.as_ref().filter(|o| !o.as_os_str().is_empty()) {
            return output.clone();
        }
        default_output_directory(&self.input)
    }

    /// Combine command line flags with configured defaults; flags win
    pub fn merge_config(&mut self, config: &ExportConfig) {
        self.single |= config.single_folder;
        self.numbering |= config.numbering;
        self.crop |= config.crop;
        self.parallel |= config.parallel;
        if self.jobs.is_none() {
            self.jobs = config.jobs;
        }
        if self.output.as_ref().map_or(true, |o| o.as_os_str().is_empty()) {
            self.output = config.output_dir.clone();
        }
    }

    pub fn to_export_options(&self) -> ExportOptions {
        ExportOptions {
            output_dir: self.output_directory(),
            layout: if self.single { Layout::Flattened } else { Layout::Hierarchical },
            numbering: self.numbering,
            crop: self.crop,
            parallel: self.parallel,
        }
    }
}

fn default_output_directory(input: &Path) -> PathBuf {
    match (input.parent(), input.file_stem()) {
        (Some(parent), Some(stem)) => parent.join(stem),
        _ => PathBuf::new(),
    }
}

/// Strip whitespace and the quotes a drag-and-drop leaves around paths
fn clean_path_answer(line: &str) -> String {
    let trimmed = line.trim();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(quote) && trimmed.ends_with(quote) {
            return trimmed[1..trimmed.len() - 1].to_string();
        }
    }
    trimmed.to_string()
}

fn is_yes(line: &str) -> bool {
    let answer = line.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// Ask for the same parameters the command line accepts, one line each
pub fn prompt_options<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<Options> {
    let mut ask = |question: &str| -> io::Result<String> {
        writeln!(output, "{}", question)?;
        output.flush()?;
        let mut line = String::new();
        input.read_line(&mut line)?;
        Ok(line)
    };

    let mut options = Options::default();
    options.input = PathBuf::from(clean_path_answer(&ask(
        "Enter the path of the PSD file to convert (or drag and drop it here):",
    )?));
    let out = clean_path_answer(&ask("Enter the output directory (optional):")?);
    if !out.is_empty() {
        options.output = Some(PathBuf::from(out));
    }
    options.single = is_yes(&ask("Ignore the layer structure and write into a single folder? (y/n)")?);
    options.numbering = is_yes(&ask("Append a sequence number to output file names? (y/n)")?);
    options.crop = is_yes(&ask("Crop layer images to their bounds? (y/n)")?);

    Ok(options)
}
