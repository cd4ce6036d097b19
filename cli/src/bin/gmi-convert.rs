use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gemini_core::gemtext::{GmiWriter, HtmlWriter};
use gemini_core::{parse_lines, Visitor};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Gmi,
    Html,
}

/// Convert gemtext to canonical gemtext or HTML.
#[derive(Debug, Parser)]
#[command(name = "gmi-convert", version)]
struct Args {
    /// Output format.
    #[arg(short = 'T', long, value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Output path, `-` for stdout.
    #[arg(short, long, default_value = "-")]
    output: String,

    /// Input files; stdin when none are given.
    files: Vec<PathBuf>,
}

fn convert<V: Visitor>(visitor: &mut V, files: &[PathBuf]) -> anyhow::Result<()> {
    if files.is_empty() {
        return parse_lines(io::stdin().lock(), visitor).context("reading stdin");
    }
    for path in files {
        debug!(path = %path.display(), "converting");
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        parse_lines(BufReader::new(file), &mut *visitor).with_context(|| format!("converting {}", path.display()))?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let output: Box<dyn Write> = if args.output == "-" {
        Box::new(io::stdout().lock())
    } else {
        let file = File::create(&args.output).with_context(|| format!("creating {}", args.output))?;
        Box::new(file)
    };
    let output = BufWriter::new(output);

    let mut output = match args.format {
        Format::Gmi => {
            let mut writer = GmiWriter::new(output);
            convert(&mut writer, &args.files)?;
            writer.into_inner()
        }
        Format::Html => {
            let mut writer = HtmlWriter::new(output);
            convert(&mut writer, &args.files)?;
            writer.into_inner()
        }
    };
    output.flush().context("flushing output")?;
    Ok(())
}
