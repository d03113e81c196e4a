use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tmplxml::{Converter, OutputTarget, TmplXmlError};

/// Transcode a text template into an XML document on stdout.
#[derive(Parser, Debug)]
#[command(name = "tmplxml", version, about)]
struct Cli {
    /// Template file to read; standard input when omitted
    input: Option<PathBuf>,
}

/// Reads the raw template bytes. Text outside actions need not be UTF-8.
fn read_source(input: Option<&PathBuf>) -> Result<Vec<u8>, TmplXmlError> {
    let (path, result) = match input {
        Some(path) => (path.display().to_string(), std::fs::read(path)),
        None => {
            let mut source = Vec::new();
            let result = std::io::stdin().read_to_end(&mut source).map(|_| source);
            ("<stdin>".to_string(), result)
        }
    };
    result.map_err(|error| TmplXmlError::Input {
        path,
        message: error.to_string(),
    })
}

fn run(cli: &Cli) -> Result<()> {
    let source = read_source(cli.input.as_ref())?;
    log::debug!("read {} byte(s) of template source", source.len());

    let xml = Converter::default()
        .convert_bytes(&source, OutputTarget::Buffer)?
        .unwrap_or_default();

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(xml.as_bytes())
        .and_then(|()| stdout.write_all(b"\n"))
        .and_then(|()| stdout.flush())
        .map_err(TmplXmlError::from)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("tmplxml: {}", error);
            ExitCode::FAILURE
        }
    }
}
