use std::error::Error;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use serde_json::Value;
use tracing::Level;
use zpath::{to_json, Configuration, FileIncluder, Settings, TracingLogger, ZPath, ZTemplate};

/// Evaluate path expressions or render a template against JSON documents.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Expression to evaluate; repeat for several. Results print one JSON value per line.
    #[arg(short = 'e', long = "eval", value_name = "EXPR")]
    exprs: Vec<String>,
    /// Template file to render to stdout.
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,
    /// JSON file with settings (locale, limits, escaping).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// HTML-escape template substitutions.
    #[arg(long)]
    html: bool,
    /// Maximum number of template loop iterations.
    #[arg(long, value_name = "N")]
    max_iterations: Option<usize>,
    /// Increase log verbosity (-v debug, -vv trace with evaluation steps).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// JSON input files; `-` or none reads stdin.
    inputs: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("zpath: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.exprs.is_empty() && args.template.is_none() {
        return Err("nothing to do: pass -e EXPR or -t TEMPLATE".into());
    }
    let config = configuration(args)?;
    let exprs = args
        .exprs
        .iter()
        .map(|e| ZPath::compile_with(e, config.clone()))
        .collect::<Result<Vec<_>, _>>()?;
    let template = match &args.template {
        Some(path) => Some(load_template(path, &config)?),
        None => None,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for doc in read_inputs(&args.inputs)? {
        for expr in &exprs {
            for item in expr.eval(&doc)?.all() {
                writeln!(out, "{}", serde_json::to_string(&to_json(item))?)?;
            }
        }
        if let Some(template) = &template {
            out.write_all(template.apply(&doc)?.as_bytes())?;
        }
    }
    out.flush()?;
    Ok(())
}

fn configuration(args: &Args) -> Result<Configuration, Box<dyn Error>> {
    let mut settings = match &args.config {
        Some(path) => serde_json::from_str::<Settings>(&std::fs::read_to_string(path)?)?,
        None => Settings::default(),
    };
    if args.html {
        settings.html_escape = true;
    }
    if let Some(n) = args.max_iterations {
        settings.max_iterations = n;
    }
    let mut config = Configuration::default().with_settings(settings);
    if args.verbose > 1 {
        config = config.with_logger(TracingLogger::default());
    }
    Ok(config)
}

fn load_template(path: &Path, config: &Configuration) -> Result<ZTemplate, Box<dyn Error>> {
    let source = std::fs::read_to_string(path)?;
    let root = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let config = config.clone().with_template_includer(FileIncluder::new(root));
    Ok(ZTemplate::compile_at(
        &source,
        path.to_string_lossy(),
        config,
    )?)
}

fn read_inputs(inputs: &[PathBuf]) -> Result<Vec<Value>, Box<dyn Error>> {
    if inputs.is_empty() {
        return Ok(vec![read_stdin()?]);
    }
    inputs
        .iter()
        .map(|path| {
            if path.as_os_str() == "-" {
                read_stdin()
            } else {
                Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
            }
        })
        .collect()
}

fn read_stdin() -> Result<Value, Box<dyn Error>> {
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(serde_json::from_str(&buf)?)
}
