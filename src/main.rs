use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use svag::plugins::registry;
use svag::{DataUri, Multipass, Optimizer, PluginEntry, SerializeOptions, UserConfig};

#[derive(Parser)]
#[command(name = "svag")]
#[command(about = "An SVG optimizer with a configurable plugin pipeline", long_about = None)]
struct Cli {
    /// Input file (use - for stdin)
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Output file (use - for stdout)
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Precision for numbers (decimal places), applied to every plugin that rounds
    #[arg(short, long)]
    precision: Option<u8>,

    /// Re-run the pipeline while the output keeps shrinking
    #[arg(short, long)]
    multipass: bool,

    /// Output as a data URI
    #[arg(long, value_enum)]
    datauri: Option<DataUriArg>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// Indentation for --pretty
    #[arg(long, default_value = "4")]
    indent: usize,

    /// Enable a plugin (repeatable)
    #[arg(long, value_name = "NAME")]
    enable: Vec<String>,

    /// Disable a plugin (repeatable)
    #[arg(long, value_name = "NAME")]
    disable: Vec<String>,

    /// Keep XML declaration
    #[arg(long)]
    keep_xml_declaration: bool,

    /// Keep DOCTYPE
    #[arg(long)]
    keep_doctype: bool,

    /// Keep comments
    #[arg(long)]
    keep_comments: bool,

    /// Disable path minification
    #[arg(long)]
    no_minify_paths: bool,

    /// Disable color minification
    #[arg(long)]
    no_minify_colors: bool,

    /// Disable all optimizations (just parse and re-serialize)
    #[arg(long)]
    no_optimize: bool,

    /// Print size comparison
    #[arg(short, long)]
    stats: bool,

    /// List the builtin plugins and exit
    #[arg(long)]
    show_plugins: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum DataUriArg {
    Base64,
    Enc,
    Unenc,
}

impl From<DataUriArg> for DataUri {
    fn from(arg: DataUriArg) -> Self {
        match arg {
            DataUriArg::Base64 => DataUri::Base64,
            DataUriArg::Enc => DataUri::Enc,
            DataUriArg::Unenc => DataUri::Unenc,
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(io::stderr);

    tracing_subscriber::registry().with(filter).with(formatter).init();
}

fn show_plugins() {
    for entry in registry() {
        let pass = entry.pass;
        println!(
            "  [{}] {:<24} {:<15} {}",
            if pass.active_by_default() { "x" } else { " " },
            pass.name(),
            pass.kind().as_str(),
            pass.description()
        );
    }
}

/// The config file (if any) with command-line overrides applied on top.
fn build_config(cli: &Cli) -> Result<UserConfig, Box<dyn std::error::Error>> {
    if cli.no_optimize {
        return Ok(UserConfig {
            full: true,
            plugins: Some(Vec::new()),
            ..Default::default()
        });
    }

    let mut config = match &cli.config {
        Some(path) => UserConfig::from_path(path)?,
        None => UserConfig::default(),
    };

    let disabled = [
        ("removeXMLProcInst", cli.keep_xml_declaration),
        ("removeDoctype", cli.keep_doctype),
        ("removeComments", cli.keep_comments),
        ("convertPathData", cli.no_minify_paths),
        ("convertColors", cli.no_minify_colors),
    ];
    for (name, off) in disabled {
        if off {
            config = config.with_plugin(PluginEntry::Toggle(name.to_string(), false));
        }
    }
    for name in &cli.enable {
        config = config.with_plugin(PluginEntry::Name(name.clone()));
    }
    for name in &cli.disable {
        config = config.with_plugin(PluginEntry::Toggle(name.clone(), false));
    }

    if let Some(precision) = cli.precision {
        config.float_precision = Some(precision);
    }
    if cli.multipass {
        config.multipass = Multipass::Runs(Multipass::DEFAULT_RUNS);
    }
    if let Some(datauri) = cli.datauri {
        config.datauri = Some(datauri.into());
    }
    if cli.pretty {
        config.js2svg = Some(SerializeOptions {
            pretty: true,
            indent: cli.indent,
        });
    }

    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    if cli.show_plugins {
        show_plugins();
        return Ok(());
    }

    let optimizer = Optimizer::new(&build_config(&cli)?)?;

    // Read input
    let from_stdin = cli.input.as_os_str() == "-";
    let input = if from_stdin {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(&cli.input)?
    };

    let input_len = input.len();

    let path = (!from_stdin).then_some(cli.input.as_path());
    let output = optimizer.optimize(&input, path)?;
    let output_len = output.data.len();

    // Write output
    if cli.output.as_os_str() == "-" {
        io::stdout().write_all(output.data.as_bytes())?;
    } else {
        fs::write(&cli.output, &output.data)?;
    }

    // Print stats if requested
    if cli.stats {
        let saved = input_len.saturating_sub(output_len);
        let percent = if input_len > 0 {
            (saved as f64 / input_len as f64) * 100.0
        } else {
            0.0
        };
        eprintln!(
            "{} -> {} bytes ({:.1}% smaller, {} run{})",
            input_len,
            output_len,
            percent,
            output.runs,
            if output.runs == 1 { "" } else { "s" }
        );
    }

    Ok(())
}
