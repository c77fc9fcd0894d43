//! layerweave - validate a saved network, compile it and dry-run the build
//!
//! Usage: `layerweave <network.json> [--capabilities caps.json] [--config compiler.json] [--json]`

use layerweave::{
    lower, CompilerConfig, EngineCapabilities, GraphCompiler, NetworkDocument, RecordingEngine,
    ValidationReport,
};
use log::{error, info};
use std::path::PathBuf;
use std::process;

struct Args {
    network: PathBuf,
    capabilities: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut network = None;
    let mut capabilities = None;
    let mut config = None;
    let mut json = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--capabilities" => {
                capabilities = Some(PathBuf::from(args.next().ok_or("--capabilities needs a path")?))
            }
            "--config" => config = Some(PathBuf::from(args.next().ok_or("--config needs a path")?)),
            "--json" => json = true,
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            other => network = Some(PathBuf::from(other)),
        }
    }
    Ok(Args {
        network: network.ok_or("missing network file")?,
        capabilities,
        config,
        json,
    })
}

fn print_report(title: &str, report: &ValidationReport) {
    if report.is_empty() {
        return;
    }
    println!("{}:", title);
    for diagnostic in &report.diagnostics {
        println!("  {}", diagnostic);
    }
}

fn run(args: Args) -> Result<bool, Box<dyn std::error::Error>> {
    let document = NetworkDocument::load(&args.network)?;
    let graph = document.into_graph()?;
    info!("{} node(s) loaded", graph.len());

    let config = match &args.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };

    let mut engine = RecordingEngine::new();
    let mut ok = true;
    if let Some(path) = &args.capabilities {
        let caps = EngineCapabilities::load(path)?;
        let mut report = caps.check_nodes(&graph);
        if let Some(settings) = &document.train_settings {
            report.extend(caps.check_train_settings(settings));
        }
        print_report("Capability check", &report);
        ok &= !report.has_errors();
        engine = RecordingEngine::with_capabilities(caps);
    }
    if let Some(settings) = &document.train_settings {
        let report = settings.validate();
        print_report("Training settings", &report);
        ok &= !report.has_errors();
    }

    let report = graph.validate_network();
    print_report("Network", &report);

    let forest = GraphCompiler::new(config).compile(&graph)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&forest)?);
    } else {
        for layer in &forest {
            print!("{}", layer);
        }
    }

    let handles = lower(&forest, &mut engine)?;
    println!("{} engine call(s), {} top-level layer(s)", engine.ops().len(), handles.len());
    Ok(ok)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("usage: layerweave <network.json> [--capabilities caps.json] [--config compiler.json] [--json]");
            process::exit(2);
        }
    };

    match run(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
