mod assistant;
mod cli;
mod config;
mod drawing;
mod error;
mod exchange;
mod fsio;
mod geometry;
mod hook;
mod protocol;
mod transform;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use assistant::AssistantOptions;
use assistant::completion::{CommandCompletion, CompletionService, EchoCompletion};
use cli::{Args, Command};
use config::Config;
use protocol::MarkerPaths;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.load_config();
    let paths = MarkerPaths::in_dir(&config.work_dir);

    match args.command {
        Command::Run { .. } => {
            let service: Arc<dyn CompletionService> =
                match CommandCompletion::from_argv(&config.completion_command) {
                    Some(service) => Arc::new(service),
                    None => {
                        log::warn!("No completion command configured, using the offline responder");
                        Arc::new(EchoCompletion)
                    }
                };
            assistant::run(AssistantOptions {
                paths,
                poll_interval: config.poll_interval(),
                drawing: config.drawing.clone(),
                record_types: config.record_types.clone(),
                service,
            })
        }
        Command::Hook { .. } => hook::run(&paths, config.hook_timeout()),
        Command::Inspect { file, json } => inspect(&file, json, &config),
        Command::Apply { transform } => apply_once(&paths, &transform),
        Command::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                match args.config.as_deref() {
                    Some(path) => config.save_to(path),
                    None => config.save(),
                }
            }
            Ok(())
        }
    }
}

fn inspect(file: &std::path::Path, json: bool, config: &Config) -> Result<()> {
    let doc = drawing::decode_drawing(file, &config.record_types)?;
    if json {
        let value = serde_json::json!({
            "drawing": doc,
            "insights": doc.insights(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", doc.summary(usize::MAX, usize::MAX));
    }
    Ok(())
}

fn apply_once(paths: &MarkerPaths, transform: &str) -> Result<()> {
    let descriptor = transform::extract_descriptor(transform)
        .with_context(|| format!("No transform found in {transform:?}"))?;
    let document = exchange::read_exchange_file(&paths.exchange)?;
    let report = protocol::session::write_back(paths, &document, Some(&descriptor))?;
    println!("{report}");
    Ok(())
}
