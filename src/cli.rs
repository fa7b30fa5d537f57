//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Bridge between Jw_cad's external transform and an assistant
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Working directory shared with Jw_cad (overrides the config file)
    #[arg(short, long, global = true)]
    pub work_dir: Option<PathBuf>,

    /// Configuration file (JSON); defaults to ~/.jwai_config.json
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the assistant: watch the working directory and take instructions
    Run {
        /// Jw_cad drawing (.jww) to describe to the completion service
        #[arg(short, long)]
        drawing: Option<PathBuf>,

        /// Completion program and its arguments, e.g. "ask-model --json"
        #[arg(long)]
        completion: Option<String>,
    },

    /// Called by Jw_cad: hand the selection over and wait for the assistant
    Hook {
        /// Seconds to wait before giving up
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print what can be recovered from a .jww drawing
    Inspect {
        file: PathBuf,

        /// Print the decoded drawing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transform the exchange file once, without the handshake
    Apply {
        /// Transform as JSON, e.g. '{"type": "mirror_x", "axis_x": 0}'
        #[arg(short, long)]
        transform: String,
    },

    /// Show the effective configuration
    Config {
        /// Write it to the configuration file
        #[arg(long)]
        save: bool,
    },
}

impl Args {
    /// Configuration file merged with command-line overrides
    pub fn load_config(&self) -> Config {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        };
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Command::Run {
            drawing,
            completion,
        } = &self.command
        {
            if let Some(drawing) = drawing {
                config.drawing = Some(drawing.clone());
            }
            if let Some(command) = completion {
                config.completion_command =
                    command.split_whitespace().map(str::to_string).collect();
            }
        }
        if let Command::Hook {
            timeout: Some(secs),
        } = &self.command
        {
            config.hook_timeout_secs = *secs;
        }
        config
    }
}
