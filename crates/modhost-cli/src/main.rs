use clap::{Parser, Subcommand};
use starbase::{App, AppResult, AppSession};
use std::path::PathBuf;

mod commands;

use commands::{run_call, run_check, run_explain, run_resolve};

/// modhost - load managed code modules through a native runtime host
#[derive(Parser)]
#[command(name = "modhost")]
#[command(about = "Load, call and unload managed code modules", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Load a module, call an integer function and print the result
    Call {
        /// Path to modhost.toml (searched upwards from the current directory if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Module to load (defaults to the first configured module)
        #[arg(short, long)]
        module: Option<String>,
        /// Fully qualified type name
        #[arg(short = 't', long = "type")]
        type_name: String,
        /// Method name
        #[arg(long)]
        method: String,
        /// Integer arguments
        #[arg(allow_negative_numbers = true)]
        args: Vec<i32>,
    },
    /// Resolve a function and print its address and cache key
    Resolve {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        module: Option<String>,
        /// Assembly to resolve from, when it differs from the loaded module
        #[arg(long)]
        assembly: Option<String>,
        #[arg(short = 't', long = "type")]
        type_name: String,
        #[arg(long)]
        method: String,
        /// Call shape, e.g. "i32(i32, i32)"
        #[arg(short, long, default_value = "void()")]
        signature: String,
    },
    /// Describe a native status code
    Explain {
        #[arg(allow_negative_numbers = true)]
        code: i32,
    },
    /// Validate a configuration file
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Also open the native library and bind every entry point
        #[arg(long)]
        bind: bool,
    },
}

/// Application session for the modhost CLI
#[derive(Clone)]
struct ModhostSession {
    command: Commands,
}

#[async_trait::async_trait]
impl AppSession for ModhostSession {
    async fn execute(&mut self) -> AppResult {
        match &self.command {
            Commands::Call {
                config,
                module,
                type_name,
                method,
                args,
            } => run_call(
                config.clone(),
                module.clone(),
                type_name.clone(),
                method.clone(),
                args.clone(),
            ),
            Commands::Resolve {
                config,
                module,
                assembly,
                type_name,
                method,
                signature,
            } => run_resolve(
                config.clone(),
                module.clone(),
                assembly.clone(),
                type_name.clone(),
                method.clone(),
                signature.clone(),
            ),
            Commands::Explain { code } => run_explain(*code),
            Commands::Check { config, bind } => run_check(config.clone(), *bind),
        }
    }
}

#[tokio::main]
async fn main() -> starbase::MainResult {
    let cli = Cli::parse();

    let session = ModhostSession {
        command: cli.command,
    };

    let result = App::default()
        .run(session, |mut session| async move { session.execute().await })
        .await;
    modhost::logging::shutdown();
    let exit_code = result?;

    Ok(std::process::ExitCode::from(exit_code))
}
