use crate::demo::{run_demo, run_registry_validate, DemoArgs, RegistryValidateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hiring_pipeline::error::AppError;
use hiring_pipeline::pipeline::FailurePolicy;

#[derive(Parser, Debug)]
#[command(
    name = "Hiring Pipeline",
    about = "Run and exercise the staged hiring pipeline from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Work with stage registry definitions
    Registry {
        #[command(subcommand)]
        command: RegistryCommand,
    },
    /// Walk sample candidates through an in-memory pipeline
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum RegistryCommand {
    /// Validate a JSON stage list and print the published order
    Validate(RegistryValidateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override PIPELINE_FAILURE_POLICY (reject or retry)
    #[arg(long, value_parser = parse_failure_policy)]
    pub(crate) failure_policy: Option<FailurePolicy>,
}

pub(crate) fn parse_failure_policy(raw: &str) -> Result<FailurePolicy, String> {
    FailurePolicy::parse(raw).ok_or_else(|| format!("'{raw}' is not one of: reject, retry"))
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Registry {
            command: RegistryCommand::Validate(args),
        } => run_registry_validate(args),
        Command::Demo(args) => run_demo(args),
    }
}
