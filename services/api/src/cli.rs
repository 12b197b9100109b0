use crate::commands::{
    run_calculate, run_grade, run_list_policies, CalculateArgs, GradeArgs, ListArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use gradebook::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "gradebook",
    about = "Serve and exercise grading policies from the command line",
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
    /// Grade a CSV score sheet against the resolved policies
    Grade(GradeArgs),
    /// Inspect grading policies
    Policies {
        #[command(subcommand)]
        command: PoliciesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum PoliciesCommand {
    /// List registered policies
    List(ListArgs),
    /// Map a single percentage to a letter grade
    Calculate(CalculateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Grade(args) => run_grade(args),
        Command::Policies {
            command: PoliciesCommand::List(args),
        } => run_list_policies(args),
        Command::Policies {
            command: PoliciesCommand::Calculate(args),
        } => run_calculate(args),
    }
}
