use crate::demo::{run_demo, run_stock_report, DemoArgs, StockArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use osk_warehouse::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "OSK Warehouse",
    about = "Run the warehouse application service or inspect stock from the command line",
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
    /// Print the current stock of a warehouse from the configured store
    Stock(StockArgs),
    /// Walk through a send/receive approval scenario against a scratch store
    Demo(DemoArgs),
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
        Command::Stock(args) => run_stock_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
