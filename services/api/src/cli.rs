use crate::demo::{run_demo, run_pricing_table, DemoArgs, PricingTableArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use lead_exchange::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Lead Exchange",
    about = "Run and demonstrate the lead claim and credit ledger engine",
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
    /// Inspect claim pricing without starting the service
    Pricing {
        #[command(subcommand)]
        command: PricingCommand,
    },
    /// Run a scripted claim, quote and refund walkthrough against an in-memory store
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum PricingCommand {
    /// Print the credit cost for every budget bracket and urgency
    Table(PricingTableArgs),
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
        Command::Pricing {
            command: PricingCommand::Table(args),
        } => {
            run_pricing_table(args);
            Ok(())
        }
        Command::Demo(args) => run_demo(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["lead-exchange-api"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn pricing_table_accepts_verified_flag() {
        let cli = Cli::try_parse_from(["lead-exchange-api", "pricing", "table", "--verified"])
            .expect("parses");
        match cli.command {
            Some(Command::Pricing {
                command: PricingCommand::Table(args),
            }) => assert!(args.verified),
            other => panic!("expected pricing table, got {other:?}"),
        }
    }

    #[test]
    fn demo_parses_export_path() {
        let cli = Cli::try_parse_from([
            "lead-exchange-api",
            "demo",
            "--export",
            "ledger.csv",
            "--skip-quotes",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => {
                assert_eq!(
                    args.export.as_deref(),
                    Some(std::path::Path::new("ledger.csv"))
                );
                assert!(args.skip_quotes);
            }
            other => panic!("expected demo, got {other:?}"),
        }
    }
}
