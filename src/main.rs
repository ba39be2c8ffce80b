use clap::Parser;
use plutus::cli::{self, AuditCommand, CheckCommand, Cli, Commands};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    // reqwest and tungstenite both pull in rustls; pick the provider once.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Status(args) => cli::status::execute(args),
        Commands::Audit(AuditCommand::Verify(args)) => cli::audit::execute_verify(args),
        Commands::Audit(AuditCommand::Release(args)) => cli::audit::execute_release(args),
        Commands::Check(CheckCommand::Config(args)) => cli::check::execute_config(&args.config),
    };

    if let Err(e) = result {
        cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}
