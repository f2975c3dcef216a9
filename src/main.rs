use clap::Parser;
use rbac_audit::cli::Cli;
use rbac_audit::handlers::AuditOptions;
use std::process;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(false) => {}
        Ok(true) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    // Initialize logging
    cli.init_logging();

    let options = AuditOptions {
        config: cli.config.clone(),
        format: cli.format.into(),
        fail_on: cli.fail_on.map(Into::into),
        no_fail: cli.no_fail,
    };

    let failed = rbac_audit::run_command(cli.command, &options).await?;
    Ok(failed)
}
