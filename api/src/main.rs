use clap::Parser;
use visuasort_api::{
    cmd,
    config::{Cli, Command},
};

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    color_eyre::install()?;
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(config) => cmd::server::run(config).await?,
        Command::Admin(args) => cmd::admin::admin_commands(args)?,
    }

    Ok(())
}
