use clap::{Args, Subcommand};
use visuasort_db::{ImageId, StagingId};

#[derive(Debug, Args)]
pub struct AdminArgs {
    #[clap(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create an object ID
    ///
    /// Useful for seeding test data or naming objects in the asset store by hand.
    MakeId(MakeId),
    /// Hash a password for the STATIC_USERS setting
    HashPassword(HashPassword),
}

#[derive(Debug, Args)]
pub struct MakeId {
    #[clap(subcommand)]
    command: Option<IdType>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum IdType {
    Image,
    Staging,
}

#[derive(Debug, Args)]
pub struct HashPassword {
    /// The password to hash
    password: String,
}

pub fn admin_commands(cmd: AdminArgs) -> Result<(), eyre::Report> {
    match cmd.commands {
        Commands::MakeId(MakeId { command }) => {
            println!("{}", make_id(command.unwrap_or(IdType::Image)))
        }
        Commands::HashPassword(HashPassword { password }) => {
            println!("{}", visuasort_auth::password::new_hash(&password)?)
        }
    }

    Ok(())
}

fn make_id(id: IdType) -> String {
    match id {
        IdType::Image => ImageId::new().to_string(),
        IdType::Staging => StagingId::new().to_string(),
    }
}
