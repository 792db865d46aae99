use std::path::PathBuf;

use clap::{Parser, Subcommand};

use hearth::scaffold;

#[derive(Parser)]
#[command(name = "hearth-cli")]
#[command(about = "Project tooling for hearth applications", long_about = None)]
struct Cli {
    /// Project root
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the directory tree and starter configuration for an application
    New {
        /// Application name, used as `apps/<name>`
        name: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::New { name } => {
            let created = scaffold::new_app(&cli.root, &name)?;
            for dir in &created.directories {
                println!("Creating directory {}", dir.display());
            }
            for file in &created.files {
                println!("Creating file {}", file.display());
            }
            if created.is_empty() {
                println!("Application \"{}\" already exists, nothing to do", name);
            }
        }
    }

    Ok(())
}
