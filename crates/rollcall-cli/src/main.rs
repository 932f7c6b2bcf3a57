use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rollcall", about = "Photo-based class attendance CLI")]
struct Cli {
    /// Talk to a daemon on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Take attendance for a class from a photo
    Process {
        /// Class identifier (e.g., "class_123")
        #[arg(short, long = "class")]
        class_id: String,
        /// Classroom photo (JPEG, PNG, ...)
        photo: PathBuf,
    },
    /// Print the path of the latest annotated image for a class
    Artifact {
        #[arg(short, long = "class")]
        class_id: String,
    },
    /// Show the roster a class resolves to
    Roster {
        #[arg(short, long = "class")]
        class_id: String,
    },
    /// List enrolled identities
    Identities,
    /// Rebuild the gallery from the training corpus
    Reload,
    /// Show daemon status
    Status,
}

// `#[zbus::proxy]` generates `AttendanceProxy` (async) and a blocking variant;
// only the async one is used.
#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    async fn process_photo(&self, class_id: &str, photo: &[u8]) -> zbus::Result<String>;
    async fn annotated_image(&self, class_id: &str) -> zbus::Result<String>;
    async fn roster(&self, class_id: &str) -> zbus::Result<String>;
    async fn list_identities(&self) -> zbus::Result<String>;
    async fn reload_gallery(&self) -> zbus::Result<u32>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = if cli.system {
        zbus::Connection::system().await
    } else {
        zbus::Connection::session().await
    }
    .context("cannot connect to D-Bus")?;
    let proxy = AttendanceProxy::new(&conn).await?;

    match cli.command {
        Commands::Process { class_id, photo } => {
            let bytes = std::fs::read(&photo)
                .with_context(|| format!("cannot read {}", photo.display()))?;
            tracing::debug!(class_id, bytes = bytes.len(), "submitting photo");
            print_json(&proxy.process_photo(&class_id, &bytes).await?)?;
        }
        Commands::Artifact { class_id } => {
            println!("{}", proxy.annotated_image(&class_id).await?);
        }
        Commands::Roster { class_id } => {
            print_json(&proxy.roster(&class_id).await?)?;
        }
        Commands::Identities => {
            print_json(&proxy.list_identities().await?)?;
        }
        Commands::Reload => {
            let enrolled = proxy.reload_gallery().await?;
            println!("Gallery reloaded: {enrolled} identities enrolled");
        }
        Commands::Status => {
            print_json(&proxy.status().await?)?;
        }
    }

    Ok(())
}

/// Re-indent a JSON reply from the daemon.
fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("daemon returned malformed JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from(["rollcall", "process", "--class", "class_123", "group.jpg"])
            .unwrap();
        assert!(!cli.system);
        assert_eq!(
            cli.command,
            Commands::Process {
                class_id: "class_123".into(),
                photo: PathBuf::from("group.jpg"),
            }
        );
    }

    #[test]
    fn test_parse_global_system_flag() {
        let cli = Cli::try_parse_from(["rollcall", "roster", "-c", "7B", "--system"]).unwrap();
        assert!(cli.system);
        assert_eq!(cli.command, Commands::Roster { class_id: "7B".into() });
    }

    #[test]
    fn test_process_requires_class() {
        assert!(Cli::try_parse_from(["rollcall", "process", "group.jpg"]).is_err());
        assert!(Cli::try_parse_from(["rollcall", "frobnicate"]).is_err());
    }

    #[test]
    fn test_print_json_rejects_garbage() {
        assert!(print_json("{\"total\": 3}").is_ok());
        assert!(print_json("not json").is_err());
    }
}
