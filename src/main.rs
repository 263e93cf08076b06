use amend::cli::{Cli, Command, ConfigDiscovery, FileConfig};
use amend::{AgentService, CallerIdentity, EditError};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amend=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration override from: {:?}", path);
            FileConfig::from_toml_file(path)?
        }
        None => ConfigDiscovery::discover_config()?,
    };

    match &cli.command {
        Command::ShowConfig => {
            ConfigDiscovery::show_discovery_info();
            return Ok(());
        }
        _ => {}
    }

    let caller = cli
        .caller_subject()
        .map(CallerIdentity::new)
        .ok_or_else(|| anyhow::anyhow!("no caller identity: pass --caller or set $USER"))?;
    let retry_delay = config.lock.retry_delay_secs;
    let service = AgentService::new(config)?;

    match cli.command {
        Command::Propose { instruction } => {
            let proposal = service.propose(&instruction, &caller).await?;
            println!("edit id:   {}", proposal.edit_id);
            println!("plan:      {} (risk: {})", proposal.plan.summary, proposal.plan.risk);
            println!("generated: {}", proposal.generated_by);
            println!("\n--- patch ---\n{}", proposal.patch);
            println!("\n--- review ---\n{}", proposal.review);
            println!("\napprove with: amend approve {}", proposal.edit_id);
        }
        Command::Approve { edit_id } => match service.approve(edit_id, &caller).await {
            Ok(outcome) => {
                println!("committed {}", outcome.commit_sha);
                println!("opened    {}", outcome.pull_request.url);
                for warning in &outcome.warnings {
                    println!("warning:  {}", warning);
                }
                if !outcome.skipped_ops.is_empty() {
                    println!("note: {} patch operation(s) matched nothing", outcome.skipped_ops.len());
                }
            }
            Err(EditError::LockBusy) => {
                eprintln!(
                    "another edit is in flight; retry in about {}s",
                    retry_delay
                );
                std::process::exit(1);
            }
            Err(error) => return Err(error.into()),
        },
        Command::Pending => {
            let ids = service.pending().await?;
            if ids.is_empty() {
                println!("no pending edits");
            }
            for id in ids {
                match service.pending_edit(id).await {
                    Ok(edit) => println!("{}  {}  ({})", id, edit.plan.summary, edit.created_at),
                    Err(_) => println!("{}", id),
                }
            }
        }
        Command::ShowConfig => unreachable!("handled before service construction"),
    }

    Ok(())
}
