//! federation-admin CLI - Federation token and peer tooling
//!
//! Prints this instance's federation tokens and links, and talks to remote
//! federation endpoints: pull, propose and report status.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use repo_federation::config::Settings;
use repo_federation::federation::{
    as_federation_link, FederationClient, ProposalResult, TokenAuthority,
};
use repo_federation::models::{
    FederationRegistration, FederationRequest, FederationToken, RepositoryModel, StatusReport,
};

/// CLI representation of FederationToken for clap parsing
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTier {
    Repositories,
    UsersAndRepositories,
    All,
}

impl From<CliTier> for FederationToken {
    fn from(tier: CliTier) -> Self {
        match tier {
            CliTier::Repositories => FederationToken::Repositories,
            CliTier::UsersAndRepositories => FederationToken::UsersAndRepositories,
            CliTier::All => FederationToken::All,
        }
    }
}

/// Request kinds a link can be built for
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRequest {
    PullRepositories,
    PullUsers,
    PullSettings,
    Proposal,
    Status,
}

impl From<CliRequest> for FederationRequest {
    fn from(req: CliRequest) -> Self {
        match req {
            CliRequest::PullRepositories => FederationRequest::PullRepositories,
            CliRequest::PullUsers => FederationRequest::PullUsers,
            CliRequest::PullSettings => FederationRequest::PullSettings,
            CliRequest::Proposal => FederationRequest::Proposal,
            CliRequest::Status => FederationRequest::Status,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PullKind {
    Repositories,
    Users,
    Settings,
}

#[derive(Parser)]
#[command(name = "federation-admin")]
#[command(about = "Repository federation administration CLI")]
struct Cli {
    /// Config file (without extension); defaults to REPO_FEDERATION_CONFIG or ./config
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Request timeout in seconds for remote calls
    #[arg(long, global = true, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tokens this instance issues, with pull links
    Tokens {
        /// Base URL pullers reach this instance at
        #[arg(long)]
        url: Option<String>,
    },
    /// Build a federation link
    Link {
        /// Base URL of the remote instance
        #[arg(long)]
        remote: String,
        #[arg(long)]
        token: String,
        #[arg(long, value_enum)]
        req: Option<CliRequest>,
        #[arg(long, value_enum)]
        token_type: Option<CliTier>,
        /// This instance's base URL
        #[arg(long)]
        my_url: Option<String>,
    },
    /// Ask a remote instance to pull from this one
    Propose {
        #[arg(long)]
        remote: String,
        /// Tier of the token offered to the remote
        #[arg(long, value_enum, default_value = "repositories")]
        token_type: CliTier,
        /// This instance's base URL
        #[arg(long)]
        my_url: String,
        /// JSON map of clone URL to repository
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Pull from a remote instance and print the result
    Pull {
        #[arg(long)]
        source: String,
        #[arg(long)]
        token: String,
        #[arg(long, value_enum, default_value = "repositories")]
        kind: PullKind,
        /// Only show repositories matching these patterns (trailing `*` for prefixes)
        #[arg(long)]
        include: Vec<String>,
        /// Hide repositories matching these patterns
        #[arg(long)]
        exclude: Vec<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Send a pull status report to a source instance
    Report {
        #[arg(long)]
        source: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        my_url: String,
        /// JSON status report
        #[arg(long)]
        report: PathBuf,
    },
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;
    Ok(settings)
}

fn authority(settings: &Settings) -> anyhow::Result<TokenAuthority> {
    let tokens = TokenAuthority::from_settings(&settings.federation);
    if tokens.is_empty() {
        bail!("federation.uuid is not set; this instance issues no tokens");
    }
    Ok(tokens)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_tokens(settings: &Settings, url: Option<String>) -> anyhow::Result<()> {
    let tokens = authority(settings)?;
    let base = url
        .or_else(|| settings.instance.canonical_url.clone())
        .unwrap_or_else(|| format!("http://localhost:{}", settings.server.http_port));

    println!("{:<24} {:<12} {:<64}", "TIER", "SET", "TOKEN");
    println!("{}", "-".repeat(100));
    for (token, grant) in tokens.issued() {
        println!(
            "{:<24} {:<12} {:<64}",
            grant.tier.as_str(),
            grant.set.as_deref().unwrap_or("-"),
            token
        );
    }

    println!();
    for (token, grant) in tokens.issued() {
        let label = grant.set.as_deref().unwrap_or(grant.tier.as_str());
        let link = as_federation_link(&base, None, token, None, None);
        println!("{}: {}", label, link);
    }
    Ok(())
}

async fn propose(
    client: &FederationClient,
    settings: &Settings,
    remote: &str,
    tier: FederationToken,
    my_url: &str,
    snapshot: &PathBuf,
) -> anyhow::Result<()> {
    let tokens = authority(settings)?;
    let token = tokens
        .token_for(tier)
        .ok_or_else(|| anyhow!("No {} token issued", tier))?;

    let repositories: BTreeMap<String, RepositoryModel> = read_json(snapshot)?;
    if repositories.is_empty() {
        bail!("{} lists no repositories", snapshot.display());
    }

    match client
        .propose(remote, tier, token, my_url, &repositories)
        .await?
    {
        ProposalResult::Accepted => {
            println!("Proposal of {} repositories sent to {}", repositories.len(), remote);
            Ok(())
        }
        ProposalResult::NotAllowed => Err(anyhow!("{} does not accept proposals", remote)),
        ProposalResult::MissingData => Err(anyhow!("{} rejected the snapshot", remote)),
        ProposalResult::Error(status) => Err(anyhow!("{} answered with status {}", remote, status)),
    }
}

async fn pull(
    client: &FederationClient,
    source: &str,
    token: &str,
    kind: PullKind,
    include: Vec<String>,
    exclude: Vec<String>,
    json: bool,
) -> anyhow::Result<()> {
    match kind {
        PullKind::Repositories => {
            let mut filter = FederationRegistration::new(source, source, token, "");
            filter.inclusions = include;
            filter.exclusions = exclude;

            let repositories: BTreeMap<String, RepositoryModel> = client
                .pull_repositories(source, token)
                .await?
                .into_iter()
                .filter(|(_, repository)| filter.accepts(&repository.name))
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&repositories)?);
                return Ok(());
            }
            if repositories.is_empty() {
                println!("No repositories offered.");
                return Ok(());
            }
            println!("{:<32} {:<18} URL", "NAME", "STRATEGY");
            println!("{}", "-".repeat(100));
            for (url, repository) in &repositories {
                println!(
                    "{:<32} {:<18} {}",
                    repository.name,
                    format!("{:?}", repository.federation_strategy),
                    url
                );
            }
            println!();
            println!("Total: {} repositories", repositories.len());
        }
        PullKind::Users => {
            let users = client.pull_users(source, token).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
                return Ok(());
            }
            for user in &users {
                println!("{:<24} {}", user.username, user.display_name);
            }
            println!();
            println!("Total: {} users", users.len());
        }
        PullKind::Settings => {
            let settings = client.pull_settings(source, token).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
                return Ok(());
            }
            for (key, value) in &settings {
                println!("{} = {}", key, value);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = FederationClient::new(Duration::from_secs(cli.timeout))?;

    match cli.command {
        Commands::Tokens { url } => {
            let settings = load_settings(cli.config.as_ref())?;
            print_tokens(&settings, url)?;
        }
        Commands::Link {
            remote,
            token,
            req,
            token_type,
            my_url,
        } => {
            let link = as_federation_link(
                &remote,
                token_type.map(Into::into),
                &token,
                req.map(Into::into),
                my_url.as_deref(),
            );
            println!("{}", link);
        }
        Commands::Propose {
            remote,
            token_type,
            my_url,
            snapshot,
        } => {
            let settings = load_settings(cli.config.as_ref())?;
            propose(&client, &settings, &remote, token_type.into(), &my_url, &snapshot).await?;
        }
        Commands::Pull {
            source,
            token,
            kind,
            include,
            exclude,
            json,
        } => {
            pull(&client, &source, &token, kind, include, exclude, json).await?;
        }
        Commands::Report {
            source,
            token,
            my_url,
            report,
        } => {
            let report: StatusReport = read_json(&report)?;
            client.send_status(&source, &token, &my_url, &report).await?;
            println!(
                "Reported status of {} repositories to {}",
                report.statuses.len(),
                source
            );
        }
    }

    Ok(())
}
