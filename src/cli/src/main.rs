//! Canopy operator CLI
//!
//! Loads a policy snapshot into an in-memory engine and runs queries or
//! authorization checks against it. Results go to stdout as JSON; logs go
//! to stderr.
//!
//! # Usage
//!
//! ```bash
//! # List roles in a policy file
//! canopy --policy policy.json roles
//!
//! # Check a request read from a file, or from stdin with `-`
//! canopy --policy policy.json check request.json
//! echo '{"roles":["analyst"],"action":{"service":"data","resource":"/studies/1","method":"read"}}' \
//!     | canopy --policy policy.json check -
//!
//! # Debug logging
//! RUST_LOG=canopy_authz=debug canopy --policy policy.json check request.json
//! ```
//!
//! # Environment Variables
//!
//! - `CANOPY_POLICY`: Policy snapshot path
//! - `CANOPY_JSON_LOGS`: Emit JSON logs
//! - `RUST_LOG`: Logging level (trace, debug, info, warn, error)

use anyhow::{bail, Result};
use canopy_authz::{Engine, EngineConfig, ErrorEnvelope, JsonFileStore};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Canopy authorization CLI
#[derive(Parser, Debug)]
#[command(
    name = "canopy",
    version,
    about = "Query and check a Canopy policy snapshot",
    long_about = None
)]
struct Args {
    /// Policy snapshot (JSON)
    #[arg(short = 'p', long, env = "CANOPY_POLICY")]
    policy: PathBuf,

    /// Upper bound on roles named in one request
    #[arg(long, default_value = "256")]
    max_request_roles: usize,

    /// Enable JSON logging format
    #[arg(long, env = "CANOPY_JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List role identifiers
    Roles,

    /// List service identifiers
    Services,

    /// List resource paths
    Resources,

    /// Print a role and its subtree
    DescribeRole { id: String },

    /// Evaluate an authorization request (`-` reads stdin)
    Check { request: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args)?;

    info!("Canopy {}", canopy_authz::VERSION);

    if !args.policy.exists() {
        bail!("policy file {} does not exist", args.policy.display());
    }

    let config = EngineConfig {
        max_request_roles: args.max_request_roles,
        ..Default::default()
    };

    match run(&args, config).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            let envelope = ErrorEnvelope::from(&e);
            envelope.log();
            println!("{}", serde_json::to_string(&envelope)?);
            std::process::exit(1);
        }
    }
}

async fn run(args: &Args, config: EngineConfig) -> canopy_authz::Result<String> {
    let store = Arc::new(JsonFileStore::new(&args.policy));
    let engine = Engine::with_store(config, store).await?;

    let output = match &args.command {
        Command::Roles => {
            let mut roles = engine.list_roles().await;
            roles.sort();
            serde_json::to_string_pretty(&roles)?
        }
        Command::Services => {
            let mut services = engine.list_services().await;
            services.sort();
            serde_json::to_string_pretty(&services)?
        }
        Command::Resources => {
            let mut resources = engine.list_resources().await;
            resources.sort();
            serde_json::to_string_pretty(&resources)?
        }
        Command::DescribeRole { id } => {
            serde_json::to_string_pretty(&engine.describe_role(id).await?)?
        }
        Command::Check { request } => {
            let body = read_request(request).await?;
            let request = engine.parse_request(&body).await?;
            serde_json::to_string_pretty(&engine.check_auth(request).await)?
        }
    };

    Ok(output)
}

async fn read_request(source: &str) -> canopy_authz::Result<Vec<u8>> {
    if source == "-" {
        let mut body = Vec::new();
        tokio::io::stdin().read_to_end(&mut body).await?;
        Ok(body)
    } else {
        Ok(tokio::fs::read(source).await?)
    }
}

/// Initialize tracing/logging subsystem
fn init_tracing(args: &Args) -> Result<()> {
    let log_level = args.log_level.parse::<tracing::Level>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using 'info'", args.log_level);
        tracing::Level::INFO
    });

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("canopy={},canopy_authz={}", log_level, log_level).into()
    });

    if args.json_logs {
        // JSON structured logging for production
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        // Human-readable logging for development
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_authz::{
        ActionDescription, GraphSnapshot, PermissionDescription, RoleDescription,
    };
    use tempfile::TempDir;

    fn write_policy(dir: &TempDir) -> PathBuf {
        let snapshot = GraphSnapshot {
            roles: vec![RoleDescription::new("analyst").with_permission(
                PermissionDescription::new("p1", ActionDescription::new("data", "/studies/1", "read")),
            )],
            ..Default::default()
        };
        let path = dir.path().join("policy.json");
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(vec![
            "canopy",
            "--policy",
            "policy.json",
            "--max-request-roles",
            "8",
            "describe-role",
            "analyst",
        ]);

        assert_eq!(args.policy, PathBuf::from("policy.json"));
        assert_eq!(args.max_request_roles, 8);
        assert_eq!(
            args.command,
            Command::DescribeRole {
                id: "analyst".to_string()
            }
        );
        assert!(!args.json_logs);
    }

    #[test]
    fn test_args_json_logs() {
        let args = Args::parse_from(vec!["canopy", "-p", "policy.json", "--json-logs", "roles"]);
        assert!(args.json_logs);
        assert_eq!(args.command, Command::Roles);
    }

    #[tokio::test]
    async fn test_run_lists_and_checks() {
        let dir = TempDir::new().unwrap();
        let policy = write_policy(&dir);

        let args = Args::parse_from(vec!["canopy", "-p", policy.to_str().unwrap(), "roles"]);
        let output = run(&args, EngineConfig::default()).await.unwrap();
        let roles: Vec<String> = serde_json::from_str(&output).unwrap();
        assert_eq!(roles, vec!["analyst".to_string()]);

        let request = dir.path().join("request.json");
        std::fs::write(
            &request,
            br#"{"roles":["analyst"],"action":{"service":"data","resource":"/studies/1/files","method":"read"}}"#,
        )
        .unwrap();
        let args = Args::parse_from(vec![
            "canopy",
            "-p",
            policy.to_str().unwrap(),
            "check",
            request.to_str().unwrap(),
        ]);
        let output = run(&args, EngineConfig::default()).await.unwrap();
        let response: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(response["auth"], true);
        assert_eq!(response["role_id"], "analyst");
        assert_eq!(response["permission_matching"]["id"], "p1");
    }

    #[tokio::test]
    async fn test_run_reports_envelope_codes() {
        let dir = TempDir::new().unwrap();
        let policy = write_policy(&dir);

        let args = Args::parse_from(vec![
            "canopy",
            "-p",
            policy.to_str().unwrap(),
            "describe-role",
            "ghost",
        ]);
        let err = run(&args, EngineConfig::default()).await.unwrap_err();
        assert_eq!(ErrorEnvelope::from(&err).code, 404);
    }
}
