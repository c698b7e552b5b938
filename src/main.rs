//! Tenant Gate operator CLI
//!
//! Inspects and repairs a subject's access from the command line, acting as
//! the session described by the flags.

use anyhow::{Context, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tenant_gate::{
    access_control::{PermissionRequirement, PermissionResolver, Role},
    audit::{MemoryAuditSink, RestAuditSink, SharedAuditSink},
    config::{LogFormat, LoggingConfig, load_config, require_api_key},
    guard::{GuardConfig, Location, RouteGuard},
    session::{Session, SessionStore, TenantMembership},
    store::{RestAuthorizationStore, RestClient, SharedAuthorizationStore},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Tenant Gate - inspect and manage tenant access
#[derive(Parser, Debug)]
#[command(name = "tenant-gate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "TENANT_GATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, env = "TENANT_GATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Print decision metrics to stderr when done
    #[arg(long, global = true)]
    stats: bool,

    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct SessionArgs {
    /// Subject (user) id to act as
    #[arg(long, global = true, env = "TENANT_GATE_SUBJECT")]
    subject: Option<String>,

    #[arg(long, global = true, default_value = "")]
    email: String,

    /// Active tenant id
    #[arg(long, global = true)]
    tenant: Option<String>,

    /// Role held in the active tenant
    #[arg(long, global = true)]
    role: Option<Role>,

    #[arg(long, global = true)]
    platform_admin: bool,
}

impl SessionArgs {
    fn build(&self) -> anyhow::Result<Session> {
        let Some(subject) = &self.subject else {
            bail!("--subject is required");
        };
        let session = Session::new(subject, &self.email).with_platform_admin(self.platform_admin);
        match (&self.tenant, self.role) {
            (Some(tenant), Some(role)) => {
                Ok(session.with_membership(TenantMembership::new(tenant, role)))
            }
            (None, None) => Ok(session),
            (Some(_), None) => bail!("--tenant needs --role"),
            (None, Some(_)) => bail!("--role needs --tenant"),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check one permission
    Check { resource: String, action: String },
    /// Check several `resource:action` permissions at once
    Batch {
        #[arg(required = true)]
        permissions: Vec<String>,
    },
    /// Check a route path against the page table
    Route { path: String },
    /// List routes the session can open
    Routes,
    /// Grant a permission to a subject in the active tenant
    Grant {
        subject: String,
        resource: String,
        action: String,
    },
    /// Revoke a permission from a subject in the active tenant
    Revoke {
        subject: String,
        resource: String,
        action: String,
    },
    /// Run the route guard for a path and print the resulting view
    Guard {
        path: String,
        #[arg(long)]
        require_role: Option<Role>,
        /// `resource:action`
        #[arg(long)]
        require_permission: Option<String>,
        #[arg(long)]
        audit: bool,
    },
}

fn init_logging(config: &LoggingConfig, level_override: Option<&str>) {
    let level = level_override.unwrap_or(&config.level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = config.format == LogFormat::Json;

    tracing_subscriber::registry()
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with(filter)
        .init();
}

fn parse_requirement(s: &str) -> anyhow::Result<PermissionRequirement> {
    PermissionRequirement::parse(s)
        .with_context(|| format!("expected resource:action, got '{}'", s))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging, args.log_level.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tenant-gate");

    let key = require_api_key(&config)
        .inspect_err(|e| error!(error = %e, "Missing store credentials"))?;
    let session = args.session.build()?;

    let client = Arc::new(
        RestClient::new(&config.store, key)
            .inspect_err(|e| error!(error = %e, "Failed to create store client"))?,
    );
    let store: SharedAuthorizationStore = Arc::new(RestAuthorizationStore::new(client.clone()));
    let audit: SharedAuditSink = if config.audit.enabled {
        Arc::new(RestAuditSink::new(client, &config.audit.table))
    } else {
        Arc::new(MemoryAuditSink::new(config.audit.memory_capacity))
    };

    let sessions = Arc::new(SessionStore::new());
    sessions.sign_in(session);
    let resolver = Arc::new(PermissionResolver::from_config(
        &config,
        sessions.clone(),
        store,
        audit,
    ));

    match args.command {
        Command::Check { resource, action } => {
            let decision = resolver.check_access_detailed(&resource, &action).await?;
            print_json(&decision)?;
        }
        Command::Batch { permissions } => {
            let requirements = permissions
                .iter()
                .map(|p| parse_requirement(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            let decisions: BTreeMap<String, bool> = resolver
                .check_multiple_permissions(&requirements)
                .await?
                .into_iter()
                .map(|(req, granted)| (req.to_string(), granted))
                .collect();
            print_json(&decisions)?;
        }
        Command::Route { path } => {
            let granted = resolver.can_access_route(&path).await?;
            print_json(&serde_json::json!({ "path": path, "granted": granted }))?;
        }
        Command::Routes => {
            let mut routes = resolver.accessible_routes().await?;
            routes.sort();
            print_json(&routes)?;
        }
        Command::Grant {
            subject,
            resource,
            action,
        } => {
            resolver
                .update_permission(&subject, &resource, &action, true)
                .await
                .inspect_err(|e| error!(error = %e, "Grant failed"))?;
            print_json(&serde_json::json!({
                "subject": subject,
                "granted": format!("{}:{}", resource, action),
            }))?;
        }
        Command::Revoke {
            subject,
            resource,
            action,
        } => {
            resolver
                .update_permission(&subject, &resource, &action, false)
                .await
                .inspect_err(|e| error!(error = %e, "Revoke failed"))?;
            print_json(&serde_json::json!({
                "subject": subject,
                "revoked": format!("{}:{}", resource, action),
            }))?;
        }
        Command::Guard {
            path,
            require_role,
            require_permission,
            audit,
        } => {
            let mut guard_config = GuardConfig::from_defaults(&config.guard)
                .with_audit(audit || config.guard.enable_audit);
            if let Some(role) = require_role {
                guard_config = guard_config.require_role(role);
            }
            if let Some(permission) = require_permission {
                let requirement = parse_requirement(&permission)?;
                guard_config =
                    guard_config.require_permission(&requirement.resource, &requirement.action);
            }
            let guard = RouteGuard::new(sessions, resolver.clone(), guard_config);
            let view = guard.resolve(&Location::new(path)).await;
            print_json(&view)?;
        }
    }

    // Queued audit writes would be lost when the runtime shuts down
    resolver.flush_audit().await;

    if args.stats {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&resolver.metrics().snapshot())?
        );
    }

    Ok(())
}
