#[cfg(test)]
#[path = "main_test.rs"]
mod tests;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tenantgate::backend::http::HttpBackend;
use tenantgate::config::GateConfig;
use tenantgate::error::ErrorCode;
use tenantgate::{FeatureFlags, GateError, Navigator, SessionStore, Shell, View, WorkspaceResolver};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "tenantgate", about = "Check dashboard guard and workspace resolution against a live API")]
struct Cli {
    /// Overrides `TENANTGATE_API_URL`.
    #[arg(long)]
    base_url: Option<String>,

    /// Overrides `TENANTGATE_SESSION_TOKEN`.
    #[arg(long)]
    session_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount the shell on PATH and print the resulting view.
    Check { path: String },
    /// Print the feature flag table, or one flag by name.
    Flags {
        #[arg(long)]
        name: Option<String>,
    },
    /// End the session and print where the visitor would be sent.
    SignOut,
}

/// Prints navigations instead of performing them.
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, to: &str) {
        println!("navigate {to}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = with_overrides(GateConfig::from_env()?, &cli);
    let flags = *FeatureFlags::global();

    match cli.command {
        Command::Check { path } => run_check(&config, flags, &path).await,
        Command::Flags { name } => run_flags(flags, name.as_deref()),
        Command::SignOut => run_sign_out(&config, flags).await,
    }
}

/// Command-line flags win over the environment-backed config.
fn with_overrides(mut config: GateConfig, cli: &Cli) -> GateConfig {
    if let Some(base_url) = &cli.base_url {
        config.api_base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(token) = &cli.session_token {
        config.session_token = Some(token.clone());
    }
    config
}

fn build_shell(config: &GateConfig, flags: FeatureFlags) -> Result<Shell<PrintNavigator>, GateError> {
    let backend = Arc::new(HttpBackend::from_config(config)?);
    tracing::info!(base_url = backend.base_url(), "using dashboard API");
    let store = Arc::new(SessionStore::new(backend.clone()));
    let resolver = WorkspaceResolver::new(backend, flags);
    Ok(Shell::new(store, resolver, config.guard_config(), flags, PrintNavigator))
}

async fn run_check(config: &GateConfig, flags: FeatureFlags, path: &str) -> Result<(), CliError> {
    let mut shell = build_shell(config, flags)?;
    let view = shell.mount(path).await?;

    match shell.store().get_session().user() {
        Some(user) => println!("user {} <{}> verified={}", user.id, user.email, user.is_email_verified),
        None => println!("user anonymous"),
    }
    match view {
        View::Loading => println!("view loading"),
        View::Redirecting => println!("view redirecting"),
        View::NotFound => println!("view not_found"),
        View::Error(e) => println!("view error {} ({})", e.error_code(), e),
        View::Content(None) => println!("view content"),
        View::Content(Some(ctx)) => {
            println!("view content {}", ctx.route());
            let workspace = serde_json::json!({
                "organization": ctx.organization(),
                "project": ctx.project(),
            });
            println!("{}", serde_json::to_string_pretty(&workspace)?);
        }
    }
    Ok(())
}

fn run_flags(flags: FeatureFlags, name: Option<&str>) -> Result<(), CliError> {
    if let Some(name) = name {
        println!("{name}={}", flags.is_enabled_by_name(name)?);
        return Ok(());
    }
    for (flag, enabled) in flags.iter() {
        println!("{:<28} {:<44} {enabled}", flag.name(), flag.env_key());
    }
    Ok(())
}

async fn run_sign_out(config: &GateConfig, flags: FeatureFlags) -> Result<(), CliError> {
    let mut shell = build_shell(config, flags)?;
    let reason = shell.sign_out().await;
    println!("status {reason}");
    Ok(())
}
