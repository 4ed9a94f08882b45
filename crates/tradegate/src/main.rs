use std::env;
use std::io::{self, IsTerminal, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

use tradegate::api::{AppState, create_router};
use tradegate::auth::{TokenVerifier, Verification};
use tradegate::config::{APP_NAME, AppConfig, resolve_config_path, write_default_config};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn async_serve(ctx: RuntimeContext, cmd: ServeCommand) -> Result<()> {
    handle_serve(&ctx, cmd).await
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Completions { shell } = cli.command {
        return handle_completions(shell);
    }

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("config file: {}", ctx.config_path.display());

    match cli.command {
        Command::Serve(cmd) => async_serve(ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Token { command } => handle_token(&ctx, command),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Tradegate - authenticating gateway for the trading dashboard.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true, env = "TRADEGATE_CONFIG")]
    config: Option<PathBuf>,
    /// Silence log output (command errors are still printed)
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
    /// Enable trace logging (overrides other levels)
    #[arg(long, global = true)]
    trace: bool,
    /// Output machine readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Disable ANSI colors in output
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    /// Control color output (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the HTTP gateway
    Serve(ServeCommand),
    /// Inspect and manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Mint or inspect session tokens
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Args)]
struct ServeCommand {
    /// Host address to bind to (overrides server.host)
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides server.port)
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration with secrets redacted
    Show,
    /// Print the resolved config path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum TokenCommand {
    /// Mint a token signed with the configured secret
    Mint {
        /// Subject (user ID)
        #[arg(long)]
        sub: String,
        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl_secs: u64,
    },
    /// Verify a token and print its claims
    Verify {
        /// The token to check
        token: String,
    },
}

#[derive(Debug)]
struct RuntimeContext {
    common: CommonOpts,
    config_path: PathBuf,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let config_path = resolve_config_path(common.config.as_deref())?;
        let config = AppConfig::load(Some(&config_path))
            .with_context(|| format!("loading config from {}", config_path.display()))?;
        Ok(Self {
            common,
            config_path,
            config,
        })
    }

    fn init_logging(&self) {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        let level = self.effective_log_level();
        if level == LevelFilter::OFF {
            return;
        }

        let level = level.to_string().to_lowercase();
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{APP_NAME}={level},tower_http={level}"))
        });

        // JSON output from either the flag or config, otherwise pretty format
        if self.common.json || self.config.logging.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            let force_color = matches!(self.common.color, ColorOption::Always)
                || env::var_os("FORCE_COLOR").is_some();
            let disable_color = self.common.no_color
                || matches!(self.common.color, ColorOption::Never)
                || env::var_os("NO_COLOR").is_some()
                || (!force_color && !io::stderr().is_terminal());

            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(!disable_color),
                )
                .try_init()
                .ok();
        }
    }

    fn effective_log_level(&self) -> LevelFilter {
        if self.common.quiet {
            LevelFilter::OFF
        } else if self.common.trace {
            LevelFilter::TRACE
        } else if self.common.debug {
            LevelFilter::DEBUG
        } else {
            match self.common.verbose {
                0 => self
                    .config
                    .logging
                    .level
                    .parse()
                    .unwrap_or(LevelFilter::INFO),
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        }
    }
}

async fn handle_serve(ctx: &RuntimeContext, cmd: ServeCommand) -> Result<()> {
    let config = &ctx.config;
    config.validate().context("invalid configuration")?;

    let state = AppState::from_config(config)?;
    if !state.verifier.is_configured() {
        warn!("auth.jwt_secret is not set; every protected request will fail");
    }

    info!(
        environment = %config.environment,
        upstream = %state.upstream.base_url(),
        resources = state.resources.len(),
        "starting gateway"
    );

    let host = cmd.host.unwrap_or_else(|| config.server.host.clone());
    let port = cmd.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            let redacted = ctx.config.redacted();
            if ctx.common.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&redacted)
                        .context("serializing config to JSON")?
                );
            } else {
                println!(
                    "{}",
                    toml::to_string_pretty(&redacted).context("serializing config to TOML")?
                );
            }
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.config_path.display());
            Ok(())
        }
        ConfigCommand::Init { force } => {
            if ctx.config_path.exists() && !force {
                bail!(
                    "config already exists at {} (use --force to overwrite)",
                    ctx.config_path.display()
                );
            }
            write_default_config(&ctx.config_path)?;
            info!("wrote default config to {}", ctx.config_path.display());
            Ok(())
        }
    }
}

fn handle_token(ctx: &RuntimeContext, command: TokenCommand) -> Result<()> {
    let verifier =
        TokenVerifier::from_config(&ctx.config.auth).context("resolving auth.jwt_secret")?;
    if !verifier.is_configured() {
        bail!("auth.jwt_secret is not set");
    }

    match command {
        TokenCommand::Mint { sub, ttl_secs } => {
            let token = verifier.mint(&sub, Duration::from_secs(ttl_secs))?;
            println!("{token}");
            Ok(())
        }
        TokenCommand::Verify { token } => match verifier.verify(&token) {
            Verification::Valid(claims) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&claims).context("serializing claims")?
                );
                Ok(())
            }
            Verification::Rejected(rejection) => Err(anyhow!("token rejected: {rejection}")),
        },
    }
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(args: &[&str]) -> RuntimeContext {
        let cli = Cli::parse_from(args);
        RuntimeContext {
            common: cli.common,
            config_path: PathBuf::new(),
            config: AppConfig::default(),
        }
    }

    #[test]
    fn test_quiet_turns_logging_off() {
        let ctx = context(&["tradegate", "--quiet", "config", "path"]);
        assert_eq!(ctx.effective_log_level(), LevelFilter::OFF);

        // Quiet wins over any verbosity flag.
        let ctx = context(&["tradegate", "-q", "--trace", "-vv", "config", "path"]);
        assert_eq!(ctx.effective_log_level(), LevelFilter::OFF);
    }

    #[test]
    fn test_verbosity_flags() {
        let ctx = context(&["tradegate", "config", "path"]);
        assert_eq!(ctx.effective_log_level(), LevelFilter::INFO);

        let ctx = context(&["tradegate", "-v", "config", "path"]);
        assert_eq!(ctx.effective_log_level(), LevelFilter::DEBUG);

        let ctx = context(&["tradegate", "--trace", "config", "path"]);
        assert_eq!(ctx.effective_log_level(), LevelFilter::TRACE);
    }
}
