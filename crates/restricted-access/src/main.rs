mod cli;
mod config;

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use access_gate::endpoint::decode_path;
use access_gate::{
    EndpointResolver, GateState, Gateway, GatewayConfig, TrustedHeaderResolver, Upstream,
};
use access_policy::{Decision, IdentityDescriptor, PolicyEngine, SharedEngine};
use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource};

use crate::cli::{Cli, Command, EvalArgs};
use crate::config::Config;

const COMPONENT: &str = "restricted-access";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(ref policy) = cli.policy {
        cfg.policy_file = policy.clone();
    }
    if let Some(ref listen) = cli.listen {
        cfg.network.listen_addr = listen.clone();
    }
    if let Some(ref upstream) = cli.upstream {
        cfg.network.upstream_url = upstream.clone();
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command() {
        Command::Serve => serve(&cli, cfg).await,
        Command::Check => check(&cfg),
        Command::Eval(args) => eval(&cfg, args),
    }
}

/// Load and compile the policy file; any failure is fatal.
fn load_engine(path: &Path) -> Result<PolicyEngine> {
    let policy = access_policy::loader::load_policy(path).context("failed to load policy file")?;
    PolicyEngine::new(policy)
        .with_context(|| format!("failed to compile policy file: {}", path.display()))
}

fn check(cfg: &Config) -> Result<()> {
    let engine = load_engine(&cfg.policy_file)?;
    info!(policy_file = %cfg.policy_file.display(), ?engine, "policy ok");
    println!("{}: ok", cfg.policy_file.display());
    Ok(())
}

fn eval(cfg: &Config, args: &EvalArgs) -> Result<()> {
    let engine = load_engine(&cfg.policy_file)?;
    let endpoints = EndpointResolver::new(cfg.login_url.as_str());
    let decision = evaluate_args(&engine, &endpoints, args)?;

    let report = serde_json::json!({
        "outcome": decision.outcome,
        "denial": decision.denial,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Build descriptors from the `eval` arguments and run the engine once. The
/// path is percent-decoded like a live request.
fn evaluate_args(
    engine: &PolicyEngine,
    endpoints: &EndpointResolver,
    args: &EvalArgs,
) -> Result<Decision> {
    let Some(path) = decode_path(&args.path) else {
        bail!("path does not decode to UTF-8: {}", args.path);
    };
    let mut request = endpoints.describe(&path);
    if let Some(endpoint) = &args.endpoint {
        request = request.with_endpoint(endpoint.as_str());
    }
    if let Some(action) = &args.action {
        request = request.with_api_action(action.as_str());
    }

    let identity = match &args.user {
        None => IdentityDescriptor::Anonymous,
        Some(name) if args.sysadmin => IdentityDescriptor::super_admin(name.as_str()),
        Some(name) => IdentityDescriptor::user(name.as_str()),
    };

    Ok(engine.evaluate(&request, &identity))
}

async fn serve(cli: &Cli, cfg: Config) -> Result<()> {
    info!(
        config_file = %cli.config.display(),
        policy_file = %cfg.policy_file.display(),
        listen = %cfg.network.listen_addr,
        upstream = %cfg.network.upstream_url,
        "restricted-access starting"
    );

    // 4. Start audit logger.
    let (audit, audit_handle) = AuditSink::start(&cfg.logging.audit_log_path)
        .await
        .context("failed to start audit logger")?;

    audit
        .log(AuditEntry::new(
            AuditEventType::ProcessStarted,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config_file": cli.config.display().to_string(),
            }),
        ))
        .await;

    // 5-8. Load the policy and serve until shutdown.
    let result = run_gateway(&cfg, &audit).await;

    // 9. Log shutdown, including startup failures, and flush the audit log.
    info!("restricted-access shutting down");

    let details = match &result {
        Ok(()) => serde_json::json!({ "result": "ok" }),
        Err(err) => serde_json::json!({ "result": "error", "error": format!("{err:#}") }),
    };
    audit
        .log(AuditEntry::new(
            AuditEventType::ProcessStopped,
            AuditSource::new(COMPONENT),
            details,
        ))
        .await;

    drop(audit);
    if let Err(err) = audit_handle.await {
        warn!(%err, "audit writer ended abnormally");
    }

    result
}

async fn run_gateway(cfg: &Config, audit: &AuditSink) -> Result<()> {
    // 5. Load policy engine before anything binds.
    let engine = load_engine(&cfg.policy_file)?;
    info!(policy_file = %cfg.policy_file.display(), ?engine, "policy engine loaded");
    let engine = SharedEngine::new(engine);

    audit
        .log(AuditEntry::new(
            AuditEventType::PolicyLoaded,
            AuditSource::new(COMPONENT),
            serde_json::json!({
                "policy_file": cfg.policy_file.display().to_string(),
            }),
        ))
        .await;

    // 6. Build the gateway.
    let listen_addr: SocketAddr = cfg
        .network
        .listen_addr
        .parse()
        .context("invalid listen address")?;
    let upstream =
        Upstream::new(&cfg.network.upstream_url).context("failed to build upstream client")?;
    let identities = TrustedHeaderResolver::new(
        &cfg.identity.user_header,
        cfg.identity.sysadmins.iter().cloned(),
    )
    .with_context(|| format!("invalid identity header: {}", cfg.identity.user_header))?;

    let state = GateState::new(
        engine.clone(),
        EndpointResolver::new(cfg.login_url.as_str()),
        Arc::new(identities),
    )
    .with_audit(audit.clone());

    let gateway = Gateway::new(GatewayConfig {
        listen_addr,
        state,
        upstream,
    });

    // 7. Signals: SIGINT/SIGTERM shut down, SIGHUP reloads the policy.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    tokio::spawn(wait_for_shutdown(shutdown_tx.clone()));

    let reload_task = tokio::spawn(reload_on_hangup(
        cfg.policy_file.clone(),
        engine,
        audit.clone(),
        shutdown_tx.subscribe(),
    ));

    // 8. Serve until shutdown.
    let mut shutdown_rx = shutdown_tx.subscribe();
    let result = gateway
        .run(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await;

    if result.is_err() {
        let _ = shutdown_tx.send(());
    }
    if let Err(err) = reload_task.await {
        warn!(%err, "reload task ended abnormally");
    }

    result
}

/// Broadcast shutdown on ctrl-c or SIGTERM.
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler");
                ctrl_c.await.ok();
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }

    let _ = shutdown_tx.send(());
}

/// Reload the policy file on every SIGHUP until shutdown.
#[cfg(unix)]
async fn reload_on_hangup(
    policy_file: std::path::PathBuf,
    engine: SharedEngine,
    audit: AuditSink,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(err) => {
            warn!(%err, "failed to register SIGHUP handler; policy reload disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return,
            received = hangup.recv() => {
                if received.is_none() {
                    return;
                }
                info!(policy_file = %policy_file.display(), "received SIGHUP; reloading policy");
                reload_policy(&policy_file, &engine, &audit);
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(
    _policy_file: std::path::PathBuf,
    _engine: SharedEngine,
    _audit: AuditSink,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let _ = shutdown_rx.recv().await;
}

/// Swap in a freshly compiled policy. On failure the running snapshot is
/// kept. Returns whether the swap happened.
fn reload_policy(policy_file: &Path, engine: &SharedEngine, audit: &AuditSink) -> bool {
    let details = serde_json::json!({ "policy_file": policy_file.display().to_string() });

    match load_engine(policy_file) {
        Ok(fresh) => {
            info!(engine = ?fresh, "policy reloaded");
            engine.replace(fresh);
            audit.try_log(AuditEntry::new(
                AuditEventType::PolicyReloaded,
                AuditSource::new(COMPONENT),
                details,
            ));
            true
        }
        Err(err) => {
            let message = format!("{err:#}");
            error!(error = %message, "policy reload failed; keeping current policy");
            let mut details = details;
            details["error"] = serde_json::Value::String(message);
            audit.try_log(AuditEntry::new(
                AuditEventType::PolicyReloadFailed,
                AuditSource::new(COMPONENT),
                details,
            ));
            false
        }
    }
}
