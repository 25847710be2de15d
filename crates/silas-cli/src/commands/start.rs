//! `silas start` — load config, wire every crate, rehydrate, then run the
//! orchestrator's listen loop against the stdio channel.

use crate::agents::{EchoProxyAgent, NoSuggestionEngine, StubPlannerAgent};
use crate::approval::SignedApprovalVerifier;
use crate::audit::ChainedAuditLog;
use crate::channel::StdioChannel;
use crate::gates::build_system_gates;
use crate::skills::NullSkillExecutor;
use silas_access::AccessController;
use silas_config::types::Tier2Strategy;
use silas_config::Config;
use silas_context::{ContextManager, LocalScorer};
use silas_core::ports::{ChannelAdapter, InboundMessage};
use silas_crypto::KeyPair;
use silas_executor::{ShellBackend, PythonBackend, SandboxVerificationRunner, WorkItemExecutor};
use silas_gate::GateRunner;
use silas_orchestrator::Orchestrator;
use silas_sandbox::SandboxManager;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const SIGNING_PASSPHRASE_VAR: &str = "SILAS_SIGNING_PASSPHRASE";
const APPROVAL_TOKEN_TTL_SECS: i64 = 3_600;

fn install_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Derive the runtime's signing key from `SILAS_SIGNING_PASSPHRASE`, or
/// generate an ephemeral one (logged as a warning) if it isn't set.
fn load_signing_key() -> KeyPair {
    match std::env::var(SIGNING_PASSPHRASE_VAR) {
        Ok(passphrase) => {
            let derived = blake3::hash(passphrase.as_bytes());
            KeyPair::from_bytes(derived.as_bytes())
        }
        Err(_) => {
            tracing::warn!(
                "{SIGNING_PASSPHRASE_VAR} not set; generating an ephemeral signing key. \
                 Approval tokens issued this run will not validate after a restart."
            );
            KeyPair::generate()
        }
    }
}

/// Run `silas start`. Returns the process exit code: `0` on a clean stdin
/// close, `2` if wiring the runtime fails.
pub async fn run_start(config_path: Option<&Path>) -> i32 {
    let config = match silas_config::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return 1;
        }
    };

    install_tracing(&config);
    tracing::info!(data_dir = %config.runtime.data_dir, "starting silas");

    match run_wired(config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "runtime error");
            2
        }
    }
}

async fn run_wired(config: Config) -> anyhow::Result<()> {
    let data_dir = Path::new(&config.runtime.data_dir);
    std::fs::create_dir_all(data_dir)?;

    let sandbox = Arc::new(SandboxManager::new(config.sandbox.base_dir.clone())?);

    let scorer: Arc<dyn silas_context::Tier2Scorer> = match config.context.tier2_strategy {
        Tier2Strategy::Local => Arc::new(LocalScorer),
        Tier2Strategy::AdvisoryLlm => {
            tracing::warn!("context.tier2_strategy = advisory_llm requested but no LLM scorer client is wired; falling back to the local scorer");
            Arc::new(LocalScorer)
        }
    };
    let context = Arc::new(ContextManager::new(config.context.budget.clone(), scorer)?);

    let gates = Arc::new(GateRunner::new());
    let system_gates = build_system_gates(&config.gates);

    let access = Arc::new(AccessController::new("owner", &config.access)?);

    let verify_dir = data_dir.join("sandbox/verify");
    let verification = Arc::new(SandboxVerificationRunner::new(Arc::clone(&sandbox), verify_dir, &[])?);

    let audit: Arc<dyn silas_core::ports::AuditLog> = Arc::new(ChainedAuditLog::new());
    let signing_key = load_signing_key();
    let approval = Arc::new(SignedApprovalVerifier::new(signing_key, chrono::Duration::seconds(APPROVAL_TOKEN_TTL_SECS)));

    let work_items: Arc<dyn silas_core::ports::WorkItemStore> = Arc::new(silas_test::FakeWorkItemStore::new());
    let chronicle: Arc<dyn silas_core::ports::ChronicleStore> = Arc::new(silas_test::FakeChronicleStore::new());
    let memory: Arc<dyn silas_core::ports::MemoryStore> = Arc::new(silas_test::FakeMemoryStore::new());

    let executor = Arc::new(
        WorkItemExecutor::new(
            Arc::new(NullSkillExecutor),
            Arc::clone(&work_items),
            Arc::new(ShellBackend::new(Arc::clone(&sandbox))),
            Arc::new(PythonBackend::new(Arc::clone(&sandbox), "python3")),
        )
        .with_approval_verifier(Arc::clone(&approval))
        .with_verification_runner(verification)
        .with_audit(Arc::clone(&audit)),
    );

    let known_tools: Vec<String> = config
        .access
        .levels
        .iter()
        .flat_map(|l| l.tools.iter().cloned())
        .filter(|t| t != "*")
        .collect();

    let channel: Arc<dyn silas_core::ports::ChannelAdapter> = Arc::new(StdioChannel::new());

    let orchestrator = Orchestrator::new(
        Arc::clone(&channel),
        context,
        gates,
        access,
        executor,
        chronicle,
        memory,
        audit,
        work_items,
        Arc::new(EchoProxyAgent),
        Arc::new(StubPlannerAgent),
        Arc::new(NoSuggestionEngine),
        system_gates,
        known_tools,
        crate::channel::STDIO_CONNECTION_ID,
        approval,
        chrono::Duration::seconds(config.runtime.approval_wait_secs as i64),
    );

    orchestrator.rehydrate(&[]).await?;

    println!("silas is listening (type a message, or close stdin to exit)");
    loop {
        let (message, connection_id): (InboundMessage, String) = match channel.recv().await {
            Ok(next) => next,
            Err(e) => {
                tracing::info!(error = %e, "channel closed, shutting down");
                return Ok(());
            }
        };
        if let Err(e) = orchestrator.process_turn(message, &connection_id).await {
            tracing::error!(error = %e, connection_id, "turn processing failed");
        }
    }
}
