//! redpen entrypoint.
mod view;

use std::fmt;
use std::future::Future;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use core_config::{Config, load_from};
use core_diff::DiffStats;
use core_events::{
    ErrorKind, SessionEvent, SessionEventKind, SessionId, TelemetrySnapshot, session_channel,
};
use core_service::{CorrectionService, OpenAiService, ScriptedService};
use core_session::SessionController;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use unicode_segmentation::UnicodeSegmentation;

use crate::view::{DiffView, DisplayMode, error_hint};

const LOG_FILE: &str = "redpen.log";
const DEMO_ORIGINAL: &str = "今天天氣很好，我想去公圓走走。";
const DEMO_CORRECTED: &str = "今天天氣很好，我想去公園走走。";
const DEMO_FRAGMENT_GRAPHEMES: usize = 2;
const DEMO_FRAGMENT_DELAY: Duration = Duration::from_millis(80);

#[inline]
fn log_input_loaded(source: InputSource, text: &str) {
    debug!(
        target: "runtime.input",
        source = source.as_str(),
        size_bytes = text.len(),
        grapheme_count = text.graphemes(true).count(),
        "input_loaded"
    );
}

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "redpen", version, about = "Proofread text and show the corrections inline")]
struct Args {
    /// Text to proofread. Read from --file or stdin when omitted.
    pub text: Option<String>,
    /// Read the text to proofread from a file.
    #[arg(long, short = 'f', conflicts_with = "text")]
    pub file: Option<PathBuf>,
    /// Optional configuration file path (overrides discovery of `redpen.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Graphemes of new output between intermediate diffs.
    #[arg(long)]
    pub threshold: Option<usize>,
    /// Replay a built-in correction without contacting any service.
    #[arg(long, conflicts_with_all = ["text", "file"])]
    pub demo: bool,
    /// Use text markers instead of colors. Implied when stdout is not a terminal.
    #[arg(long)]
    pub plain: bool,
    /// Print only the corrected text once settled.
    #[arg(long)]
    pub corrected_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputSource {
    Argument,
    File,
    Stdin,
    Demo,
}

impl InputSource {
    fn as_str(&self) -> &'static str {
        match self {
            InputSource::Argument => "argument",
            InputSource::File => "file",
            InputSource::Stdin => "stdin",
            InputSource::Demo => "demo",
        }
    }
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

struct Bootstrap {
    args: Args,
    config: Config,
    original: String,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn run(&mut self) -> Result<Bootstrap> {
        self.configure_logging()?;
        Self::install_panic_hook();
        info!(target: "runtime", "startup");

        let args = Args::parse();
        let mut config = load_from(args.config.clone())?;
        if let Some(threshold) = args.threshold {
            config.override_compare_threshold(threshold);
        }
        let (source, original) = Self::read_original(&args)?;
        log_input_loaded(source, &original);

        info!(
            target: "runtime.startup",
            config_path = config.path.as_ref().map(|p| p.display().to_string()).as_deref(),
            config_override = args.config.is_some(),
            demo = args.demo,
            "bootstrap_complete"
        );
        Ok(Bootstrap {
            args,
            config,
            original,
        })
    }

    fn configure_logging(&mut self) -> Result<()> {
        let log_dir = Path::new(".");
        let log_path = log_dir.join(LOG_FILE);
        if log_path.exists() {
            let _ = std::fs::remove_file(&log_path);
        }

        let file_appender = tracing_appender::rolling::never(log_dir, LOG_FILE);
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .with_ansi(false)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global tracing subscriber already installed; drop guard so writer shuts down.
            }
        }

        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }

    fn read_original(args: &Args) -> Result<(InputSource, String)> {
        if args.demo {
            return Ok((InputSource::Demo, DEMO_ORIGINAL.to_string()));
        }
        if let Some(text) = args.text.as_ref() {
            return Ok((InputSource::Argument, text.clone()));
        }
        if let Some(path) = args.file.as_ref() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            return Ok((InputSource::File, text));
        }
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        Ok((InputSource::Stdin, text))
    }
}

/// Demo backend: streams [`DEMO_CORRECTED`] a couple of graphemes at a time.
fn demo_service() -> ScriptedService {
    let graphemes: Vec<&str> = DEMO_CORRECTED.graphemes(true).collect();
    let fragments: Vec<String> = graphemes
        .chunks(DEMO_FRAGMENT_GRAPHEMES)
        .map(|chunk| chunk.concat())
        .collect();
    ScriptedService::from_fragments(fragments).with_delay(DEMO_FRAGMENT_DELAY)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Outcome {
    Settled,
    Failed { kind: ErrorKind, message: String },
    Interrupted,
    ChannelClosed,
}

impl Outcome {
    fn as_str(&self) -> &'static str {
        match self {
            Outcome::Settled => "settled",
            Outcome::Failed { .. } => "failed",
            Outcome::Interrupted => "interrupted",
            Outcome::ChannelClosed => "channel_closed",
        }
    }

    fn exit_status(&self) -> u8 {
        match self {
            Outcome::Settled => 0,
            Outcome::Failed { .. } | Outcome::ChannelClosed => 1,
            Outcome::Interrupted => 130,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct RewriteRuntime<S: CorrectionService, W: Write> {
    controller: SessionController<S>,
    rx: mpsc::Receiver<SessionEvent>,
    view: DiffView<W>,
    model: String,
    corrected_only: bool,
    stats: Option<DiffStats>,
}

impl<S: CorrectionService, W: Write> RewriteRuntime<S, W> {
    fn new(
        service: Arc<S>,
        config: &Config,
        view: DiffView<W>,
        model: impl Into<String>,
        corrected_only: bool,
    ) -> Self {
        let (tx, rx) = session_channel();
        Self {
            controller: SessionController::new(service, config.session_settings(), tx),
            rx,
            view,
            model: model.into(),
            corrected_only,
            stats: None,
        }
    }

    /// Drive one rewrite to completion, or until `interrupt` resolves.
    async fn run(&mut self, original: &str, interrupt: impl Future<Output = ()>) -> Result<Outcome> {
        let id = self.controller.start(original)?;
        let loop_span = tracing::debug_span!(target: "runtime", "event_loop", session = id.0);
        let outcome = self.event_loop(id, interrupt).instrument(loop_span).await?;

        match &outcome {
            Outcome::Settled => self.present_settled().await?,
            _ => self.view.abandon()?,
        }
        info!(target: "runtime", outcome = outcome.as_str(), "rewrite_finished");
        Ok(outcome)
    }

    async fn event_loop(&mut self, id: SessionId, interrupt: impl Future<Output = ()>) -> Result<Outcome> {
        tokio::pin!(interrupt);
        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = &mut interrupt => {
                    info!(target: "runtime", "interrupt_received");
                    self.controller.cancel().await;
                    break Outcome::Interrupted;
                }
                event = self.rx.recv() => event,
            };
            let Some(event) = event else {
                break Outcome::ChannelClosed;
            };
            if event.session != id {
                debug!(target: "runtime", stale = event.session.0, "stale_event_ignored");
                continue;
            }
            match event.kind {
                SessionEventKind::DiffUpdate(segments) => {
                    if !self.corrected_only {
                        self.view.update(segments)?;
                    }
                }
                SessionEventKind::StatsUpdate(stats) => self.stats = Some(stats),
                SessionEventKind::Error { kind, message } => break Outcome::Failed { kind, message },
                SessionEventKind::Settled => break Outcome::Settled,
                SessionEventKind::Cancelled => break Outcome::Interrupted,
            }
        };
        Ok(outcome)
    }

    async fn present_settled(&mut self) -> Result<()> {
        if !self.corrected_only {
            return Ok(self.view.settle(self.stats, &self.model)?);
        }
        let session = self.controller.join().await;
        match session.as_ref().and_then(|s| s.corrected_text()) {
            Some(text) => self.view.print_text(text)?,
            None => warn!(target: "runtime", "settled_without_text"),
        }
        Ok(())
    }

    async fn finalize_shutdown(&mut self, outcome: &Outcome) {
        info!(target: "runtime.shutdown", reason = outcome.as_str(), stage = "begin", "shutdown_stage");
        if self.controller.is_rewriting() {
            self.controller.cancel().await;
        } else if let Err(err) = tokio::time::timeout(Duration::from_millis(200), self.controller.join()).await {
            warn!(target: "runtime.shutdown", ?err, "session_join_timeout");
        }
        let telemetry = TelemetrySnapshot::capture();
        info!(
            target: "runtime.shutdown",
            started = telemetry.sessions_started,
            settled = telemetry.sessions_settled,
            failed = telemetry.sessions_failed,
            cancelled = telemetry.sessions_cancelled,
            timed_out = telemetry.sessions_timed_out,
            fragments = telemetry.fragments_received,
            recomputes = telemetry.diff_recomputes,
            "telemetry"
        );
        info!(target: "runtime.shutdown", reason = outcome.as_str(), stage = "end", "shutdown_stage");
    }
}

fn report_failure(outcome: &Outcome) {
    if let Outcome::Failed { kind, message } = outcome {
        eprintln!("錯誤: {message}");
        if let Some(hint) = error_hint(*kind) {
            eprintln!("{hint}");
        }
    }
}

async fn run_with<S: CorrectionService>(
    service: Arc<S>,
    model: String,
    boot: &Bootstrap,
) -> Result<ExitCode> {
    let stdout = io::stdout();
    let mode = if boot.args.plain || !stdout.is_terminal() {
        DisplayMode::Plain
    } else {
        DisplayMode::Styled
    };
    let view = DiffView::new(stdout.lock(), mode);
    let mut runtime = RewriteRuntime::new(service, &boot.config, view, model, boot.args.corrected_only);
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target: "runtime", ?err, "ctrl_c_listener_failed");
            std::future::pending::<()>().await;
        }
    };
    let outcome = runtime.run(&boot.original, interrupt).await?;
    runtime.finalize_shutdown(&outcome).await;
    report_failure(&outcome);
    Ok(ExitCode::from(outcome.exit_status()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut startup = AppStartup::new();
    let boot = startup.run()?;

    if boot.args.demo {
        return run_with(Arc::new(demo_service()), "demo".to_string(), &boot).await;
    }
    let settings = boot.config.file.service.clone();
    let service = match OpenAiService::new(settings, boot.config.api_key()) {
        Ok(service) => service,
        Err(err) => {
            error!(target: "runtime.startup", error = %err, "service_unavailable");
            eprintln!("錯誤: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let model = service.model().to_string();
    run_with(Arc::new(service), model, &boot).await
}
