//! HintLoop CLI
//!
//! Main entry point for working against the hint orchestration backend.

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use hintloop_client::HintClient;
use hintloop_core::{
    merge, BlockReason, Config, EscalationForm, HintSession, HintType, HistoryKind, QuotaInfo,
    RatingOutcome, RequestDecision,
};
use hintloop_proxy::{create_router, AppState};
use hintloop_report::{notebook, TimelineGenerator};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the local notebook proxy.
const DEFAULT_PROXY_PORT: u16 = 8020;

/// HintLoop - AI Hint Client
///
/// Requests AI-generated hints for programming problems, runs student
/// programs against the backend's tests, and escalates unhelpful hints to
/// human instructors.
#[derive(Parser, Debug)]
#[command(name = "hintloop")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: hintloop.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Student id override
    #[arg(short, long, value_name = "ID", global = true)]
    student: Option<String>,

    /// Backend base URL override
    #[arg(short, long, value_name = "URL", global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the available problems, or show one problem in detail
    Problems {
        /// Show this problem's description and starter code
        problem_id: Option<String>,
    },

    /// Run a program against a problem's tests and wait for the result
    Run {
        /// The problem to run against
        problem_id: String,
        /// Program file (default: the saved draft for this problem)
        file: Option<PathBuf>,
    },

    /// Request an AI hint and walk the full lifecycle interactively
    Hint {
        /// The problem the hint is about
        problem_id: String,
        /// Hint category: plan, debug, or optimize
        hint_type: HintType,
        /// Program file (default: the saved draft for this problem)
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Show the hint-and-feedback timeline for a problem
    History {
        /// The problem to show history for
        problem_id: String,
    },

    /// Show the remaining hint allowance for a problem
    Quota {
        /// The problem to show quota for
        problem_id: String,
    },

    /// Instructor-side operations
    Instructor {
        #[command(subcommand)]
        command: InstructorCommand,
    },

    /// Serve the local notebook proxy
    Proxy {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PROXY_PORT)]
        port: u16,
    },
}

#[derive(Subcommand, Debug)]
enum InstructorCommand {
    /// Pop the next escalation and download the student's notebook
    Fetch,

    /// Respond to an escalation with written feedback
    Respond {
        /// The escalation's instructor request id
        id: u64,
        /// Feedback text, or a path to a file containing it
        feedback: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing subscriber with appropriate filter
    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, applies overrides, and dispatches the subcommand.
async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    // Apply CLI argument overrides
    if let Some(ref student) = args.student {
        config.student_id = Some(student.clone());
    }
    if let Some(ref base_url) = args.base_url {
        config.base_url.clone_from(base_url);
    }

    // Re-validate after overrides
    config.validate()?;

    let client = HintClient::new(&config);

    match args.command {
        Command::Problems { problem_id } => cmd_problems(&client, problem_id.as_deref()).await,
        Command::Run { problem_id, file } => {
            cmd_run(&client, &config, &problem_id, file.as_deref()).await
        }
        Command::Hint {
            problem_id,
            hint_type,
            file,
        } => cmd_hint(&client, &config, &problem_id, hint_type, file.as_deref()).await,
        Command::History { problem_id } => cmd_history(&client, &config, &problem_id).await,
        Command::Quota { problem_id } => cmd_quota(&client, &config, &problem_id).await,
        Command::Instructor { command } => match command {
            InstructorCommand::Fetch => cmd_instructor_fetch(&client, &config).await,
            InstructorCommand::Respond { id, feedback } => {
                cmd_instructor_respond(&client, &config, id, &feedback).await
            }
        },
        Command::Proxy { port } => cmd_proxy(client, &config, port).await,
    }
}

// ============================================================================
// Subcommands
// ============================================================================

/// Lists the available problems, or prints one problem's description and
/// starter code.
async fn cmd_problems(client: &HintClient, problem_id: Option<&str>) -> anyhow::Result<()> {
    if let Some(problem_id) = problem_id {
        let problem = client.fetch_problem(problem_id).await?;
        println!("{}", problem.display_name());
        if let Some(description) = &problem.task_description {
            println!();
            print_quoted(description);
        }
        if let Some(template) = &problem.template_code {
            println!();
            println!("Starter code:");
            print_quoted(template);
        }
        return Ok(());
    }

    let problems = client.fetch_problems().await?;

    if problems.is_empty() {
        println!("No problems available.");
        return Ok(());
    }

    println!("Available problems:");
    for problem in &problems {
        if problem.name.as_deref().is_some_and(|n| n != problem.problem_id) {
            println!("  {} - {}", problem.problem_id, problem.display_name());
        } else {
            println!("  {}", problem.problem_id);
        }
    }
    Ok(())
}

/// Runs a program against a problem's tests and prints the verdict.
async fn cmd_run(
    client: &HintClient,
    config: &Config,
    problem_id: &str,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let program = load_program(config, problem_id, file)?;

    println!("Running against '{problem_id}'...");
    let result = client
        .execute_program(problem_id, &program, config.student_id.as_deref())
        .await?;

    println!();
    if result.correctness {
        println!("Correct ({:.2}s)", result.elapsed_time);
    } else {
        println!("Incorrect ({:.2}s)", result.elapsed_time);
        if let Some(output) = &result.buggy_output {
            println!();
            println!("Output:");
            for line in output.lines() {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

/// Walks the full hint lifecycle: consent gate, backend request, reflection
/// prompt, polling with Ctrl-C cancellation, then rating and escalation.
#[allow(clippy::too_many_lines)]
async fn cmd_hint(
    client: &HintClient,
    config: &Config,
    problem_id: &str,
    hint_type: HintType,
    file: Option<&Path>,
) -> anyhow::Result<()> {
    let student_id = require_student(config)?;
    let program = load_program(config, problem_id, file)?;

    // Assemble the session from server truth: quota, first-time status,
    // and the existing timeline.
    let quota = client.quota_left(&student_id, problem_id).await?;
    let ever_requested = client.has_ever_requested(&student_id).await?;
    let mut session = HintSession::new(&student_id, problem_id, quota, !ever_requested);
    session.load_history(fetch_history(client, &student_id, problem_id).await?);

    // Local gate first; nothing is sent while it refuses. An unrated item
    // left over from an earlier run can be rated on the spot, which clears
    // the block and re-runs the gate.
    loop {
        match session.request_hint(hint_type) {
            RequestDecision::Proceed => break,
            RequestDecision::ConsentRequired => {
                println!("This sends your program to an AI model to generate a hint.");
                println!("AI-generated hints can be wrong or misleading; use your own judgment.");
                if prompt_yes_no("Continue?")? {
                    session.grant_consent()?;
                    break;
                }
                session.decline_consent();
                println!("No hint requested.");
                return Ok(());
            }
            RequestDecision::Blocked(BlockReason::UnratedActiveItem) => {
                if !rate_blocking_item(client, config, &mut session, problem_id).await? {
                    return Ok(());
                }
            }
            RequestDecision::Blocked(reason) => {
                println!("{}", reason.message());
                return Ok(());
            }
        }
    }

    let request_id = client
        .add_hint_request(&student_id, problem_id, hint_type, &program)
        .await?;
    session.request_created(request_id, hint_type, Utc::now())?;

    // Reflection step. The answer may be empty; only an explicit 'q'
    // abandons the request (no refund).
    let question = hint_type.reflection_question();
    println!();
    println!("{question}");
    println!("(An empty answer is fine; type 'q' to cancel the request.)");
    let answer = prompt("> ")?;
    match reflection_action(&answer) {
        ReflectionAction::Cancel => {
            session.cancel_reflection();
            client.cancel_request_best_effort(request_id).await;
            println!("Hint request cancelled.");
            return Ok(());
        }
        ReflectionAction::Submit(answer) => {
            client.add_reflection(request_id, question, &answer).await?;
            session.submit_reflection()?;
        }
    }

    if let Some(line) = session.status_line() {
        println!();
        println!("{line}... (Ctrl+C to cancel)");
    }

    // Poll until resolution, racing against Ctrl-C. The driver future is
    // dropped when the signal wins, releasing the session for cleanup.
    let interrupted = {
        let drive = hintloop_client::drive_to_resolution(client, &mut session);
        tokio::pin!(drive);
        tokio::select! {
            result = &mut drive => {
                result?;
                false
            }
            _ = tokio::signal::ctrl_c() => true,
        }
    };
    if interrupted {
        println!();
        println!("Cancelling...");
        for id in session.cancel_all() {
            client.cancel_request_best_effort(id).await;
        }
        println!("Hint request cancelled.");
        return Ok(());
    }

    let Some(item) = session.active_item() else {
        // Resolution always leaves an active item; reaching here means the
        // request was cancelled out from under us.
        println!("No hint was produced.");
        return Ok(());
    };

    println!();
    println!("{}:", item.label());
    if let Some(content) = &item.content {
        print_quoted(content);
    }

    // Rating, then the escalation offer for unhelpful AI hints.
    println!();
    let helpful = prompt_yes_no("Was this hint helpful?")?;
    client.save_hint_rating(request_id, helpful).await?;

    if let RatingOutcome::OfferEscalation { ai_request_id } = session.rate_active(helpful)? {
        offer_escalation(client, config, &mut session, ai_request_id, problem_id).await?;
    }

    println!();
    print_quota(session.quota());
    Ok(())
}

/// Shows the unrated item blocking a new request and offers to rate it
/// now, saving the rating to the backend side that owns the item. Returns
/// whether a rating was recorded.
async fn rate_blocking_item(
    client: &HintClient,
    config: &Config,
    session: &mut HintSession,
    problem_id: &str,
) -> anyhow::Result<bool> {
    let Some(item) = session.active_item() else {
        return Ok(false);
    };
    let (kind, id, label) = (item.kind, item.id, item.label());
    let content = item.content.clone();

    println!("{}", BlockReason::UnratedActiveItem.message());
    println!();
    println!("Awaiting rating: {label}");
    if let Some(content) = &content {
        print_quoted(content);
    }

    println!();
    if !prompt_yes_no("Rate it now?")? {
        return Ok(false);
    }
    let helpful = prompt_yes_no("Was it helpful?")?;
    match kind {
        HistoryKind::Ai => client.save_hint_rating(id, helpful).await?,
        HistoryKind::Instructor => client.save_feedback_rating(id, helpful).await?,
    }

    if let RatingOutcome::OfferEscalation { ai_request_id } = session.rate_active(helpful)? {
        offer_escalation(client, config, session, ai_request_id, problem_id).await?;
    }
    Ok(true)
}

/// Offers to escalate an unhelpful AI hint to a human instructor.
async fn offer_escalation(
    client: &HintClient,
    config: &Config,
    session: &mut HintSession,
    ai_request_id: u64,
    problem_id: &str,
) -> anyhow::Result<()> {
    println!();
    println!("You can ask a human instructor about this hint.");
    println!("Describe what is still unclear (leave blank to skip):");
    let notes = prompt("> ")?;
    if notes.trim().is_empty() {
        session.dismiss_active();
        println!("Not escalated.");
        return Ok(());
    }

    let form = EscalationForm {
        ai_request_id,
        notes: notes.trim().to_string(),
        email: config.student_email.clone(),
    };
    form.validate()?;
    client
        .request_instructor_feedback(form.ai_request_id, form.email.as_deref(), Some(&form.notes))
        .await?;
    session.escalation_sent();
    println!("Sent to an instructor. Check back with 'hintloop history {problem_id}'.");
    Ok(())
}

/// Prints the reconciled hint-and-feedback timeline as Markdown.
async fn cmd_history(
    client: &HintClient,
    config: &Config,
    problem_id: &str,
) -> anyhow::Result<()> {
    let student_id = require_student(config)?;
    let items = fetch_history(client, &student_id, problem_id).await?;
    let markdown = TimelineGenerator::new(problem_id, &items).generate();
    print!("{markdown}");
    Ok(())
}

/// Prints the remaining hint allowance for a problem.
async fn cmd_quota(client: &HintClient, config: &Config, problem_id: &str) -> anyhow::Result<()> {
    let student_id = require_student(config)?;
    let quota = client.quota_left(&student_id, problem_id).await?;
    print_quota(&quota);
    Ok(())
}

/// Pops the next escalation assigned to this instructor and downloads the
/// student's notebook.
async fn cmd_instructor_fetch(client: &HintClient, config: &Config) -> anyhow::Result<()> {
    let instructor_id = require_instructor(config)?;

    let Some(assignment) = client.fetch_instructor_request(&instructor_id).await? else {
        println!("No escalations waiting.");
        return Ok(());
    };

    println!("Escalation #{}", assignment.instructor_request_id);
    println!("  Problem: {}", assignment.problem_id);
    if let Some(hint_type) = &assignment.hint_type {
        println!("  Hint type: {hint_type}");
    }
    if let Some(notes) = assignment
        .student_notes
        .as_deref()
        .filter(|n| !n.trim().is_empty())
    {
        println!("  Student notes: {notes}");
    }

    if let Some(question) = &assignment.reflection_question {
        println!();
        println!("Reflection question: {question}");
        if let Some(answer) = &assignment.reflection_answer {
            println!("Student's answer: {answer}");
        }
    }

    if let Some(hint) = &assignment.ai_hint {
        println!();
        println!("The AI hint the student found unhelpful:");
        print_quoted(hint);
    }

    println!();
    println!("Student program:");
    print_quoted(&assignment.student_program);

    // The notebook payload arrives as a JSON string or an embedded object;
    // both are normalized to the same pretty-printed bytes.
    if let Some(payload) = &assignment.student_notebook {
        let pretty = notebook::pretty_notebook(payload)?;
        let dir = PathBuf::from(&config.output_dir);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(notebook::notebook_filename(&assignment.problem_id));
        std::fs::write(&path, pretty)?;
        println!();
        println!("Notebook saved to {}", path.display());
    }

    println!();
    println!(
        "Respond with: hintloop instructor respond {} <feedback|file>",
        assignment.instructor_request_id
    );
    Ok(())
}

/// Saves an instructor's written feedback for an escalation. The feedback
/// argument is taken literally unless it names an existing file.
async fn cmd_instructor_respond(
    client: &HintClient,
    config: &Config,
    instructor_request_id: u64,
    feedback: &str,
) -> anyhow::Result<()> {
    let instructor_id = require_instructor(config)?;

    let text = if Path::new(feedback).is_file() {
        std::fs::read_to_string(feedback)?
    } else {
        feedback.to_string()
    };

    client
        .save_instructor_feedback(instructor_request_id, &instructor_id, text.trim())
        .await?;
    println!("Feedback saved for escalation #{instructor_request_id}.");
    Ok(())
}

/// Serves the local notebook proxy until Ctrl-C.
async fn cmd_proxy(client: HintClient, config: &Config, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let state = AppState::new(client, config);
    let router = create_router(state);

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Notebook proxy running on http://{addr}/hintbot");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received Ctrl+C, shutting down");
        })
        .await?;
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// The student id, from `--student` or the config file.
fn require_student(config: &Config) -> anyhow::Result<String> {
    config
        .student_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No student id set\n\nSuggestion: Pass --student or set studentId in hintloop.json"
            )
        })
}

/// The instructor id from the config file.
fn require_instructor(config: &Config) -> anyhow::Result<String> {
    config
        .instructor_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No instructor id set\n\nSuggestion: Set instructorId in hintloop.json"
            )
        })
}

/// Fetches both history sources and reconciles them into one timeline.
async fn fetch_history(
    client: &HintClient,
    student_id: &str,
    problem_id: &str,
) -> anyhow::Result<Vec<hintloop_core::HistoryItem>> {
    let hints = client.query_all_hints(student_id, problem_id).await?;
    let feedback = client.query_all_feedback(student_id, problem_id).await?;
    Ok(merge(hints, feedback, Utc::now()))
}

/// Reads the program to submit: the given file, or the saved draft for
/// this (student, problem) pair. A file argument also refreshes the draft.
fn load_program(config: &Config, problem_id: &str, file: Option<&Path>) -> anyhow::Result<String> {
    if let Some(path) = file {
        let program = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read program file '{}': {e}", path.display())
        })?;
        save_draft(config, problem_id, &program);
        return Ok(program);
    }

    let path = draft_path(config, problem_id);
    match std::fs::read_to_string(&path) {
        Ok(program) => {
            println!("Using draft from {}", path.display());
            Ok(program)
        }
        Err(_) => anyhow::bail!(
            "No program given and no draft found at '{}'\n\nSuggestion: Pass a program file",
            path.display()
        ),
    }
}

/// Where the draft for this (student, problem) pair lives.
fn draft_path(config: &Config, problem_id: &str) -> PathBuf {
    let student = config.student_id.as_deref().unwrap_or("anonymous");
    PathBuf::from(&config.drafts_dir)
        .join(student)
        .join(format!("{problem_id}.py"))
}

/// Saves the draft. Best-effort: a failure is logged and never blocks the
/// request the program is for.
fn save_draft(config: &Config, problem_id: &str, program: &str) {
    let path = draft_path(config, problem_id);
    let result = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(&path, program));
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "failed to save draft");
    }
}

/// What to do with a reflection prompt answer.
#[derive(Debug, PartialEq, Eq)]
enum ReflectionAction {
    /// Submit the answer, possibly empty.
    Submit(String),
    /// Abandon the request.
    Cancel,
}

/// Maps the raw reflection line to an action. The answer may be empty;
/// only a lone 'q' cancels the request.
fn reflection_action(answer: &str) -> ReflectionAction {
    let trimmed = answer.trim();
    if trimmed.eq_ignore_ascii_case("q") {
        ReflectionAction::Cancel
    } else {
        ReflectionAction::Submit(trimmed.to_string())
    }
}

/// Prompts for one line of input.
fn prompt(label: &str) -> anyhow::Result<String> {
    print!("{label}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompts for a yes/no answer until one is given.
fn prompt_yes_no(label: &str) -> anyhow::Result<bool> {
    loop {
        let answer = prompt(&format!("{label} [y/n] "))?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

/// Prints multi-line text indented under the current heading.
fn print_quoted(text: &str) {
    for line in text.lines() {
        println!("  {line}");
    }
}

/// Prints a quota snapshot, one line per pool.
fn print_quota(quota: &QuotaInfo) {
    println!(
        "Hint quota for {} on '{}':",
        quota.student_id, quota.problem_id
    );
    println!(
        "  Overall:  {}",
        pool_line(quota.left.overall, quota.limits.overall)
    );
    println!(
        "  Plan:     {}",
        pool_line(quota.left.plan, quota.limits.plan)
    );
    println!(
        "  Debug:    {}",
        pool_line(quota.left.debug, quota.limits.debug)
    );
    println!(
        "  Optimize: {}",
        pool_line(quota.left.optimize, quota.limits.optimize)
    );
}

/// Formats one quota pool as `left of limit` or `unlimited`.
fn pool_line(left: Option<u32>, limit: Option<u32>) -> String {
    match (left, limit) {
        (Some(left), Some(limit)) => format!("{left} of {limit} left"),
        _ => "unlimited".to_string(),
    }
}
