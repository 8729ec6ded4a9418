//! campuslearn - escalation workflow CLI
//!
//! Admin and tutor operations for the chatbot-escalation workflow: triage
//! pending escalations, inspect tutor availability, assign (manually or
//! automatically), run the batch sweep, resolve, cancel, and view stats.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/campuslearn/data.db
//! - Logs: $XDG_STATE_HOME/campuslearn/campuslearn.log
//! - Config: $XDG_CONFIG_HOME/campuslearn/config.toml

use anyhow::{Context, Result};
use campuslearn_core::{
    Config, Database, Escalation, EscalationService, NewEscalation, Priority,
    TutorProfile,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "campuslearn")]
#[command(about = "CampusLearn escalation workflow")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List pending escalations in triage order
    Pending,
    /// List tutors with module coverage and current load
    Tutors {
        /// Filter to tutors covering this module code
        #[arg(long)]
        module: Option<String>,
    },
    /// Show a single escalation
    Show {
        /// Escalation id
        escalation_id: String,
    },
    /// Manually assign a tutor to a pending escalation
    Assign {
        /// Escalation id
        escalation_id: String,
        /// Tutor id
        tutor_id: String,
    },
    /// Auto-assign the least busy qualifying tutor
    AutoAssign {
        /// Escalation id
        escalation_id: String,
    },
    /// Auto-assign every matchable pending escalation
    Process,
    /// Resolve an assigned escalation
    Resolve {
        /// Escalation id
        escalation_id: String,
        /// Optional resolution note
        #[arg(long)]
        note: Option<String>,
    },
    /// Cancel a pending or assigned escalation
    Cancel {
        /// Escalation id
        escalation_id: String,
    },
    /// Escalation counts by status
    Stats,
    /// Record a new escalation (normally raised by the chatbot)
    CreateEscalation {
        /// Student id
        #[arg(long)]
        student: String,
        /// The question the chatbot could not resolve
        #[arg(long)]
        question: String,
        /// Module code, e.g. BCS101
        #[arg(long)]
        module: Option<String>,
        /// Why the chatbot escalated
        #[arg(long)]
        reason: Option<String>,
        /// Priority: low, medium, or high
        #[arg(long, default_value = "medium")]
        priority: String,
        /// Chatbot conversation id
        #[arg(long, default_value = "manual")]
        conversation: String,
    },
    /// Add or update a tutor in the directory
    AddTutor {
        /// Tutor id
        tutor_id: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        /// Module codes the tutor covers (repeatable)
        #[arg(long = "module")]
        modules: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        campuslearn_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("campuslearn CLI starting");

    // Open database at XDG-compliant path
    let db_path = Config::database_path();
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Arc::new(Database::open(&db_path).context("failed to open database")?);
    db.migrate().context("failed to run database migrations")?;

    let service = EscalationService::new(Arc::clone(&db), config.matching.clone());

    match args.command {
        Command::Pending => cmd_pending(&service),
        Command::Tutors { module } => cmd_tutors(&service, module.as_deref()),
        Command::Show { escalation_id } => cmd_show(&service, &escalation_id),
        Command::Assign {
            escalation_id,
            tutor_id,
        } => cmd_assign(&service, &escalation_id, &tutor_id),
        Command::AutoAssign { escalation_id } => cmd_auto_assign(&service, &escalation_id),
        Command::Process => cmd_process(&service),
        Command::Resolve {
            escalation_id,
            note,
        } => cmd_resolve(&service, &escalation_id, note.as_deref()),
        Command::Cancel { escalation_id } => cmd_cancel(&service, &escalation_id),
        Command::Stats => cmd_stats(&service),
        Command::CreateEscalation {
            student,
            question,
            module,
            reason,
            priority,
            conversation,
        } => cmd_create_escalation(
            &service,
            student,
            question,
            module,
            reason,
            &priority,
            conversation,
        ),
        Command::AddTutor {
            tutor_id,
            first_name,
            last_name,
            email,
            modules,
        } => cmd_add_tutor(&db, tutor_id, first_name, last_name, email, modules),
    }
}

fn cmd_pending(service: &EscalationService) -> Result<()> {
    let pending = service
        .get_pending_escalations()
        .context("failed to list pending escalations")?;

    if pending.is_empty() {
        println!("No pending escalations");
        return Ok(());
    }

    println!("{} pending escalation(s):", pending.len());
    for escalation in &pending {
        print_escalation_line(escalation);
    }
    Ok(())
}

fn cmd_tutors(service: &EscalationService, module: Option<&str>) -> Result<()> {
    let tutors = service
        .find_available_tutors(module)
        .context("failed to list tutors")?;

    if tutors.is_empty() {
        match module {
            Some(m) => println!("No active tutors cover module {}", m),
            None => println!("No active tutors"),
        }
        return Ok(());
    }

    for tutor in &tutors {
        println!(
            "{}  {}  load={}  {}  [{}]",
            tutor.profile.id,
            tutor.profile.display_name(),
            tutor.current_escalations,
            if tutor.is_available {
                "available"
            } else {
                "at capacity"
            },
            tutor.profile.modules.join(", "),
        );
    }
    Ok(())
}

fn cmd_show(service: &EscalationService, escalation_id: &str) -> Result<()> {
    let e = service
        .get_escalation(escalation_id)
        .context("failed to load escalation")?;

    println!("Escalation {}", e.id);
    println!("  status:    {}", e.status);
    println!("  priority:  {}", e.priority);
    println!("  student:   {}", e.student_name.as_deref().unwrap_or(&e.student_id));
    println!("  module:    {}", e.module_code.as_deref().unwrap_or("General"));
    println!("  question:  {}", e.original_question);
    if let Some(reason) = &e.escalation_reason {
        println!("  reason:    {}", reason);
    }
    if let Some(tutor_id) = &e.tutor_id {
        println!("  tutor:     {}", tutor_id);
    }
    if let Some(thread_id) = &e.message_thread_id {
        println!("  thread:    {}", thread_id);
    }
    if let Some(note) = &e.resolution_note {
        println!("  note:      {}", note);
    }
    println!("  created:   {}", e.created_at.to_rfc3339());
    if let Some(assigned_at) = e.assigned_at {
        println!("  assigned:  {}", assigned_at.to_rfc3339());
    }
    if let Some(resolved_at) = e.resolved_at {
        println!("  resolved:  {}", resolved_at.to_rfc3339());
    }
    Ok(())
}

fn cmd_assign(service: &EscalationService, escalation_id: &str, tutor_id: &str) -> Result<()> {
    service
        .assign_tutor_to_escalation(escalation_id, tutor_id)
        .context("failed to assign tutor")?;
    println!("Assigned tutor {} to escalation {}", tutor_id, escalation_id);
    Ok(())
}

fn cmd_auto_assign(service: &EscalationService, escalation_id: &str) -> Result<()> {
    match service
        .auto_assign_escalation(escalation_id)
        .context("failed to auto-assign")?
    {
        Some(tutor_id) => {
            println!("Assigned tutor {} to escalation {}", tutor_id, escalation_id)
        }
        None => println!(
            "No available tutor covers escalation {}; it remains pending",
            escalation_id
        ),
    }
    Ok(())
}

fn cmd_process(service: &EscalationService) -> Result<()> {
    let pending = service
        .get_pending_escalations()
        .context("failed to list pending escalations")?;

    if pending.is_empty() {
        println!("No pending escalations to process");
        return Ok(());
    }

    let pb = ProgressBar::new(pending.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    let result = service.process_pending_escalations_with(|escalation| {
        pb.set_message(escalation.id.clone());
        pb.inc(1);
    });

    pb.finish_and_clear();
    let outcome = result.context("sweep failed")?;

    println!(
        "Processed {} escalation(s): {} assigned, {} left pending",
        outcome.processed, outcome.assigned, outcome.unmatched
    );

    tracing::info!(
        processed = outcome.processed,
        assigned = outcome.assigned,
        unmatched = outcome.unmatched,
        "campuslearn process complete"
    );

    Ok(())
}

fn cmd_resolve(service: &EscalationService, escalation_id: &str, note: Option<&str>) -> Result<()> {
    service
        .resolve_escalation(escalation_id, note)
        .context("failed to resolve escalation")?;
    println!("Resolved escalation {}", escalation_id);
    Ok(())
}

fn cmd_cancel(service: &EscalationService, escalation_id: &str) -> Result<()> {
    service
        .cancel_escalation(escalation_id)
        .context("failed to cancel escalation")?;
    println!("Cancelled escalation {}", escalation_id);
    Ok(())
}

fn cmd_stats(service: &EscalationService) -> Result<()> {
    let stats = service
        .get_escalation_stats()
        .context("failed to compute stats")?;

    println!("Escalations: {} total", stats.total);
    println!("  pending:   {}", stats.pending);
    println!("  assigned:  {}", stats.assigned);
    println!("  resolved:  {}", stats.resolved);
    println!("  cancelled: {}", stats.cancelled);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_create_escalation(
    service: &EscalationService,
    student: String,
    question: String,
    module: Option<String>,
    reason: Option<String>,
    priority: &str,
    conversation: String,
) -> Result<()> {
    let priority: Priority = priority
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid priority")?;

    let escalation = service
        .create_escalation(NewEscalation {
            conversation_id: conversation,
            student_id: student,
            student_name: None,
            module_code: module,
            original_question: question,
            escalation_reason: reason,
            priority,
        })
        .context("failed to create escalation")?;

    println!("Created escalation {}", escalation.id);
    Ok(())
}

fn cmd_add_tutor(
    db: &Database,
    tutor_id: String,
    first_name: String,
    last_name: String,
    email: String,
    modules: Vec<String>,
) -> Result<()> {
    let tutor = TutorProfile {
        id: tutor_id,
        first_name,
        last_name,
        email,
        modules,
        active: true,
    };
    db.upsert_tutor(&tutor).context("failed to save tutor")?;
    println!("Saved tutor {} ({})", tutor.id, tutor.display_name());
    Ok(())
}

fn print_escalation_line(e: &Escalation) {
    println!(
        "{}  [{}]  {}  {}  {}",
        e.id,
        e.priority,
        e.module_code.as_deref().unwrap_or("General"),
        e.created_at.format("%Y-%m-%d %H:%M"),
        e.original_question,
    );
}
