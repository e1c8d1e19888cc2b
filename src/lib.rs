// src/lib.rs

pub mod analysis;
pub mod cli;
pub mod collab;
pub mod config;
pub mod context;
pub mod errors;
pub mod interview;
pub mod logging;
pub mod pipeline;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::analysis::competitors::{REPORT_KEY, build_competitor_pipeline, research_context};
use crate::analysis::questions::build_question_pipeline;
use crate::cli::{CliArgs, Command};
use crate::collab::Collaborators;
use crate::config::{ConfigFile, load_and_validate};
use crate::interview::{InterviewService, SeedInput};
use crate::pipeline::{PipelineExecutor, PipelineOutcome, Stage};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config, wires command-backed collaborators and
/// runs the requested subcommand. Ctrl-C stops a research run.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config))?;
    let collaborators = Collaborators::from_config(&cfg.collaborators)?;

    match args.command {
        Command::Research { input, competitors } => {
            let stages = build_competitor_pipeline(&collaborators, &cfg.pipeline);
            if args.dry_run {
                print_dry_run(&cfg, "research", &stages);
                return Ok(());
            }

            let startup_info = read_input(&input).await?;
            let executor = PipelineExecutor::from_settings(&cfg.pipeline);

            let outcome = tokio::select! {
                outcome = executor.run(stages, research_context(&startup_info, &competitors)) => outcome,
                res = tokio::signal::ctrl_c() => {
                    res.context("listening for Ctrl+C")?;
                    bail!("interrupted");
                }
            };

            log_stage_summary(&outcome);
            let ctx = outcome.into_result()?;
            let report = ctx
                .get_str(REPORT_KEY)
                .ok_or_else(|| anyhow::anyhow!("pipeline finished without a '{REPORT_KEY}'"))?;
            println!("{report}");
            Ok(())
        }

        Command::Interview { startup, investor } => {
            if args.dry_run {
                let stages =
                    build_question_pipeline(collaborators.generator.clone(), &cfg.interview);
                print_dry_run(&cfg, "interview", &stages);
                return Ok(());
            }

            let startup_context = read_input(&startup).await?;
            let investor_context = match investor {
                Some(path) => Some(read_input(&path).await?),
                None => None,
            };

            let service = InterviewService::new(
                collaborators,
                PipelineExecutor::from_settings(&cfg.pipeline),
                cfg.interview.clone(),
            );
            run_interview_loop(
                &service,
                SeedInput {
                    startup_context,
                    investor_context,
                },
            )
            .await
        }
    }
}

async fn read_input(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading '{}'", path.display()))
}

/// Drive one interview over stdin/stdout until completion, EOF or
/// `exit` / `quit`.
async fn run_interview_loop(service: &InterviewService, seed: SeedInput) -> Result<()> {
    let mut reply = service.start(seed).await?;
    let session_id = reply.session_id;
    println!("{}", reply.prompt);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !reply.is_complete() {
        let Some(line) = lines.next_line().await? else {
            debug!("stdin closed");
            break;
        };
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }

        reply = service.respond(session_id, Some(line)).await?;
        println!("{}", reply.prompt);
        if !reply.is_complete() {
            debug!(remaining = reply.remaining, "awaiting answer");
        }
    }

    info!(
        session = %session_id,
        turns = reply.history.len(),
        completed = reply.is_complete(),
        "interview finished"
    );
    service.end(session_id).await?;
    Ok(())
}

fn log_stage_summary(outcome: &PipelineOutcome) {
    for stage in &outcome.stages {
        info!(
            stage = %stage.name,
            outcome = ?stage.outcome,
            succeeded = stage.succeeded_count(),
            failed = stage.failed_count(),
            duration_ms = stage.duration_ms as u64,
            "stage summary"
        );
    }
    info!(
        total_duration_ms = outcome.total_duration_ms as u64,
        completed = outcome.is_completed(),
        "pipeline summary"
    );
}

/// Print the validated settings and stage layout without running anything.
fn print_dry_run(cfg: &ConfigFile, command: &str, stages: &[Stage]) {
    println!("diligence dry-run ({command})");
    println!("  pipeline.max_width = {}", cfg.pipeline.max_width);
    println!("  pipeline.task_timeout = {:?}", cfg.pipeline.task_timeout);
    println!(
        "  pipeline.max_retries = {} (base delay {:?})",
        cfg.pipeline.max_retries, cfg.pipeline.retry_base_delay
    );
    println!("  interview.max_followups = {}", cfg.interview.max_followups);
    println!(
        "  interview.questions = {}..={}",
        cfg.interview.min_questions, cfg.interview.max_questions
    );
    if let Some(generate) = cfg.generate_command() {
        println!("  collaborators.generate = {}", generate.cmd);
    }
    for (label, section) in [
        ("search", &cfg.collaborators.search),
        ("evaluate", &cfg.collaborators.evaluate),
    ] {
        match section {
            Some(c) => println!("  collaborators.{label} = {}", c.cmd),
            None => println!("  collaborators.{label} = (none)"),
        }
    }
    println!();

    let mut lines = Vec::new();
    for stage in stages {
        stage.describe(1, &mut lines);
    }
    println!("stages ({}):", stages.len());
    for line in lines {
        println!("{line}");
    }

    debug!("dry-run complete (no collaborator called)");
}
