//! Local pipeline execution command.

use anyhow::{Context, Result};
use distonic_config::{JobConcurrency, parse_pipeline, render};
use distonic_core::{ExecutionContext, Pipeline};
use distonic_scheduler::{PipelineEvent, PipelineRunner, StageState};
use std::path::Path;
use tokio::sync::mpsc;

/// Render, build and run the pipeline of `dir` without touching git.
///
/// The definition is rendered in memory; the file on disk is left as is.
pub async fn run_local(
    dir: &Path,
    file: &str,
    branch: &str,
    commit: &str,
    sequential: bool,
) -> Result<()> {
    let working_dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    let path = working_dir.join(file);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let repo = working_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "local".to_string());
    let ctx = ExecutionContext::new(repo, &working_dir, branch, commit);

    let doc = parse_pipeline(&render(&content, &ctx))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let pipeline = Pipeline::build(&doc, &distonic_modules::builtin_registry())?;

    println!("Running pipeline in {}", working_dir.display());
    println!("Stages: {:?}", pipeline.stage_names());

    let concurrency = if sequential {
        JobConcurrency::Sequential
    } else {
        JobConcurrency::Parallel
    };
    let (tx, mut rx) = mpsc::channel(100);
    let runner = PipelineRunner::new(concurrency).with_events(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let result = runner.run(&pipeline, &ctx).await;
    drop(runner);
    printer.await.context("Event printer failed")?;

    println!("\n--- Stage Summary ---");
    for (stage, state) in &result.stages {
        let status = match state {
            StageState::Succeeded => "✓ succeeded".to_string(),
            StageState::Failed { message } => format!("✗ failed: {}", message),
            StageState::Skipped { reason } => format!("⊘ skipped: {}", reason),
        };
        println!("  {} - {}", stage, status);
    }

    if result.success {
        println!("\n✓ Pipeline succeeded!");
        Ok(())
    } else {
        anyhow::bail!("Pipeline failed");
    }
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted { stage } => {
            println!("▶ Stage '{}' started", stage);
        }
        PipelineEvent::JobFinished { stage, job, error } => match error {
            None => println!("  [{}] {} ok", stage, job),
            Some(message) => println!("  [{}] {} failed: {}", stage, job, message),
        },
        PipelineEvent::StageFinished { stage, success } => {
            if *success {
                println!("✓ Stage '{}' completed successfully\n", stage);
            } else {
                println!("✗ Stage '{}' failed\n", stage);
            }
        }
        PipelineEvent::PipelineFinished { success } => {
            if *success {
                println!("--- Pipeline completed successfully ---");
            } else {
                println!("--- Pipeline failed ---");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_local() {
        let dir = tempfile::tempdir().unwrap();
        let definition = r#"
stage "build" {
    job {
        shell run="echo ${branch_dashed} > out.txt"
    }
}
"#;
        std::fs::write(dir.path().join("distonic.kdl"), definition).unwrap();

        run_local(dir.path(), "distonic.kdl", "feature/a", "abc123", true)
            .await
            .unwrap();

        let out = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out, "feature-a\n");
        // The definition itself is not rewritten.
        let on_disk = std::fs::read_to_string(dir.path().join("distonic.kdl")).unwrap();
        assert_eq!(on_disk, definition);
    }

    #[tokio::test]
    async fn test_run_local_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("distonic.kdl"),
            "stage \"build\" {\n    job {\n        shell run=\"exit 1\"\n    }\n}\n",
        )
        .unwrap();

        assert!(
            run_local(dir.path(), "distonic.kdl", "main", "abc123", false)
                .await
                .is_err()
        );
    }
}
