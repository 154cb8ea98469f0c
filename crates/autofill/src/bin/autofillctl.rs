use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use autofill::context::AppContext;
use autofill::gateway::{
    CreateJobRequest, JobMode, MemoryLimit, ReasoningEffort, SimulatedGateway, UploadFile,
};
use autofill::jobs::model::{JobPatch, JobRecord, JobSnapshot};
use autofill::jobs::poller::{JobPoller, UpdateFn};
use autofill::jobs::progress::{ProgressInput, ProgressTracker};
use autofill::jobs::submit::{self, SubmitJob};
use autofill::{telemetry, Config};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::{mpsc, watch};

#[derive(Parser)]
#[command(name = "autofillctl", about = "Submit and track template-filling jobs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the backend answers
    Health,
    /// Upload source documents as a new document set
    Docset {
        files: Vec<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Upload a template file
    Template {
        file: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a fill job
    Submit {
        #[arg(long)]
        docset: String,
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "")]
        instruction: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, value_enum, default_value_t = Effort::High)]
        effort: Effort,
        #[arg(long, value_enum, default_value_t = Memory::G4)]
        memory: Memory,
        #[arg(long, value_enum, default_value_t = Mode::Async)]
        mode: Mode,
    },
    /// Fetch one job's status and store it
    Status { job_id: String },
    /// List stored jobs, newest first
    List,
    /// Poll a job until it finishes, showing progress
    Watch { job_id: String },
    /// Download an output file of a succeeded job
    Download {
        job_id: String,
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Start a new job with the inputs of an old one
    Retry { job_id: String },
    /// Forget every stored job
    Clear,
    /// Full round trip against the simulated backend
    Demo,
}

#[derive(Clone, Copy, ValueEnum)]
enum Effort {
    Low,
    Medium,
    High,
}

#[derive(Clone, Copy, ValueEnum)]
enum Memory {
    #[value(name = "1g")]
    G1,
    #[value(name = "4g")]
    G4,
    #[value(name = "16g")]
    G16,
    #[value(name = "64g")]
    G64,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Async,
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("warn");
    let cli = Cli::parse();
    let cfg = Config::from_env()?;
    let ctx = AppContext::from_config(cfg).await?;

    match cli.command {
        Command::Health => {
            let body = ctx.gateway.health().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Docset { files, name } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                uploads.push(UploadFile::from_path(path).await?);
            }
            let res = ctx.gateway.create_document_set(uploads, name).await?;
            println!("docset_id={} files={}", res.docset_id, res.files.len());
        }
        Command::Template { file, name } => {
            let upload = UploadFile::from_path(&file).await?;
            let res = ctx.gateway.upload_template(upload, name).await?;
            println!("template_id={}", res.template_id);
        }
        Command::Submit {
            docset,
            template,
            instruction,
            model,
            effort,
            memory,
            mode,
        } => {
            let mut request = CreateJobRequest::new(docset, template, instruction);
            if let Some(model) = model {
                request.model_options.model = model;
            }
            request.model_options.reasoning_effort = match effort {
                Effort::Low => ReasoningEffort::Low,
                Effort::Medium => ReasoningEffort::Medium,
                Effort::High => ReasoningEffort::High,
            };
            request.model_options.memory_limit = match memory {
                Memory::G1 => MemoryLimit::G1,
                Memory::G4 => MemoryLimit::G4,
                Memory::G16 => MemoryLimit::G16,
                Memory::G64 => MemoryLimit::G64,
            };
            request.mode = match mode {
                Mode::Async => JobMode::Async,
                Mode::Sync => JobMode::Sync,
            };
            let record = submit::submit(&ctx, SubmitJob::new(request)).await?;
            print_record(&record);
        }
        Command::Status { job_id } => {
            let record = submit::refresh(&ctx, &job_id).await?;
            print_record(&record);
        }
        Command::List => {
            let records = ctx.store.list().await;
            if records.is_empty() {
                println!("no jobs");
            }
            for record in &records {
                print_record(record);
            }
        }
        Command::Watch { job_id } => {
            let record = watch_job(&ctx, &job_id).await?;
            print_record(&record);
        }
        Command::Download { job_id, index, out } => {
            let file = submit::download(&ctx, &job_id, index).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(&file.filename));
            tokio::fs::write(&path, &file.content).await?;
            println!("saved {} ({} bytes)", path.display(), file.content.len());
        }
        Command::Retry { job_id } => {
            let record = submit::resubmit(&ctx, &job_id).await?;
            print_record(&record);
        }
        Command::Clear => {
            ctx.store.clear().await?;
            println!("cleared");
        }
        Command::Demo => demo(ctx).await?,
    }

    Ok(())
}

fn print_record(r: &JobRecord) {
    let error = r
        .error
        .as_ref()
        .map(|e| format!(" error={}:{}", e.code, e.message))
        .unwrap_or_default();
    let output = r
        .outputs
        .first()
        .map(|o| format!(" output={}", o.filename))
        .unwrap_or_default();
    println!(
        "{} status={} stage={} updated_at={}{}{}",
        r.job_id,
        r.status,
        r.stage.as_deref().unwrap_or("-"),
        r.updated_at.to_rfc3339(),
        output,
        error
    );
}

async fn watch_job(ctx: &AppContext, job_id: &str) -> anyhow::Result<JobRecord> {
    let mut record = match ctx.store.get(job_id).await {
        Some(r) => r,
        None => submit::refresh(ctx, job_id).await?,
    };
    if record.status.is_terminal() {
        return Ok(record);
    }

    let (input_tx, input_rx) = watch::channel(ProgressInput::from_status(record.status));
    let tracker = ProgressTracker::spawn(input_rx);
    let mut progress = tracker.subscribe();

    let (rec_tx, mut rec_rx) = mpsc::unbounded_channel::<JobRecord>();
    let store = ctx.store.clone();
    let on_update: UpdateFn = Arc::new(move |snapshot: JobSnapshot| {
        let store = store.clone();
        let rec_tx = rec_tx.clone();
        Box::pin(async move {
            match store.upsert(JobPatch::from_snapshot(snapshot)).await {
                Ok(rec) => {
                    let _ = rec_tx.send(rec);
                }
                Err(e) => tracing::warn!(error = %e, "failed to persist polled status"),
            }
        })
    });
    let handle = JobPoller::from_context(ctx).spawn(job_id, on_update);

    loop {
        tokio::select! {
            Some(rec) = rec_rx.recv() => {
                input_tx.send_replace(ProgressInput::from_status(rec.status));
                println!("status={} stage={}", rec.status, rec.stage.as_deref().unwrap_or("-"));
                let done = rec.status.is_terminal();
                record = rec;
                if done {
                    break;
                }
            }
            Ok(()) = progress.changed() => {
                println!("progress {:>3}%", *progress.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown().await;
                println!("stopped watching {job_id}");
                return Ok(record);
            }
        }
    }

    // let the bar settle at 100 after success
    let _ = tokio::time::timeout(Duration::from_secs(2), progress.wait_for(|p| *p >= 100)).await;
    println!("progress {:>3}%", tracker.current());
    Ok(record)
}

async fn demo(ctx: AppContext) -> anyhow::Result<()> {
    let ctx = AppContext::with_parts(
        ctx.config.clone(),
        ctx.store.clone(),
        Arc::new(SimulatedGateway::new()),
    );

    let docset = ctx
        .gateway
        .create_document_set(
            vec![
                UploadFile::new("notes.md", "# Notes\nQuarterly figures.\n"),
                UploadFile::new("facts.txt", "revenue: 42\n"),
            ],
            Some("demo docset".to_string()),
        )
        .await?;
    println!("docset_id={}", docset.docset_id);

    let template_file = UploadFile::new("template.xlsx", vec![0u8; 64]);
    let template_meta = template_file.meta();
    let template = ctx.gateway.upload_template(template_file, None).await?;
    println!("template_id={}", template.template_id);

    let request = CreateJobRequest::new(&docset.docset_id, &template.template_id, "fill template");
    let mut job = SubmitJob::new(request);
    job.template_file = Some(template_meta);
    job.source_files = docset.files.clone();
    let record = submit::submit(&ctx, job).await?;
    print_record(&record);

    let record = watch_job(&ctx, &record.job_id).await?;
    print_record(&record);

    if !record.outputs.is_empty() {
        let file = submit::download(&ctx, &record.job_id, 0).await?;
        let path = ctx.config.data_dir.join(&file.filename);
        tokio::fs::write(&path, &file.content).await?;
        println!("saved {} ({} bytes)", path.display(), file.content.len());
    }
    Ok(())
}
