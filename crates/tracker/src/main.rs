use autofill::api;
use autofill::config::Config;
use autofill::context::{AppContext, Visibility};
use autofill::jobs::{store_sink, BackgroundRefresher, JobPoller, PollerSlot};
use autofill::telemetry;

use clap::Parser;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "autofill-tracker", about = "Keep stored autofill jobs up to date")]
struct Args {
    /// Run with background cadence (no one is looking at the output)
    #[arg(long)]
    hidden: bool,

    /// Inspect API address, overrides AUTOFILL_API_ADDR
    #[arg(long)]
    api_addr: Option<String>,
}

const FOCUS_CHECK_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init("info");
    let args = Args::parse();

    let cfg = Config::from_env()?;
    let api_addr = args.api_addr.or_else(|| cfg.api_addr.clone());

    let mut ctx = AppContext::from_config(cfg).await?;
    ctx.visibility = if args.hidden {
        Visibility::hidden()
    } else {
        Visibility::visible()
    };

    tracing::info!(
        mock = ctx.config.use_mock,
        base_url = %ctx.config.base_url,
        hidden = args.hidden,
        api = api_addr.as_deref().unwrap_or("disabled"),
        jobs = ctx.store.list().await.len(),
        "tracker starting"
    );

    let refresher = BackgroundRefresher::from_context(&ctx);

    // ---- API task ----
    let app = api::router(api::ApiState { ctx: ctx.clone() });
    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("inspect api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Focus task: fast polling for the newest active job ----
    let focus_ctx = ctx.clone();
    let focus_handle = tokio::spawn(async move {
        let mut slot = PollerSlot::new(
            JobPoller::from_context(&focus_ctx),
            store_sink(focus_ctx.store.clone()),
        );

        loop {
            let newest = focus_ctx
                .store
                .list()
                .await
                .into_iter()
                .find(|r| r.status.is_active())
                .map(|r| r.job_id);

            if newest.as_deref() != slot.watching() {
                if let Some(id) = newest.as_deref() {
                    tracing::info!(job_id = %id, "watching job");
                }
                slot.watch(newest.as_deref(), true);
            }

            tokio::time::sleep(FOCUS_CHECK_INTERVAL).await;
        }
        #[allow(unreachable_code)]
        Ok::<(), anyhow::Error>(())
    });

    tokio::select! {
        res = api_handle => res??,
        res = focus_handle => res??,
        res = tokio::signal::ctrl_c() => {
            res?;
            tracing::info!("shutting down");
        }
    }

    refresher.cancel();
    Ok(())
}
