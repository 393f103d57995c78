use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use changestreams::{Config, ReplayQuery, Subscriber};
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::args::Cli;
use crate::output::Logger;
use crate::visualizer::PartitionVisualizer;

impl Cli {
    fn config(&self) -> Config {
        Config {
            start_timestamp: self.start,
            end_timestamp: self.end,
            heartbeat_interval: Duration::from_millis(self.heartbeat_ms.unwrap_or_default()),
            database_role: self.role.clone(),
        }
    }

    pub fn run(self) -> Result<()> {
        let query = ReplayQuery::from_path(&self.replay)
            .with_context(|| format!("failed to load rows from '{}'", self.replay.display()))?;
        let subscriber = Subscriber::with_config(Arc::new(query), &self.stream, self.config())
            .context("failed to create a reader")?;

        info!(
            project = %self.project,
            instance = %self.instance,
            database = %self.database,
            stream = %self.stream,
            "tailing change stream"
        );

        let runtime = build_runtime("tail")?;
        runtime.block_on(async move {
            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_interrupt(cancel.clone()));

            if self.visualize_partitions {
                eprintln!("Reading the stream and analyzing partitions...\n");
                let visualizer = Arc::new(PartitionVisualizer::new());
                subscriber
                    .subscribe(visualizer.clone(), cancel)
                    .await
                    .context("failed to read stream")?;

                let mut stdout = io::stdout().lock();
                visualizer.draw(&mut stdout)?;
                stdout.flush()?;
                return Ok(());
            }

            eprintln!("Reading the stream...");
            let logger = Arc::new(Logger::new(io::stdout(), self.format, self.verbose));
            subscriber
                .subscribe(logger, cancel)
                .await
                .context("failed to read stream")
        })
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            debug!("interrupted, cancelling read");
            cancel.cancel();
        }
        // Without a signal handler the read can only end by itself.
        Err(err) => debug!(%err, "failed to listen for interrupts"),
    }
}

fn build_runtime(thread_label: &'static str) -> Result<Runtime> {
    let runtime = Builder::new_multi_thread()
        .thread_name_fn(move || {
            static THREAD_ID: AtomicU64 = AtomicU64::new(0);
            let id = THREAD_ID.fetch_add(1, Ordering::Relaxed);
            format!("{}-thread-{}", thread_label, id)
        })
        .enable_all()
        .build()?;

    Ok(runtime)
}
