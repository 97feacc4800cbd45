//! Local runner: executes a run plan in-process, batch by batch.

use crate::session::Session;
use async_trait::async_trait;
use scitracer_core::{BatchItem, Error, JobState, Outcome, Result, RunManifest, RunPlan, Runner};
use tracing::{error, info};

pub struct LocalRunner {
    session: Session,
}

impl LocalRunner {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    async fn run_item(&self, item: &BatchItem) -> Result<()> {
        let func = item.func.name();
        let args = self.session.materialize(&item.inputs).await?;
        let payloads = item.func.invoke(&args)?.into_vec();
        if payloads.len() != item.outputs.len() {
            return Err(Error::InvalidInput(format!(
                "{} returned {} outputs, {} were planned",
                func,
                payloads.len(),
                item.outputs.len()
            )));
        }
        for (output, payload) in item.outputs.iter().zip(&payloads) {
            self.session.write_data(output, payload).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn run(&self, plan: &RunPlan) -> Result<RunManifest> {
        let mut manifest = RunManifest::new(&plan.run_id, plan.dataset.uri.as_str());
        for batch in &plan.batches {
            manifest.add_job(&batch.job_id, &batch.func, batch.len());
        }
        info!(
            run_id = %plan.run_id,
            jobs = plan.batches.len(),
            items = plan.total_items(),
            "run started"
        );

        for batch in &plan.batches {
            manifest.start_job(&batch.job_id);
            for item in &batch.items {
                if let Err(e) = self.run_item(item).await {
                    manifest.finish_job(&batch.job_id, JobState::Failed);
                    manifest.finalize(Outcome::Failure);
                    error!(
                        run_id = %plan.run_id,
                        job_id = %batch.job_id,
                        func = %batch.func,
                        "{}",
                        e
                    );
                    error!("{}", manifest.run_log_line());
                    return Err(Error::run_failed(manifest, e));
                }
                manifest.complete_item(&batch.job_id);
            }
            manifest.finish_job(&batch.job_id, JobState::Success);
        }

        manifest.finalize(Outcome::Success);
        info!(
            run_id = %plan.run_id,
            items = manifest.total_items,
            wall_ms = manifest.total_wall_ms,
            "run complete"
        );
        info!("{}", manifest.run_log_line());
        Ok(manifest)
    }
}
