//! Batch planner: turns declarative jobs into batches of resolved items.
//!
//! Planning writes to the catalog. Output placeholders (empty payloads with a
//! provenance record) exist before anything runs, so a later job in the same
//! run can query the outputs of an earlier one.

use crate::provenance;
use crate::resolver;
use crate::session::Session;
use scitracer_core::{
    Annotations, Batch, BatchItem, Dataset, Error, Input, Job, JobInput, Result, RunPlan, Scalar,
};
use tracing::{debug, info, warn};

pub const RUN_ID_KEY: &str = "run_id";
pub const JOB_ID_KEY: &str = "job_id";

pub struct Planner<'s> {
    session: &'s Session,
}

impl<'s> Planner<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self { session }
    }

    /// Plan one job.
    pub async fn plan(
        &self,
        dataset: &Dataset,
        job: &Job,
        run_id: &str,
        job_id: &str,
    ) -> Result<Batch> {
        let func = job.processor.name();
        let queries: Vec<Annotations> = job
            .inputs
            .iter()
            .filter_map(|input| match input {
                JobInput::Query(q) => Some(q.clone()),
                JobInput::Literal(_) => None,
            })
            .collect();
        if queries.is_empty() {
            return Err(Error::InvalidQuery(format!(
                "job {} ({}) has no query input",
                job_id, func
            )));
        }

        let mut batch = Batch::new(job_id, func);
        let resolved = self
            .session
            .queries()
            .query(dataset, &queries, job.query_type)
            .await?;
        if resolved.is_empty() {
            if job.allow_empty {
                warn!(
                    job_id,
                    func,
                    query_type = %job.query_type,
                    "job matched nothing, planning an empty batch"
                );
                return Ok(batch);
            }
            return Err(Error::UnresolvedReference(format!(
                "job {} ({}) {} query matched nothing",
                job_id, func, job.query_type
            )));
        }

        for set in resolved.into_input_sets() {
            let inputs = interleave(&job.inputs, set)?;
            let location = resolver::resolve(self.session.catalog(), &inputs, func, None).await?;

            let mut outputs = Vec::with_capacity(job.outputs.len());
            for (i, spec) in job.outputs.iter().enumerate() {
                let mut annotations = Annotations::new();
                annotations.insert(RUN_ID_KEY.into(), Scalar::from(run_id));
                annotations.insert(JOB_ID_KEY.into(), Scalar::from(job_id));
                annotations.extend(spec.annotations.iter().map(|(k, v)| (k.clone(), v.clone())));

                let record = provenance::record(func, &inputs, i).to_metadata()?;
                let placeholder = self
                    .session
                    .store_item(&location, spec.storage_type, None, &annotations, Some(&record))
                    .await?;
                outputs.push(placeholder);
            }
            batch.push(BatchItem {
                func: job.processor.clone(),
                inputs,
                outputs,
            });
        }
        debug!(job_id, func, items = batch.len(), "job planned");
        Ok(batch)
    }

    /// Plan jobs in order under one run id. Job ids are their positions.
    pub async fn plan_run(&self, dataset: &Dataset, jobs: &[Job]) -> Result<RunPlan> {
        let run_id = new_run_id();
        let mut batches = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            batches.push(self.plan(dataset, job, &run_id, &index.to_string()).await?);
        }
        let plan = RunPlan {
            run_id,
            dataset: dataset.clone(),
            batches,
        };
        info!(
            run_id = %plan.run_id,
            dataset = %dataset.uri,
            jobs = jobs.len(),
            items = plan.total_items(),
            "run planned"
        );
        Ok(plan)
    }
}

fn new_run_id() -> String {
    chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f").to_string()
}

/// Put resolved query inputs back in argument order, between the literals.
fn interleave(template: &[JobInput], resolved: Vec<Input>) -> Result<Vec<Input>> {
    let mut resolved = resolved.into_iter();
    let inputs = template
        .iter()
        .map(|input| match input {
            JobInput::Literal(v) => Some(Input::Literal(v.clone())),
            JobInput::Query(_) => resolved.next(),
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::Internal("resolved set shorter than its queries".into()))?;
    Ok(inputs)
}
