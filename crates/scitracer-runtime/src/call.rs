//! Immediate execution of a processor with lineage recording.

use crate::provenance;
use crate::resolver;
use crate::session::Session;
use scitracer_core::{Annotations, DataInfo, Error, Input, Location, Processor, Result};
use tracing::info;

/// A processor bound to a session, ready to be invoked on catalog entries.
pub struct CallWrapper<'s> {
    session: &'s Session,
    processor: Processor,
    location: Option<Location>,
}

pub fn call(session: &Session, processor: Processor) -> CallWrapper<'_> {
    CallWrapper {
        session,
        processor,
        location: None,
    }
}

impl<'s> CallWrapper<'s> {
    /// Write outputs at this location instead of resolving one from the inputs.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Read the inputs, run the processor and store every output.
    ///
    /// Output `i` gets `annotations[i]` and `output_id = i`. Nothing is written
    /// if the processor fails.
    pub async fn invoke(
        &self,
        annotations: &[Annotations],
        args: Vec<Input>,
    ) -> Result<Vec<DataInfo>> {
        let func = self.processor.name();
        let materialized = self.session.materialize(&args).await?;
        let outputs = self.processor.invoke(&materialized)?.into_vec();
        if annotations.len() < outputs.len() {
            return Err(Error::InvalidInput(format!(
                "{} returned {} outputs but only {} annotation sets were given",
                func,
                outputs.len(),
                annotations.len()
            )));
        }

        let location = resolver::resolve(
            self.session.catalog(),
            &args,
            func,
            self.location.as_ref(),
        )
        .await?;

        let mut written = Vec::with_capacity(outputs.len());
        for (i, payload) in outputs.iter().enumerate() {
            let record = provenance::record(func, &args, i).to_metadata()?;
            let item = self
                .session
                .store_item(
                    &location,
                    payload.storage_type(),
                    Some(payload),
                    &annotations[i],
                    Some(&record),
                )
                .await?;
            written.push(item);
        }
        info!(func, location = location.id, outputs = written.len(), "call complete");
        Ok(written)
    }
}
