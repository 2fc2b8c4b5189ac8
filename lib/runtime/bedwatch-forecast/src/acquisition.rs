use tracing::warn;

use bedwatch_domain::{Observation, PipelineError, RawSample, SampleId};

/// Validate one raw sample. Out-of-range counts are rejected, never clamped.
pub fn normalize(sample: &RawSample) -> Result<Observation, PipelineError> {
    Observation::try_from(sample)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedHistory {
    /// Newest first; never empty.
    pub observations: Vec<Observation>,
    /// Older samples that failed validation.
    pub rejected: Vec<(SampleId, PipelineError)>,
}

impl NormalizedHistory {
    pub fn latest(&self) -> &Observation {
        &self.observations[0]
    }
}

/// Validate a newest-first window of samples.
///
/// The newest sample decides the run: missing or invalid fails it. Invalid
/// older samples are only dropped from the history.
pub fn normalize_history(
    department_id: &str,
    samples: &[RawSample],
) -> Result<NormalizedHistory, PipelineError> {
    let (newest, older) = samples
        .split_first()
        .ok_or_else(|| PipelineError::NoData(department_id.to_string()))?;

    let mut observations = Vec::with_capacity(samples.len());
    observations.push(normalize(newest)?);

    let mut rejected = Vec::new();
    for sample in older {
        match normalize(sample) {
            Ok(obs) => observations.push(obs),
            Err(err) => {
                warn!(
                    department = department_id,
                    sample_id = %sample.id,
                    error = %err,
                    "Dropping invalid sample from history"
                );
                rejected.push((sample.id.clone(), err));
            }
        }
    }

    Ok(NormalizedHistory {
        observations,
        rejected,
    })
}
