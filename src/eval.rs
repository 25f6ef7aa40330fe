//! Inference pass producing per-frame class probabilities

use crate::frames::FrameSampler;
use crate::media::MediaSource;
use crate::stats::EvaluationStatistics;
use crate::student::StudentNetwork;
use crate::train::batch_ranges;
use crate::{Error, Result};
use ndarray::{Array2, Axis};

/// Rows pushed through the student at once
const EVAL_BATCH: usize = 512;

/// Run `student` over every window of `source`
///
/// `model_file` is recorded verbatim so plots can name the model.
pub fn evaluate(
    student: &StudentNetwork,
    sampler: &FrameSampler,
    source: &mut dyn MediaSource,
    model_file: &str,
) -> Result<EvaluationStatistics> {
    if sampler.audio_rate() != student.config().sample_rate {
        return Err(Error::ConfigError(format!(
            "student expects {} Hz audio but the sampler produces {} Hz",
            student.config().sample_rate,
            sampler.audio_rate()
        )));
    }

    let pairs = sampler.sample(source)?;
    let segment_len = pairs.first().map(|p| p.audio_segment.len()).unwrap_or(0);
    let mut frame_probabilities = Vec::with_capacity(pairs.len());

    for range in batch_ranges(pairs.len(), EVAL_BATCH) {
        let chunk = &pairs[range];
        let mut audio = Array2::zeros((chunk.len(), segment_len));
        for (pair, mut row) in chunk.iter().zip(audio.axis_iter_mut(Axis(0))) {
            if pair.audio_segment.len() != segment_len {
                return Err(Error::shape(&[segment_len], &[pair.audio_segment.len()]));
            }
            row.iter_mut()
                .zip(&pair.audio_segment)
                .for_each(|(dst, &src)| *dst = src);
        }

        let probs = student.predict(&audio)?;
        frame_probabilities.extend(probs.rows().into_iter().map(|r| r.to_vec()));
    }

    tracing::info!(
        source = %source.info().source_id,
        frames = frame_probabilities.len(),
        "evaluated source"
    );

    Ok(EvaluationStatistics {
        model_file: model_file.to_string(),
        sample_period_msec: sampler.period_msec(),
        frame_probabilities,
    })
}
