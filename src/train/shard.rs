//! Data-parallel gradient computation
//!
//! A batch is split into contiguous shards. Each shard runs forward and
//! backward on its own replica of the student, built from a parameter
//! snapshot on a rayon worker. Shard gradients are then summed in shard
//! order, which keeps the reduction deterministic.

use crate::autograd::backward;
use crate::distill::KlDivergenceObjective;
use crate::student::{StudentNetwork, StudentSnapshot};
use crate::{Error, Result};
use ndarray::{s, Array1, Array2, ArrayView2};
use rayon::prelude::*;
use std::ops::Range;

/// Gradients and per-sample losses for a slice of a batch
#[derive(Debug, Clone)]
pub struct ShardOutput {
    /// One gradient per student parameter, in parameter order
    pub gradients: Vec<Array1<f32>>,
    /// Loss of each sample, in batch order
    pub losses: Vec<f32>,
}

impl ShardOutput {
    /// Fold `other` into `self`: gradients add, losses append
    fn merge(mut self, other: ShardOutput) -> Result<ShardOutput> {
        if self.gradients.len() != other.gradients.len() {
            return Err(Error::shape(&[self.gradients.len()], &[other.gradients.len()]));
        }
        for (acc, grad) in self.gradients.iter_mut().zip(&other.gradients) {
            *acc += grad;
        }
        self.losses.extend(other.losses);
        Ok(self)
    }
}

/// Split `len` rows into at most `shards` contiguous, non-empty ranges
/// whose sizes differ by at most one
pub fn shard_ranges(len: usize, shards: usize) -> Vec<Range<usize>> {
    let shards = shards.clamp(1, len.max(1));
    let base = len / shards;
    let extra = len % shards;

    let mut start = 0;
    (0..shards)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Forward and backward for one shard on a fresh replica
pub fn run_shard(
    snapshot: &StudentSnapshot,
    objective: &KlDivergenceObjective,
    audio: ArrayView2<f32>,
    teacher_probs: ArrayView2<f32>,
) -> Result<ShardOutput> {
    let replica = StudentNetwork::from_snapshot(snapshot);
    let logits = replica.forward(&audio.to_owned())?;
    let per_sample = objective.per_sample(&teacher_probs.to_owned(), &logits)?;
    let mut total = objective.total(&per_sample);
    backward(&mut total, None);

    Ok(ShardOutput {
        gradients: replica.gradients(),
        losses: per_sample.data().to_vec(),
    })
}

/// Compute summed gradients and per-sample losses for a whole batch
///
/// The result does not depend on `shards` beyond float summation order
/// within each shard.
pub fn run_sharded(
    student: &StudentNetwork,
    objective: &KlDivergenceObjective,
    audio: &Array2<f32>,
    teacher_probs: &Array2<f32>,
    shards: usize,
) -> Result<ShardOutput> {
    if audio.nrows() != teacher_probs.nrows() {
        return Err(Error::shape(&[audio.nrows()], &[teacher_probs.nrows()]));
    }

    let snapshot = student.snapshot();
    let ranges = shard_ranges(audio.nrows(), shards);

    let outputs: Vec<ShardOutput> = if ranges.len() == 1 {
        vec![run_shard(&snapshot, objective, audio.view(), teacher_probs.view())?]
    } else {
        ranges
            .into_par_iter()
            .map(|r| {
                run_shard(
                    &snapshot,
                    objective,
                    audio.slice(s![r.clone(), ..]),
                    teacher_probs.slice(s![r, ..]),
                )
            })
            .collect::<Result<Vec<_>>>()?
    };

    // Barrier: every shard has finished before gradients are combined
    let mut outputs = outputs.into_iter();
    let first = outputs
        .next()
        .ok_or_else(|| Error::InvalidParameter("cannot shard an empty batch".into()))?;
    outputs.try_fold(first, ShardOutput::merge)
}
