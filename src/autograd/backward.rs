//! Backward operation trait

/// A recorded op that knows how to push its output gradient to its inputs
///
/// Implementations read the gradient stored on their output, accumulate into every
/// input that requires grad, then recurse into the inputs' own backward ops.
pub trait BackwardOp {
    /// Propagate the output gradient one step down the tape
    fn backward(&self);
}
