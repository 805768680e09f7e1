//! Parallel speaker election.

mod evaluator;

pub use evaluator::{
    evaluate_speakers, DEFAULT_EVALUATION_DEADLINE, DEFAULT_SILENCE_THRESHOLD,
};
