//! The unit of work a worker engine runs for each admitted item.

use async_trait::async_trait;

use crate::models::{ProcessingError, RestorationObject};

/// What one `run` produced
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunOutcome {
    pub file_count: usize,
    pub errors: Vec<ProcessingError>,
}

impl RunOutcome {
    pub fn new(file_count: usize, errors: Vec<ProcessingError>) -> Self {
        Self { file_count, errors }
    }

    pub fn success(file_count: usize) -> Self {
        Self::new(file_count, Vec::new())
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.errors.iter().any(|e| e.is_fatal)
    }
}

/// Work performed between admission and outcome routing. A processor is
/// owned by exactly one task and runs on whichever pool worker drew it.
#[async_trait]
pub trait Processor: Send {
    async fn run(&mut self) -> RunOutcome;

    /// Restoration job state worth caching after the run
    fn restoration_object(&self) -> Option<&RestorationObject> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_fatality() {
        assert!(!RunOutcome::success(3).has_fatal_errors());
        let outcome = RunOutcome::new(
            1,
            vec![
                ProcessingError::transient(1, "a", "slow"),
                ProcessingError::fatal(1, "b", "gone"),
            ],
        );
        assert!(outcome.has_fatal_errors());
    }
}
