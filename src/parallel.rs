//! Evaluation of independent worksets on the rayon thread pool.
use crate::error::EvaluationError;
use crate::manager::EvaluationManager;
use crate::scalar::Number;
use crate::workset::Workset;
use log::debug;
use rayon::prelude::*;
use std::cell::RefCell;
use thread_local::ThreadLocal;

/// Evaluates worksets in parallel, with one [`EvaluationManager`] per worker thread.
///
/// Managers are created lazily by the factory the first time a worker thread needs one, and
/// are reused for all subsequent worksets handled by that thread. The factory must return a
/// manager in the `Ready` state. Evaluators that accumulate into shared global storage must
/// do so with an associative and commutative reduction, since worksets may contribute to the
/// same global entries from different threads.
pub struct ParallelWorksetEvaluator<S: Number, F> {
    factory: F,
    managers: ThreadLocal<RefCell<EvaluationManager<S>>>,
}

impl<S, F> ParallelWorksetEvaluator<S, F>
where
    S: Number,
    F: Fn() -> Result<EvaluationManager<S>, EvaluationError> + Sync,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            managers: ThreadLocal::new(),
        }
    }

    /// Calls `process` for every workset with the manager of the current worker thread.
    ///
    /// `process` typically fills source fields and then evaluates the workset. Stops at the
    /// first error encountered.
    pub fn for_each_workset<P>(&self, worksets: &[Workset], process: P) -> Result<(), EvaluationError>
    where
        P: Fn(&mut EvaluationManager<S>, &Workset) -> Result<(), EvaluationError> + Sync,
    {
        worksets.par_iter().try_for_each(|workset| {
            let manager = self.managers.get_or_try(|| {
                debug!("Creating evaluation manager for worker thread");
                (self.factory)().map(RefCell::new)
            })?;
            let manager = &mut *manager.borrow_mut();
            process(manager, workset)
        })
    }

    /// Evaluates every workset.
    pub fn evaluate_all(&self, worksets: &[Workset]) -> Result<(), EvaluationError> {
        self.for_each_workset(worksets, |manager, workset| manager.evaluate(workset))
    }

    /// Number of managers created so far.
    pub fn num_managers(&mut self) -> usize {
        self.managers.iter_mut().count()
    }
}
