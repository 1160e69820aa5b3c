//! Parallel procedure generation.
//!
//! The pending list is split into work units, one per top-level procedure.
//! A unit owns its procedure subtree for the duration, so nested procedure
//! literals are created and generated on the worker that found them:
//! a child is generated only after its parent has been finished and
//! published, depth-first in creation order.

use cg_backend::Backend;
use cg_ir::{EntityId, Span};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{GenerateError, GenerateReport, LowerError, ProcFailure};
use crate::lower::ProcCx;
use crate::module::Module;
use crate::procedure::{ProcArena, ProcId};
use crate::value::Value;

/// A top-level procedure and the nested procedures created under it.
pub(crate) struct WorkUnit {
    pub root: ProcId,
    pub procs: ProcArena,
    /// Nested procedures created in this unit, visible here before they
    /// are published to the module.
    pub nested: FxHashMap<EntityId, Value>,
}

impl WorkUnit {
    pub fn new(root: ProcId, procs: ProcArena) -> Self {
        WorkUnit {
            root,
            procs,
            nested: FxHashMap::default(),
        }
    }
}

pub(crate) struct UnitOutcome {
    pub unit: WorkUnit,
    pub report: GenerateReport,
    pub fatal: Option<GenerateError>,
}

impl<B: Backend> Module<'_, B> {
    /// Generate every collected procedure.
    ///
    /// Procedures that fail with a user-facing error are listed in the
    /// report and skipped together with their nested procedures; other
    /// procedures continue.
    ///
    /// # Errors
    /// The first backend failure, once all units have finished.
    pub fn generate(&mut self) -> Result<GenerateReport, GenerateError> {
        let pending = std::mem::take(&mut self.procedures_to_generate);
        let units: Vec<WorkUnit> = pending
            .into_iter()
            .map(|root| WorkUnit::new(root, self.arena.take_subtree(root)))
            .collect();
        let threads = self.config.effective_threads();
        debug!(units = units.len(), threads, "generating procedures");

        let this = &*self;
        let run = move || {
            units
                .into_par_iter()
                .map(|unit| this.generate_unit(unit))
                .collect::<Vec<_>>()
        };
        let outcomes = match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(run),
            Err(err) => {
                warn!(error = %err, "could not build worker pool; using the global pool");
                run()
            }
        };

        let mut report = GenerateReport::default();
        let mut fatal = None;
        for outcome in outcomes {
            self.arena.absorb(outcome.unit.procs);
            report.merge(outcome.report);
            if fatal.is_none() {
                fatal = outcome.fatal;
            }
        }
        debug!(
            generated = report.generated.len(),
            failed = report.failures.len(),
            "generation finished"
        );
        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Generate a unit's root, then its nested procedures.
    pub(crate) fn generate_unit(&self, mut unit: WorkUnit) -> UnitOutcome {
        let mut report = GenerateReport::default();
        let mut fatal = None;
        let mut stack = vec![unit.root];
        while let Some(id) = stack.pop() {
            let result = self.generate_procedure(&mut unit, id);
            let proc = unit.procs.proc(id);
            match result {
                Ok(diagnostics) => {
                    report.generated.push(proc.name.clone());
                    if !diagnostics.is_empty() {
                        report.failures.push(ProcFailure {
                            procedure: proc.name.clone(),
                            span: self.proc_span(id, &unit),
                            errors: diagnostics,
                            completed: true,
                        });
                    }
                    stack.extend(proc.children.iter().rev().copied());
                }
                Err(err) if err.is_fatal() => {
                    warn!(name = %proc.name, error = %err, "backend failure");
                    fatal = Some(GenerateError::from_fatal(proc.name.clone(), err));
                    break;
                }
                Err(err) => {
                    warn!(name = %proc.name, error = %err, "procedure abandoned");
                    report.failures.push(ProcFailure {
                        procedure: proc.name.clone(),
                        span: if err.span() == Span::DUMMY {
                            self.proc_span(id, &unit)
                        } else {
                            err.span()
                        },
                        errors: vec![err],
                        completed: false,
                    });
                }
            }
        }
        UnitOutcome {
            unit,
            report,
            fatal,
        }
    }

    /// Lower one procedure and publish it. On error the builder is dropped
    /// and nothing is published.
    fn generate_procedure(
        &self,
        unit: &mut WorkUnit,
        id: ProcId,
    ) -> Result<Vec<LowerError>, LowerError> {
        let diagnostics = {
            let mut cx = ProcCx::begin(self, unit, id)?;
            cx.lower_body()?;
            cx.finish()?
        };
        self.publish(id, unit.procs.proc_mut(id));
        Ok(diagnostics)
    }

    fn proc_span(&self, id: ProcId, unit: &WorkUnit) -> Span {
        let proc = unit.procs.proc(id);
        if let Some(body) = proc.body {
            return self.info.ast.body(body).span;
        }
        proc.entity.map_or(Span::DUMMY, |e| self.info.entity(e).span)
    }
}
