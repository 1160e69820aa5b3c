//! Generation settings.

/// Configuration for one generation phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerConfig {
    /// Worker threads for procedure generation (0 = one per core).
    pub threads: usize,
    /// Emit reflection tables and `__$startup_type_info`.
    pub emit_type_info: bool,
    /// Emit the `main` trampoline around the entry-point procedure.
    pub emit_entry_point: bool,
}

impl Default for LowerConfig {
    fn default() -> Self {
        LowerConfig {
            threads: 0,
            emit_type_info: true,
            emit_entry_point: true,
        }
    }
}

impl LowerConfig {
    /// Everything on the calling thread's pool of one.
    pub fn single_threaded() -> Self {
        LowerConfig {
            threads: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_type_info(mut self, emit: bool) -> Self {
        self.emit_type_info = emit;
        self
    }

    #[must_use]
    pub fn with_entry_point(mut self, emit: bool) -> Self {
        self.emit_entry_point = emit;
        self
    }

    /// Worker count after resolving `0`.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            rayon::current_num_threads()
        } else {
            self.threads
        }
    }
}
