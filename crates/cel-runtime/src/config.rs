//! Evaluation limits, feature flags, and the cancellation signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

/// Resource limits enforced during a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalLimits {
    /// Maximum AST recursion depth during evaluation (default: 500).
    pub(crate) max_recursion_depth: usize,
    /// Maximum comprehension iteration count, checked against the length of
    /// the iteration range before the loop runs (default: 1000).
    pub(crate) comprehension_max_iterations: u64,
    /// Maximum byte length of a string/bytes concatenation result
    /// (default: 1 MiB).
    pub(crate) max_concat_len: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 500,
            comprehension_max_iterations: 1000,
            max_concat_len: 1 << 20,
        }
    }
}

impl EvalLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn comprehension_max_iterations(mut self, iterations: u64) -> Self {
        self.comprehension_max_iterations = iterations;
        self
    }

    pub fn max_concat_len(mut self, len: usize) -> Self {
        self.max_concat_len = len;
        self
    }

    pub fn get_max_recursion_depth(&self) -> usize {
        self.max_recursion_depth
    }

    pub fn get_comprehension_max_iterations(&self) -> u64 {
        self.comprehension_max_iterations
    }

    pub fn get_max_concat_len(&self) -> usize {
        self.max_concat_len
    }
}

/// Behavior toggles for one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    /// When false, both operands of `&&`/`||` and both branches of `?:` are
    /// evaluated for observability; results are unchanged.
    pub short_circuit: bool,
    /// When false, uint constants are narrowed to int on entry.
    pub unsigned_longs: bool,
    /// When false, cross-kind numeric equality such as `2 == 2u` fails with
    /// no-such-overload.
    pub heterogeneous_comparisons: bool,
    /// When true, `timestamp(int)` is defined as seconds from epoch.
    pub timestamp_epoch: bool,
    /// When true, structured equality uses canonical comparison (NaN never
    /// equals NaN inside struct fields).
    pub proto_differencer_equality: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            short_circuit: true,
            unsigned_longs: true,
            heterogeneous_comparisons: true,
            timestamp_epoch: false,
            proto_differencer_equality: false,
        }
    }
}

impl Features {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn short_circuit(mut self, enabled: bool) -> Self {
        self.short_circuit = enabled;
        self
    }

    pub fn unsigned_longs(mut self, enabled: bool) -> Self {
        self.unsigned_longs = enabled;
        self
    }

    pub fn heterogeneous_comparisons(mut self, enabled: bool) -> Self {
        self.heterogeneous_comparisons = enabled;
        self
    }

    pub fn timestamp_epoch(mut self, enabled: bool) -> Self {
        self.timestamp_epoch = enabled;
        self
    }

    pub fn proto_differencer_equality(mut self, enabled: bool) -> Self {
        self.proto_differencer_equality = enabled;
        self
    }
}

/// Caller-supplied cancellation signal.
///
/// Checked between comprehension iterations and before each function
/// dispatch; once signalled, evaluation terminates with a cancelled error.
/// Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
