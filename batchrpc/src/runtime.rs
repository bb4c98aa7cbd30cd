//! Process-scoped runtime.
//!
//! Shared library state is held in one explicit, reference-counted context
//! object instead of process globals: subsystems that need it keep a clone,
//! and teardown runs exactly once when the last clone drops. The runtime
//! also owns the step profiler that emits the opaque latency trace file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Reference-counted handle to the process-wide context.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    profiler: Profiler,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        if let Err(e) = self.profiler.stop() {
            tracing::warn!(error = %e, "failed to flush profiler trace");
        }
        tracing::debug!("runtime released");
    }
}

impl Runtime {
    /// Initialize the process-wide context. Call once at startup; clone the
    /// handle into every subsystem that depends on it.
    pub fn init() -> Runtime {
        tracing::debug!("runtime initialized");
        Runtime {
            inner: Arc::new(RuntimeInner {
                profiler: Profiler::new(),
            }),
        }
    }

    /// The step profiler owned by this runtime.
    pub fn profiler(&self) -> &Profiler {
        &self.inner.profiler
    }
}

struct Mark {
    label: &'static str,
    elapsed_ns: u64,
}

struct ProfilerState {
    filename: Option<PathBuf>,
    active: bool,
    marks: Vec<Mark>,
}

/// Step profiler: buffers labeled timing marks while active and writes them
/// to the configured trace file on stop. The file format is consumed by an
/// external profiling tool and treated as opaque here.
pub struct Profiler {
    state: Mutex<ProfilerState>,
}

impl Profiler {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProfilerState {
                filename: None,
                active: false,
                marks: Vec::new(),
            }),
        }
    }

    /// Set the trace file name, conventionally `latency_trace.<tool>.txt`.
    pub fn set_log_filename(&self, name: &str) {
        self.state.lock().unwrap().filename = Some(PathBuf::from(name));
    }

    /// Begin collecting marks.
    pub fn start(&self) {
        self.state.lock().unwrap().active = true;
    }

    /// Record one labeled mark. No-op unless the profiler is active.
    pub fn record(&self, label: &'static str, elapsed: std::time::Duration) {
        let mut state = self.state.lock().unwrap();
        if state.active {
            state.marks.push(Mark {
                label,
                elapsed_ns: elapsed.as_nanos() as u64,
            });
        }
    }

    /// Stop collecting and flush buffered marks to the trace file, if one
    /// was configured. Idempotent; a second stop writes nothing.
    pub fn stop(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.active = false;
        if state.marks.is_empty() {
            return Ok(());
        }
        let Some(path) = state.filename.clone() else {
            state.marks.clear();
            return Ok(());
        };
        let mut out = BufWriter::new(File::create(path)?);
        for (seq, mark) in state.marks.iter().enumerate() {
            writeln!(out, "{} {} {}", seq, mark.label, mark.elapsed_ns)?;
        }
        out.flush()?;
        state.marks.clear();
        Ok(())
    }
}
