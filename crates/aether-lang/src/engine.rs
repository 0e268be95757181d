use std::fmt::{self, Debug, Formatter};

use serde::Serialize;

use crate::{
    AetherResult,
    cache::{AstCache, CacheOptions, CacheStats},
    error::{Error, InnerError},
    eval::{
        Evaluator,
        env::{Env, EnvError},
        error::EvalError,
    },
    io::{Io, StdIo},
    limits::{Limits, RunStats},
    optimizer::OptimizationFlags,
    permission::Permissions,
    trace::{TraceEntry, TraceEvent, TraceKind, TraceOptions, TraceStats, Tracer},
    value::{SerializationError, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    pub optimization: OptimizationFlags,
    pub limits: Limits,
    pub trace: TraceOptions,
    pub cache: CacheOptions,
}

/// The embeddable interpreter.
///
/// An engine owns its global scope, AST cache, trace buffer, limits and
/// permissions. Globals persist across `eval` calls until [`Engine::reset_env`].
/// An engine is meant for one thread at a time; independent engines share
/// nothing.
pub struct Engine {
    env: Env,
    cache: AstCache,
    tracer: Tracer,
    limits: Limits,
    permissions: Permissions,
    optimization: OptimizationFlags,
    io: Box<dyn Io>,
    last_run: Option<RunStats>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Engine {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("env", &self.env)
            .field("cache", &self.cache.stats())
            .field("trace", &self.tracer.len())
            .field("limits", &self.limits)
            .field("permissions", &self.permissions)
            .field("optimization", &self.optimization)
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Closures stored in the root scope hold the root scope.
        self.env.reset();
    }
}

impl Engine {
    /// An engine with every capability denied.
    pub fn new() -> Self {
        Self::with_permissions(Permissions::restricted())
    }

    pub fn with_all_permissions() -> Self {
        Self::with_permissions(Permissions::all())
    }

    pub fn with_permissions(permissions: Permissions) -> Self {
        Self::with_options(permissions, Options::default())
    }

    pub fn with_options(permissions: Permissions, options: Options) -> Self {
        Self {
            env: Env::new(),
            cache: AstCache::new(options.cache),
            tracer: Tracer::new(options.trace),
            limits: options.limits,
            permissions,
            optimization: options.optimization,
            io: Box::new(StdIo),
            last_run: None,
        }
    }

    /// Replaces the I/O backend used by the I/O built-ins.
    pub fn with_io(mut self, io: impl Io + 'static) -> Self {
        self.io = Box::new(io);
        self
    }

    #[allow(clippy::result_large_err)]
    pub fn eval(&mut self, code: &str) -> AetherResult {
        tracing::debug!(bytes = code.len(), "eval started");

        let (program, cached) = match self.cache.get_or_compile(code, self.optimization) {
            Ok(compiled) => compiled,
            Err(err) => {
                self.tracer
                    .record(TraceEvent::new(TraceKind::Error, err.to_string()));
                return Err(Error::from_error(code, err));
            }
        };

        let mut evaluator = Evaluator::new(
            self.limits,
            self.permissions,
            &mut self.tracer,
            self.io.as_mut(),
        );
        let result = evaluator.eval(&program, &mut self.env);
        let stats = evaluator.stats();
        self.last_run = Some(stats);

        tracing::debug!(
            steps = stats.steps,
            max_depth = stats.max_depth,
            cached,
            ok = result.is_ok(),
            "eval finished"
        );

        result.map_err(|err: EvalError| Error::from_error(code, err))
    }

    /// Evaluates `code` and encodes the result as JSON text.
    #[allow(clippy::result_large_err)]
    pub fn eval_json(&mut self, code: &str) -> Result<String, Error> {
        let value = self.eval(code)?;
        value
            .to_json()
            .map(|json| json.to_string())
            .map_err(|err| Error::from_error(code, err))
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.env.set_global(name, value);
    }

    /// Decodes `json` and binds it in the global scope.
    #[allow(clippy::result_large_err)]
    pub fn set_global_json(&mut self, name: &str, json: &str) -> Result<(), Error> {
        if name.is_empty() {
            return Err(Error::without_source(InnerError::InvalidArgument(
                "variable name is empty".to_string(),
            )));
        }

        let value: serde_json::Value = serde_json::from_str(json).map_err(|err| {
            Error::without_source(InnerError::InvalidArgument(format!(
                "invalid JSON value: {}",
                err
            )))
        })?;

        self.set_global(name, Value::from(value));
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    pub fn get_global(&self, name: &str) -> Result<Value, Error> {
        self.env
            .get_global(name)
            .ok_or_else(|| Error::without_source(EnvError::UndefinedVariable(name.into())))
    }

    #[allow(clippy::result_large_err)]
    pub fn get_global_json(&self, name: &str) -> Result<String, Error> {
        let value = self.get_global(name)?;
        value
            .to_json()
            .map(|json| json.to_string())
            .map_err(Error::without_source)
    }

    /// Drops every global binding. The cache and the trace buffer are kept.
    pub fn reset_env(&mut self) {
        self.env.reset();
    }

    /// Drains the trace buffer into `[LEVEL] category: message` lines.
    pub fn take_trace(&mut self) -> Vec<String> {
        self.tracer
            .take()
            .iter()
            .map(TraceEntry::raw_line)
            .collect()
    }

    #[allow(clippy::result_large_err)]
    pub fn take_trace_json(&mut self) -> Result<String, Error> {
        to_json_string(&self.take_trace())
    }

    /// Structured copies of the buffered entries. The buffer is left as is.
    pub fn trace_records(&self) -> Vec<TraceEntry> {
        self.tracer.entries().cloned().collect()
    }

    #[allow(clippy::result_large_err)]
    pub fn trace_records_json(&self) -> Result<String, Error> {
        to_json_string(&self.trace_records())
    }

    pub fn trace_stats(&self) -> TraceStats {
        self.tracer.stats()
    }

    #[allow(clippy::result_large_err)]
    pub fn trace_stats_json(&self) -> Result<String, Error> {
        to_json_string(&self.trace_stats())
    }

    pub fn clear_trace(&mut self) {
        self.tracer.clear();
    }

    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Entries compiled under other flags stay in the cache but are no longer
    /// reachable, since the flags are part of the fingerprint.
    pub fn set_optimization(&mut self, flags: OptimizationFlags) {
        self.optimization = flags;
    }

    pub fn optimization(&self) -> OptimizationFlags {
        self.optimization
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// Counters of the most recent evaluation that got past compilation.
    pub fn last_run(&self) -> Option<RunStats> {
        self.last_run
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}

#[allow(clippy::result_large_err)]
fn to_json_string<T: Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value)
        .map_err(|err| Error::without_source(SerializationError::Json(err.to_string())))
}
