//! C API for embedding the Aether interpreter.
//!
//! The host owns an opaque [`AetherHandle`] and talks to it through C strings.
//! Values cross the boundary as JSON text; every fallible call returns one of
//! the [`AetherErrorCode`] values.
//!
//! # Basic Usage
//!
//! ```c
//! AetherHandle* engine = aether_new();
//!
//! char* result = NULL;
//! char* error = NULL;
//! int code = aether_eval(engine, "Set X 40\nX + 2", &result, &error);
//!
//! if (code == 0) {
//!     printf("%s\n", result);          // 42
//!     aether_free_string(result);
//! } else {
//!     printf("error %d: %s\n", code, error);
//!     aether_free_string(error);
//! }
//!
//! aether_free(engine);
//! ```
//!
//! # Memory Management
//!
//! - `aether_new()` and `aether_new_with_permissions()` allocate a handle that
//!   must be released with `aether_free()`
//! - every `char**` output must be released with `aether_free_string()`
//! - the string returned by `aether_version()` is static and must not be freed
//!
//! # Threading
//!
//! A handle must not be used from two threads at the same time. Separate
//! handles share no state.
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::time::Duration;

use aether_lang::{CacheStats, Engine, ErrorCode, Limits, OptimizationFlags, Permissions};
use libc::{c_char, c_int};

/// Opaque handle for an Aether engine.
pub struct AetherHandle {
    engine: Engine,
}

/// Status codes returned by the fallible functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AetherErrorCode {
    Success = 0,
    ParseError = 1,
    RuntimeError = 2,
    PermissionDenied = 3,
    LimitExceeded = 4,
    SerializationError = 5,
    VariableNotFound = 6,
    InvalidArgument = 7,
}

impl From<ErrorCode> for AetherErrorCode {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Success => AetherErrorCode::Success,
            ErrorCode::ParseError => AetherErrorCode::ParseError,
            ErrorCode::RuntimeError => AetherErrorCode::RuntimeError,
            ErrorCode::PermissionDenied => AetherErrorCode::PermissionDenied,
            ErrorCode::LimitExceeded => AetherErrorCode::LimitExceeded,
            ErrorCode::SerializationError => AetherErrorCode::SerializationError,
            ErrorCode::VariableNotFound => AetherErrorCode::VariableNotFound,
            ErrorCode::InvalidArgument => AetherErrorCode::InvalidArgument,
        }
    }
}

impl From<AetherErrorCode> for c_int {
    fn from(code: AetherErrorCode) -> Self {
        code as c_int
    }
}

/// Execution limits configuration. Any value `<= 0` means unlimited, and
/// unlimited is reported back as `-1`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AetherLimits {
    pub max_steps: c_int,
    pub max_recursion_depth: c_int,
    pub max_duration_ms: c_int,
}

impl From<AetherLimits> for Limits {
    fn from(limits: AetherLimits) -> Self {
        Limits {
            max_steps: positive(limits.max_steps).map(u64::from),
            max_recursion_depth: positive(limits.max_recursion_depth),
            max_duration: positive(limits.max_duration_ms)
                .map(|ms| Duration::from_millis(u64::from(ms))),
        }
    }
}

impl From<Limits> for AetherLimits {
    fn from(limits: Limits) -> Self {
        AetherLimits {
            max_steps: limits.max_steps.map_or(-1, saturate),
            max_recursion_depth: limits
                .max_recursion_depth
                .map_or(-1, |depth| saturate(u64::from(depth))),
            max_duration_ms: limits.max_duration.map_or(-1, |duration| {
                saturate(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
            }),
        }
    }
}

/// Cache statistics.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AetherCacheStats {
    pub hits: c_int,
    pub misses: c_int,
    pub size: c_int,
}

impl From<CacheStats> for AetherCacheStats {
    fn from(stats: CacheStats) -> Self {
        AetherCacheStats {
            hits: saturate(stats.hits),
            misses: saturate(stats.misses),
            size: saturate(stats.size as u64),
        }
    }
}

fn positive(value: c_int) -> Option<u32> {
    u32::try_from(value).ok().filter(|value| *value > 0)
}

fn saturate(value: u64) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

// Interior NULs cannot cross the boundary; JSON output never contains them.
fn to_c_string(s: String) -> *mut c_char {
    let s = if s.contains('\0') { s.replace('\0', "") } else { s };
    CString::new(s).map_or_else(|_| ptr::null_mut(), |cs| cs.into_raw())
}

unsafe fn c_str<'a>(s: *const c_char) -> Result<&'a str, AetherErrorCode> {
    if s.is_null() {
        return Err(AetherErrorCode::InvalidArgument);
    }
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .map_err(|_| AetherErrorCode::InvalidArgument)
}

unsafe fn engine_mut<'a>(handle: *mut AetherHandle) -> Option<&'a mut Engine> {
    unsafe { handle.as_mut() }.map(|handle| &mut handle.engine)
}

unsafe fn write_out(out: *mut *mut c_char, s: String) {
    if !out.is_null() {
        unsafe { *out = to_c_string(s) };
    }
}

unsafe fn clear_out(out: *mut *mut c_char) {
    if !out.is_null() {
        unsafe { *out = ptr::null_mut() };
    }
}

/// Runs `f`, turning a panic into `RuntimeError` so it never unwinds into C.
fn guarded(f: impl FnOnce() -> Result<(), AetherErrorCode>) -> c_int {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => AetherErrorCode::Success.into(),
        Ok(Err(code)) => code.into(),
        Err(_) => {
            tracing::error!("panic caught at the C boundary");
            AetherErrorCode::RuntimeError.into()
        }
    }
}

fn guarded_void(f: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::error!("panic caught at the C boundary");
    }
}

fn new_handle(permissions: Permissions) -> *mut AetherHandle {
    panic::catch_unwind(|| {
        Box::into_raw(Box::new(AetherHandle {
            engine: Engine::with_permissions(permissions),
        }))
    })
    .unwrap_or(ptr::null_mut())
}

/// Create a new Aether engine instance with I/O denied.
///
/// Returns: Pointer to AetherHandle (must be freed with aether_free)
#[unsafe(no_mangle)]
pub extern "C" fn aether_new() -> *mut AetherHandle {
    new_handle(Permissions::restricted())
}

/// Create a new Aether engine with all IO permissions enabled
///
/// Returns: Pointer to AetherHandle (must be freed with aether_free)
#[unsafe(no_mangle)]
pub extern "C" fn aether_new_with_permissions() -> *mut AetherHandle {
    new_handle(Permissions::all())
}

/// Evaluate Aether code.
///
/// On success `*result` receives the JSON encoding of the program value. On
/// failure `*error` receives the error message and the error code is returned.
///
/// # Safety
/// - `handle` must be null or a pointer returned by `aether_new*` that was not freed
/// - `code` must be null or a valid null-terminated C string
/// - `result` and `error` must each be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_eval(
    handle: *mut AetherHandle,
    code: *const c_char,
    result: *mut *mut c_char,
    error: *mut *mut c_char,
) -> c_int {
    unsafe {
        clear_out(result);
        clear_out(error);
    }

    guarded(|| {
        let engine = unsafe { engine_mut(handle) }.ok_or(AetherErrorCode::InvalidArgument)?;
        let code = unsafe { c_str(code) }?;

        match engine.eval_json(code) {
            Ok(json) => {
                unsafe { write_out(result, json) };
                Ok(())
            }
            Err(err) => {
                unsafe { write_out(error, err.to_string()) };
                Err(err.error_code().into())
            }
        }
    })
}

/// Get the version string of Aether
///
/// Returns: C string with version (must NOT be freed)
#[unsafe(no_mangle)]
pub extern "C" fn aether_version() -> *const c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr().cast()
}

/// Free an Aether engine handle.
///
/// # Safety
/// `handle` must be null or a pointer returned by `aether_new*` that was not freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_free(handle: *mut AetherHandle) {
    if handle.is_null() {
        return;
    }
    guarded_void(|| unsafe {
        drop(Box::from_raw(handle));
    });
}

/// Free a string allocated by Aether.
///
/// # Safety
/// `s` must be null or a string returned through an output parameter of this
/// library, and must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_free_string(s: *mut c_char) {
    if s.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(s));
    }
}

/// Set a global variable from a JSON value.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `name` and `value_json` must be null or valid null-terminated C strings
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_set_global(
    handle: *mut AetherHandle,
    name: *const c_char,
    value_json: *const c_char,
) -> c_int {
    guarded(|| {
        let engine = unsafe { engine_mut(handle) }.ok_or(AetherErrorCode::InvalidArgument)?;
        let name = unsafe { c_str(name) }?;
        let value_json = unsafe { c_str(value_json) }?;

        engine
            .set_global_json(name, value_json)
            .map_err(|err| err.error_code().into())
    })
}

/// Get a global variable as JSON.
///
/// Returns `VariableNotFound` (6) when no global has that name.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `name` must be null or a valid null-terminated C string
/// - `value_json` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_get_global(
    handle: *mut AetherHandle,
    name: *const c_char,
    value_json: *mut *mut c_char,
) -> c_int {
    unsafe { clear_out(value_json) };

    guarded(|| {
        let engine = unsafe { engine_mut(handle) }.ok_or(AetherErrorCode::InvalidArgument)?;
        let name = unsafe { c_str(name) }?;
        let json = engine
            .get_global_json(name)
            .map_err(|err| AetherErrorCode::from(err.error_code()))?;

        unsafe { write_out(value_json, json) };
        Ok(())
    })
}

/// Reset the runtime environment (clears all variables).
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_reset_env(handle: *mut AetherHandle) {
    guarded_void(|| {
        if let Some(engine) = unsafe { engine_mut(handle) } {
            engine.reset_env();
        }
    });
}

/// Drain the trace buffer as a JSON array of `"[LEVEL] category: message"` lines.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `trace_json` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_take_trace(
    handle: *mut AetherHandle,
    trace_json: *mut *mut c_char,
) -> c_int {
    unsafe { json_out(handle, trace_json, Engine::take_trace_json) }
}

/// Clear the trace buffer.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_clear_trace(handle: *mut AetherHandle) {
    guarded_void(|| {
        if let Some(engine) = unsafe { engine_mut(handle) } {
            engine.clear_trace();
        }
    });
}

/// Get structured trace entries as a JSON array without draining the buffer.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `trace_json` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_trace_records(
    handle: *mut AetherHandle,
    trace_json: *mut *mut c_char,
) -> c_int {
    unsafe { json_out(handle, trace_json, |engine| engine.trace_records_json()) }
}

/// Get trace statistics as JSON.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `stats_json` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_trace_stats(
    handle: *mut AetherHandle,
    stats_json: *mut *mut c_char,
) -> c_int {
    unsafe { json_out(handle, stats_json, |engine| engine.trace_stats_json()) }
}

unsafe fn json_out(
    handle: *mut AetherHandle,
    out: *mut *mut c_char,
    f: impl FnOnce(&mut Engine) -> Result<String, aether_lang::Error>,
) -> c_int {
    unsafe { clear_out(out) };

    guarded(|| {
        let engine = unsafe { engine_mut(handle) }.ok_or(AetherErrorCode::InvalidArgument)?;
        let json = f(engine).map_err(|err| AetherErrorCode::from(err.error_code()))?;
        unsafe { write_out(out, json) };
        Ok(())
    })
}

/// Set execution limits.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `limits` must be null or point to a valid AetherLimits
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_set_limits(
    handle: *mut AetherHandle,
    limits: *const AetherLimits,
) {
    guarded_void(|| {
        if let (Some(engine), Some(limits)) = (unsafe { engine_mut(handle) }, unsafe {
            limits.as_ref()
        }) {
            engine.set_limits(Limits::from(*limits));
        }
    });
}

/// Get current execution limits.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `limits` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_get_limits(handle: *mut AetherHandle, limits: *mut AetherLimits) {
    guarded_void(|| {
        if let (Some(engine), Some(limits)) = (unsafe { engine_mut(handle) }, unsafe {
            limits.as_mut()
        }) {
            *limits = AetherLimits::from(engine.limits());
        }
    });
}

/// Clear the AST cache. Hit and miss counters are kept.
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_clear_cache(handle: *mut AetherHandle) {
    guarded_void(|| {
        if let Some(engine) = unsafe { engine_mut(handle) } {
            engine.clear_cache();
        }
    });
}

/// Get cache statistics.
///
/// # Safety
/// - `handle` must be null or a live handle
/// - `stats` must be null or valid for writes
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_cache_stats(
    handle: *mut AetherHandle,
    stats: *mut AetherCacheStats,
) {
    guarded_void(|| {
        if let (Some(engine), Some(stats)) = (unsafe { engine_mut(handle) }, unsafe {
            stats.as_mut()
        }) {
            *stats = AetherCacheStats::from(engine.cache_stats());
        }
    });
}

/// Set optimization options (non-zero enables a pass).
///
/// # Safety
/// `handle` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn aether_set_optimization(
    handle: *mut AetherHandle,
    constant_folding: c_int,
    dead_code_elimination: c_int,
    tail_recursion: c_int,
) {
    guarded_void(|| {
        if let Some(engine) = unsafe { engine_mut(handle) } {
            engine.set_optimization(OptimizationFlags {
                constant_folding: constant_folding != 0,
                dead_code_elimination: dead_code_elimination != 0,
                tail_recursion: tail_recursion != 0,
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn make_c_string(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        if ptr.is_null() {
            return String::new();
        }
        let s = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        unsafe { aether_free_string(ptr) };
        s
    }

    fn eval(handle: *mut AetherHandle, code: &str) -> (c_int, String, String) {
        let code = make_c_string(code);
        let mut result = ptr::null_mut();
        let mut error = ptr::null_mut();

        let status = unsafe { aether_eval(handle, code.as_ptr(), &mut result, &mut error) };
        unsafe { (status, take_string(result), take_string(error)) }
    }

    #[test]
    fn test_create_and_free() {
        let handle = aether_new();
        assert!(!handle.is_null());
        unsafe {
            aether_free(handle);
            aether_free(ptr::null_mut());
        }
    }

    #[rstest]
    #[case::number("1 + 2", 0, "3")]
    #[case::list(r#"[1, "a", Null]"#, 0, r#"[1,"a",null]"#)]
    #[case::parse_error("Set X (", 1, "")]
    #[case::runtime_error("1 / 0", 2, "")]
    #[case::permission_denied(r#"PRINTLN("x")"#, 3, "")]
    #[case::serialization_error("Lambda(X) { X }", 5, "")]
    fn test_eval(#[case] code: &str, #[case] expected_status: c_int, #[case] expected: &str) {
        let handle = aether_new();
        let (status, result, error) = eval(handle, code);

        assert_eq!(status, expected_status);
        assert_eq!(result, expected);
        assert_eq!(error.is_empty(), expected_status == 0);

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_eval_rejects_null_arguments() {
        let handle = aether_new();
        let mut result = ptr::null_mut();
        let mut error = ptr::null_mut();

        let status = unsafe { aether_eval(handle, ptr::null(), &mut result, &mut error) };
        assert_eq!(status, AetherErrorCode::InvalidArgument as c_int);

        let code = make_c_string("1");
        let status = unsafe {
            aether_eval(ptr::null_mut(), code.as_ptr(), &mut result, &mut error)
        };
        assert_eq!(status, AetherErrorCode::InvalidArgument as c_int);
        assert!(result.is_null());

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_eval_rejects_invalid_utf8() {
        let handle = aether_new();
        let bytes = [0xffu8, 0xfe, 0];
        let mut result = ptr::null_mut();
        let mut error = ptr::null_mut();

        let status =
            unsafe { aether_eval(handle, bytes.as_ptr().cast(), &mut result, &mut error) };
        assert_eq!(status, AetherErrorCode::InvalidArgument as c_int);

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_limit_exceeded() {
        let handle = aether_new();
        let limits = AetherLimits {
            max_steps: 20,
            max_recursion_depth: 0,
            max_duration_ms: -5,
        };
        unsafe { aether_set_limits(handle, &limits) };

        let (status, _, error) = eval(handle, "While (True) { 1 }");
        assert_eq!(status, AetherErrorCode::LimitExceeded as c_int);
        assert_eq!(error, "Limit exceeded: Steps");

        let mut current = AetherLimits {
            max_steps: 0,
            max_recursion_depth: 0,
            max_duration_ms: 0,
        };
        unsafe { aether_get_limits(handle, &mut current) };
        assert_eq!(
            current,
            AetherLimits {
                max_steps: 20,
                max_recursion_depth: -1,
                max_duration_ms: -1,
            }
        );

        unsafe { aether_free(handle) };
    }

    #[rstest]
    #[case::unlimited_depth(0)]
    #[case::default_depth(200)]
    fn test_deep_recursion_is_limit_exceeded(#[case] max_recursion_depth: c_int) {
        let handle = aether_new();
        let limits = AetherLimits {
            max_steps: 0,
            max_recursion_depth,
            max_duration_ms: 0,
        };
        unsafe { aether_set_limits(handle, &limits) };

        let (status, _, error) = eval(
            handle,
            "Func D(N) { If (N == 0) { 0 } Else { 1 + D(N - 1) } }\nD(100000)",
        );
        assert_eq!(status, AetherErrorCode::LimitExceeded as c_int);
        assert_eq!(error, "Limit exceeded: Recursion");

        let (status, result, _) = eval(handle, "D(150)");
        assert_eq!(status, 0);
        assert_eq!(result, "150");

        unsafe { aether_free(handle) };
    }

    #[rstest]
    #[case::parens(format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000)))]
    #[case::lists(format!("{}1{}", "[".repeat(10_000), "]".repeat(10_000)))]
    fn test_deep_nesting_is_parse_error(#[case] code: String) {
        let handle = aether_new();
        let (status, _, _) = eval(handle, &code);
        assert_eq!(status, AetherErrorCode::ParseError as c_int);
        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_default_limits() {
        let handle = aether_new();
        let mut limits = AetherLimits {
            max_steps: 0,
            max_recursion_depth: 0,
            max_duration_ms: 0,
        };
        unsafe { aether_get_limits(handle, &mut limits) };

        assert_eq!(limits.max_steps, -1);
        assert_eq!(limits.max_recursion_depth, 200);
        assert_eq!(limits.max_duration_ms, -1);

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_globals() {
        let handle = aether_new();
        let name = make_c_string("USER");
        let value = make_c_string(r#"{"name": "ada", "age": 36}"#);

        let status = unsafe { aether_set_global(handle, name.as_ptr(), value.as_ptr()) };
        assert_eq!(status, 0);

        let (status, result, _) = eval(handle, r#"USER["age"] + 1"#);
        assert_eq!((status, result.as_str()), (0, "37"));

        let mut out = ptr::null_mut();
        let status = unsafe { aether_get_global(handle, name.as_ptr(), &mut out) };
        assert_eq!(status, 0);
        assert_eq!(unsafe { take_string(out) }, r#"{"age":36,"name":"ada"}"#);

        unsafe { aether_reset_env(handle) };
        let status = unsafe { aether_get_global(handle, name.as_ptr(), &mut out) };
        assert_eq!(status, AetherErrorCode::VariableNotFound as c_int);
        assert!(out.is_null());

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_set_global_invalid_json() {
        let handle = aether_new();
        let name = make_c_string("X");
        let value = make_c_string("{not json");

        let status = unsafe { aether_set_global(handle, name.as_ptr(), value.as_ptr()) };
        assert_eq!(status, AetherErrorCode::InvalidArgument as c_int);

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_trace() {
        let handle = aether_new();
        eval(handle, r#"TRACE_INFO("app", "started")"#);

        let mut out = ptr::null_mut();
        assert_eq!(unsafe { aether_trace_stats(handle, &mut out) }, 0);
        let stats: serde_json::Value = serde_json::from_str(&unsafe { take_string(out) }).unwrap();
        assert_eq!(stats["total_entries"], 1);
        assert_eq!(stats["by_category"]["app"], 1);

        assert_eq!(unsafe { aether_trace_records(handle, &mut out) }, 0);
        let records: serde_json::Value =
            serde_json::from_str(&unsafe { take_string(out) }).unwrap();
        assert_eq!(records[0]["message"], "started");

        assert_eq!(unsafe { aether_take_trace(handle, &mut out) }, 0);
        assert_eq!(unsafe { take_string(out) }, r#"["[INFO] app: started"]"#);

        assert_eq!(unsafe { aether_take_trace(handle, &mut out) }, 0);
        assert_eq!(unsafe { take_string(out) }, "[]");

        eval(handle, r#"TRACE("again")"#);
        unsafe { aether_clear_trace(handle) };
        assert_eq!(unsafe { aether_trace_records(handle, &mut out) }, 0);
        assert_eq!(unsafe { take_string(out) }, "[]");

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_cache_and_optimization() {
        let handle = aether_new();
        eval(handle, "1 + 1");
        eval(handle, "1 + 1");

        let mut stats = AetherCacheStats::default();
        unsafe { aether_cache_stats(handle, &mut stats) };
        assert_eq!(
            stats,
            AetherCacheStats {
                hits: 1,
                misses: 1,
                size: 1
            }
        );

        unsafe { aether_set_optimization(handle, 0, 0, 0) };
        eval(handle, "1 + 1");
        unsafe { aether_cache_stats(handle, &mut stats) };
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.size, 2);

        unsafe { aether_clear_cache(handle) };
        unsafe { aether_cache_stats(handle, &mut stats) };
        assert_eq!(
            stats,
            AetherCacheStats {
                hits: 1,
                misses: 2,
                size: 0
            }
        );

        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_io_with_permissions() {
        let handle = aether_new_with_permissions();
        let (status, result, _) = eval(handle, r#"FILE_EXISTS("/definitely/not/here")"#);
        assert_eq!((status, result.as_str()), (0, "false"));
        unsafe { aether_free(handle) };
    }

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(aether_version()) };
        assert_eq!(version.to_str().unwrap(), Engine::version());
    }

    #[test]
    fn test_null_handle_is_ignored() {
        unsafe {
            aether_reset_env(ptr::null_mut());
            aether_clear_trace(ptr::null_mut());
            aether_clear_cache(ptr::null_mut());
            aether_set_optimization(ptr::null_mut(), 1, 1, 1);
            aether_set_limits(ptr::null_mut(), ptr::null());
        }

        let mut out = ptr::null_mut();
        let status = unsafe { aether_take_trace(ptr::null_mut(), &mut out) };
        assert_eq!(status, AetherErrorCode::InvalidArgument as c_int);
        assert!(out.is_null());
    }
}
