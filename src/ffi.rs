//! FFI bindings for Proctor Flux
//!
//! This module provides C-compatible functions for embedding the capture and
//! extraction core in a host (browser shell, desktop lockdown client).
//! All functions use C strings (null-terminated) and return allocated memory
//! that must be freed by the caller using `proctor_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Utc;

use crate::config::ProctorConfig;
use crate::error::ProctorError;
use crate::schema::{InputAdapter, InputRecord, Windowing};
use crate::session::SessionAggregator;
use crate::types::{PointerKind, RawPointerEvent};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Config from an optional JSON string; NULL means defaults
unsafe fn config_from_ptr(config_json: *const c_char) -> Result<ProctorConfig, String> {
    if config_json.is_null() {
        return Ok(ProctorConfig::default());
    }
    let json = cstr_to_string(config_json).ok_or("Invalid config string pointer")?;
    ProctorConfig::from_json(&json).map_err(|e| e.to_string())
}

/// NaN or infinity marks a missing coordinate
fn coordinate(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to a SessionAggregator
pub struct ProctorSessionHandle {
    aggregator: SessionAggregator,
}

/// Create a session aggregator that is capturing immediately.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `proctor_session_free`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_new(
    config_json: *const c_char,
) -> *mut ProctorSessionHandle {
    clear_last_error();

    match config_from_ptr(config_json) {
        Ok(config) => {
            let handle = Box::new(ProctorSessionHandle {
                aggregator: SessionAggregator::new(&config),
            });
            Box::into_raw(handle)
        }
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

/// Free a session aggregator.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_free(session: *mut ProctorSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Record a key transition. `is_down` is non-zero for Down, zero for Up.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `key` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_record_key(
    session: *mut ProctorSessionHandle,
    key: *const c_char,
    is_down: i32,
    timestamp: f64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let key_str = match cstr_to_string(key) {
        Some(s) => s,
        None => {
            set_last_error("Invalid key string pointer");
            return -1;
        }
    };

    if is_down != 0 {
        handle.aggregator.capture_key_down(&key_str, timestamp);
    } else {
        handle.aggregator.capture_key_up(&key_str, timestamp);
    }
    0
}

/// Record a pointer event.
///
/// `kind` is one of `move`, `click`, `hover`, `double_click`, `copy`, `cut`,
/// `paste`. Pass NaN for coordinates the event does not carry.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `kind` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_record_pointer(
    session: *mut ProctorSessionHandle,
    kind: *const c_char,
    x: f64,
    y: f64,
    timestamp: f64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let kind_str = match cstr_to_string(kind) {
        Some(s) => s,
        None => {
            set_last_error("Invalid kind string pointer");
            return -1;
        }
    };
    let kind: PointerKind = match serde_json::from_value(serde_json::Value::String(kind_str)) {
        Ok(kind) => kind,
        Err(e) => {
            set_last_error(&format!("Unknown pointer kind: {e}"));
            return -1;
        }
    };

    handle
        .aggregator
        .capture_pointer(RawPointerEvent::new(kind, coordinate(x), coordinate(y), timestamp));
    0
}

/// Record a tab visibility change. `visible` is non-zero when shown.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_record_visibility(
    session: *mut ProctorSessionHandle,
    visible: i32,
    timestamp: f64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;
    handle
        .aggregator
        .capture_pointer(RawPointerEvent::focus_change(visible != 0, timestamp));
    0
}

/// Record one input record given as JSON (`{"type": "keydown", ...}`).
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - `record_json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_record_json(
    session: *mut ProctorSessionHandle,
    record_json: *const c_char,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;

    let json_str = match cstr_to_string(record_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match serde_json::from_str::<InputRecord>(&json_str) {
        Ok(record) => {
            InputAdapter::apply(&mut handle.aggregator, &record);
            0
        }
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Tag subsequent windows with a question index. A negative index clears it.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_set_question(
    session: *mut ProctorSessionHandle,
    index: i64,
) -> i32 {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *session;
    handle
        .aggregator
        .set_question_index(u32::try_from(index).ok());
    0
}

/// Close the current window and return its report as JSON.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
/// - Returns a newly allocated string that must be freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_flush(session: *mut ProctorSessionHandle) -> *mut c_char {
    clear_last_error();

    if session.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *session;

    let report = handle.aggregator.flush();
    match serde_json::to_string(&report) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Stop capture and discard buffered events.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_stop(session: *mut ProctorSessionHandle) {
    if let Some(handle) = session.as_mut() {
        handle.aggregator.stop();
    }
}

/// Resume capture after `proctor_session_stop`.
///
/// # Safety
/// - `session` must be a valid pointer returned by `proctor_session_new`.
#[no_mangle]
pub unsafe extern "C" fn proctor_session_start(session: *mut ProctorSessionHandle) {
    if let Some(handle) = session.as_mut() {
        handle.aggregator.start();
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Extract one window from a batch of input records (JSON array or NDJSON).
///
/// # Safety
/// - `records` must be a valid null-terminated C string.
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Returns a newly allocated JSON array of window reports that must be
///   freed with `proctor_free_string`.
/// - Returns NULL on error; call `proctor_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn proctor_extract(
    records: *const c_char,
    config_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let input = match cstr_to_string(records) {
        Some(s) => s,
        None => {
            set_last_error("Invalid records string pointer");
            return ptr::null_mut();
        }
    };
    let config = match config_from_ptr(config_json) {
        Ok(config) => config,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let result = InputAdapter::parse(&input)
        .and_then(|records| {
            InputAdapter::replay(&records, &config, Utc::now(), Windowing::Single)
        })
        .and_then(|reports| serde_json::to_string(&reports).map_err(ProctorError::JsonError));

    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Proctor functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Proctor function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn proctor_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Proctor function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn proctor_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn proctor_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
