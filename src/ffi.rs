//! FFI bindings for Vendor Pulse
//!
//! This module provides C-compatible functions for running reports from other
//! languages. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `pulse_free_string`.
//!
//! Report calls answer with `{"status": <u16>, "body": <json>}`, the same shape
//! [`ReportProcessor::respond`] produces. NULL is only returned when the inputs
//! themselves are unusable (bad pointers, snapshot or configuration).

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::AnalyticsConfig;
use crate::error::ReportError;
use crate::pipeline::{ReportProcessor, ReportRequest};
use crate::schema::Snapshot;
use crate::store::SnapshotStore;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

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

fn build_processor(
    snapshot_json: &str,
    config_json: Option<&str>,
) -> Result<ReportProcessor<SnapshotStore>, ReportError> {
    let snapshot = Snapshot::parse(snapshot_json)?;
    let config = match config_json {
        Some(json) => AnalyticsConfig::from_json(json)?,
        None => AnalyticsConfig::default(),
    };
    ReportProcessor::new(SnapshotStore::new(snapshot), config)
}

fn respond_json(
    processor: &ReportProcessor<SnapshotStore>,
    request_json: &str,
) -> Result<String, ReportError> {
    let request: ReportRequest = serde_json::from_str(request_json)?;
    let response = processor.respond(&request);
    Ok(serde_json::to_string(&response)?)
}

/// Report the error and hand back NULL
fn fail<T>(msg: &str) -> *mut T {
    set_last_error(msg);
    ptr::null_mut()
}

// ============================================================================
// Stateless API
// ============================================================================

/// Run one report over a snapshot with the default configuration.
///
/// # Safety
/// - `snapshot_json` and `request_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_run_report(
    snapshot_json: *const c_char,
    request_json: *const c_char,
) -> *mut c_char {
    pulse_run_report_with_config(snapshot_json, ptr::null(), request_json)
}

/// Run one report over a snapshot with an explicit configuration.
///
/// # Safety
/// - `snapshot_json` and `request_json` must be valid null-terminated C strings.
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_run_report_with_config(
    snapshot_json: *const c_char,
    config_json: *const c_char,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    let Some(snapshot_str) = cstr_to_string(snapshot_json) else {
        return fail("Invalid snapshot string pointer");
    };
    let Some(request_str) = cstr_to_string(request_json) else {
        return fail("Invalid request string pointer");
    };
    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => return fail("Invalid config string pointer"),
        }
    };

    let result = build_processor(&snapshot_str, config_str.as_deref())
        .and_then(|processor| respond_json(&processor, &request_str));
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => fail(&e.to_string()),
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a processor holding a parsed snapshot
pub struct PulseProcessorHandle {
    processor: ReportProcessor<SnapshotStore>,
}

/// Parse a snapshot once and keep it for repeated report calls.
///
/// # Safety
/// - `snapshot_json` must be a valid null-terminated C string.
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer that must be freed with `pulse_processor_free`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_new(
    snapshot_json: *const c_char,
    config_json: *const c_char,
) -> *mut PulseProcessorHandle {
    clear_last_error();

    let Some(snapshot_str) = cstr_to_string(snapshot_json) else {
        return fail("Invalid snapshot string pointer");
    };
    let config_str = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => return fail("Invalid config string pointer"),
        }
    };

    match build_processor(&snapshot_str, config_str.as_deref()) {
        Ok(processor) => Box::into_raw(Box::new(PulseProcessorHandle { processor })),
        Err(e) => fail(&e.to_string()),
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_free(processor: *mut PulseProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Run one report with a stateful processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `pulse_processor_new`.
/// - `request_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `pulse_free_string`.
/// - Returns NULL on error; call `pulse_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn pulse_processor_run(
    processor: *const PulseProcessorHandle,
    request_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        return fail("Null processor pointer");
    }
    let handle = &*processor;

    let Some(request_str) = cstr_to_string(request_json) else {
        return fail("Invalid request string pointer");
    };

    match respond_json(&handle.processor, &request_str) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => fail(&e.to_string()),
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Pulse functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Pulse function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn pulse_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Pulse function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn pulse_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Pulse library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn pulse_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn sample_snapshot() -> CString {
        CString::new(
            r#"{
            "users": [{
                "_id": {"$oid": "64b000000000000000000001"},
                "userLoyaltyTier": [{"vendorId": "67f773acc9504931fcc411ec", "memberDateJoined": "2025-06-20"}],
                "bookings": [{"serviceId": {"$oid": "67f773acc9504931fcc411ec"}, "startTime": "2025-06-20T10:00:00"}]
            }],
            "member_visits": [],
            "facilities": []
        }"#,
        )
        .unwrap()
    }

    unsafe fn take_string(ptr: *mut c_char) -> String {
        assert!(!ptr.is_null());
        let s = CStr::from_ptr(ptr).to_str().unwrap().to_string();
        pulse_free_string(ptr);
        s
    }

    #[test]
    fn test_ffi_run_report() {
        let snapshot = sample_snapshot();
        let request = CString::new(r#"{"report": "weekly-bookings"}"#).unwrap();

        unsafe {
            let result = pulse_run_report(snapshot.as_ptr(), request.as_ptr());
            let json: serde_json::Value = serde_json::from_str(&take_string(result)).unwrap();
            assert_eq!(json["status"], 200);
            assert_eq!(json["body"]["series"][0]["data"], serde_json::json!([1]));
        }
    }

    #[test]
    fn test_ffi_client_error_is_a_response() {
        let snapshot = sample_snapshot();
        let request = CString::new(r#"{"report": "weekly-bookings", "vendorId": "bad"}"#).unwrap();

        unsafe {
            let result = pulse_run_report(snapshot.as_ptr(), request.as_ptr());
            let json: serde_json::Value = serde_json::from_str(&take_string(result)).unwrap();
            assert_eq!(json["status"], 400);
        }
    }

    #[test]
    fn test_ffi_with_config_and_processor_handle() {
        let snapshot = sample_snapshot();
        let config = CString::new(r#"{"currency": "USD"}"#).unwrap();
        let request = CString::new(r#"{"report": "weekly-sales"}"#).unwrap();

        unsafe {
            let handle = pulse_processor_new(snapshot.as_ptr(), config.as_ptr());
            assert!(!handle.is_null());

            let result = pulse_processor_run(handle, request.as_ptr());
            let json: serde_json::Value = serde_json::from_str(&take_string(result)).unwrap();
            assert_eq!(json["body"]["series"][0]["name"], "Sales (USD)");

            pulse_processor_free(handle);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        let bad_snapshot = CString::new("not json at all").unwrap();
        let request = CString::new(r#"{"report": "weekly-bookings"}"#).unwrap();

        unsafe {
            let result = pulse_run_report(bad_snapshot.as_ptr(), request.as_ptr());
            assert!(result.is_null());
            let error = pulse_last_error();
            assert!(!error.is_null());

            let result = pulse_run_report(ptr::null(), request.as_ptr());
            assert!(result.is_null());

            let unknown = CString::new(r#"{"report": "weekly-everything"}"#).unwrap();
            let snapshot = sample_snapshot();
            assert!(pulse_run_report(snapshot.as_ptr(), unknown.as_ptr()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = pulse_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
