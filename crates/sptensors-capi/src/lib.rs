//! C API for sptensors
//!
//! This crate provides a C-compatible interface to double-valued sparse
//! tensors: create, insert, pack, and copy out the packed arrays.
//!
//! All extern "C" functions are inherently unsafe as they work with raw pointers
//! from foreign code. The `#[unsafe(no_mangle)]` attribute marks the entire
//! function signature as unsafe at the FFI boundary.

#![allow(clippy::not_unsafe_ptr_arg_deref)]

use libc::{c_char, c_double, c_int, size_t};
use sptensors::{Format, Tensor, TensorError};
use std::ffi::CStr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr;

// Status codes
pub type StatusCode = c_int;

pub const SPT_SUCCESS: StatusCode = 0;
pub const SPT_INVALID_ARGUMENT: StatusCode = -1;
pub const SPT_INVALID_FORMAT: StatusCode = -2;
pub const SPT_INDEX_OUT_OF_BOUNDS: StatusCode = -3;
pub const SPT_INTERNAL_ERROR: StatusCode = -4;
pub const SPT_INVALID_STATE: StatusCode = -5;
pub const SPT_WRONG_NUMBER_OF_INDICES: StatusCode = -6;
pub const SPT_NOT_SUPPORTED: StatusCode = -7;
pub const SPT_BUFFER_TOO_SMALL: StatusCode = -8;

fn status_of(err: &TensorError) -> StatusCode {
    match err {
        TensorError::WrongNumberOfIndices { .. } => SPT_WRONG_NUMBER_OF_INDICES,
        TensorError::IndexOutOfBounds { .. } => SPT_INDEX_OUT_OF_BOUNDS,
        TensorError::InvalidFormat { .. } => SPT_INVALID_FORMAT,
        TensorError::InvalidState { .. } => SPT_INVALID_STATE,
        TensorError::NotSupported { .. } => SPT_NOT_SUPPORTED,
        TensorError::TypeMismatch { .. } | TensorError::DuplicateCoordinate { .. } => {
            SPT_INVALID_ARGUMENT
        }
        _ => SPT_INTERNAL_ERROR,
    }
}

/// Run `f`, converting errors and panics into status codes.
fn guarded(f: impl FnOnce() -> Result<(), TensorError>) -> StatusCode {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => SPT_SUCCESS,
        Ok(Err(err)) => status_of(&err),
        Err(_) => {
            tracing::error!("panic caught at the C API boundary");
            SPT_INTERNAL_ERROR
        }
    }
}

/// Opaque tensor type for f64
#[repr(C)]
pub struct spt_tensor_f64 {
    _private: *mut std::ffi::c_void,
}

impl spt_tensor_f64 {
    fn from_tensor(tensor: Tensor<f64>) -> Self {
        let boxed = Box::new(tensor);
        Self {
            _private: Box::into_raw(boxed) as *mut std::ffi::c_void,
        }
    }

    fn inner(&self) -> &Tensor<f64> {
        unsafe { &*(self._private as *const Tensor<f64>) }
    }

    fn inner_mut(&mut self) -> &mut Tensor<f64> {
        unsafe { &mut *(self._private as *mut Tensor<f64>) }
    }
}

impl Drop for spt_tensor_f64 {
    fn drop(&mut self) {
        if !self._private.is_null() {
            unsafe {
                let _ = Box::from_raw(self._private as *mut Tensor<f64>);
            }
        }
    }
}

// ============================================================================
// Tensor lifecycle functions
// ============================================================================

/// Create an empty tensor in the staging state.
///
/// # Arguments
/// * `dims` - Pointer to array of dimension sizes
/// * `ndim` - Number of dimensions
/// * `format` - NUL-terminated level string, one letter per dimension
///   (`d` dense, `s` sparse), e.g. `"ds"` for CSR
/// * `status` - Pointer to receive status code
///
/// # Returns
/// Pointer to new tensor, or null on error
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_new(
    dims: *const size_t,
    ndim: size_t,
    format: *const c_char,
    status: *mut StatusCode,
) -> *mut spt_tensor_f64 {
    if status.is_null() {
        return ptr::null_mut();
    }

    if format.is_null() || (dims.is_null() && ndim > 0) {
        unsafe {
            *status = SPT_INVALID_ARGUMENT;
        }
        return ptr::null_mut();
    }

    let mut out = ptr::null_mut();
    let code = guarded(|| {
        let dims_slice: &[usize] = if ndim == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(dims, ndim) }
        };
        let format = unsafe { CStr::from_ptr(format) }
            .to_str()
            .map_err(|_| TensorError::InvalidFormat {
                message: "format string is not UTF-8".to_string(),
            })?
            .parse::<Format>()?;

        let tensor = Tensor::<f64>::new("", dims_slice, format)?;
        out = Box::into_raw(Box::new(spt_tensor_f64::from_tensor(tensor)));
        Ok(())
    });

    unsafe {
        *status = code;
    }
    out
}

/// Release (free) a tensor.
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_release(tensor: *mut spt_tensor_f64) {
    if !tensor.is_null() {
        unsafe {
            let _ = Box::from_raw(tensor);
        }
    }
}

// ============================================================================
// Staging and packing
// ============================================================================

/// Stage one value.
///
/// # Arguments
/// * `tensor` - Tensor pointer
/// * `coord` - Pointer to the 0-based coordinate
/// * `ncoord` - Number of coordinate entries (must equal the order)
/// * `value` - Value to insert
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_insert(
    tensor: *mut spt_tensor_f64,
    coord: *const size_t,
    ncoord: size_t,
    value: c_double,
) -> StatusCode {
    if tensor.is_null() || (coord.is_null() && ncoord > 0) {
        return SPT_INVALID_ARGUMENT;
    }

    guarded(|| unsafe {
        let coord_slice: &[usize] = if ncoord == 0 {
            &[]
        } else {
            std::slice::from_raw_parts(coord, ncoord)
        };
        (*tensor).inner_mut().insert(coord_slice, value)
    })
}

/// Pack the staged values.
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_pack(tensor: *mut spt_tensor_f64) -> StatusCode {
    if tensor.is_null() {
        return SPT_INVALID_ARGUMENT;
    }

    guarded(|| unsafe { (*tensor).inner_mut().pack() })
}

// ============================================================================
// Tensor query functions
// ============================================================================

/// Get the number of dimensions.
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_order(tensor: *const spt_tensor_f64) -> size_t {
    if tensor.is_null() {
        return 0;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe { (*tensor).inner().order() }));

    result.unwrap_or(0)
}

/// Get the number of stored values (0 before packing).
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_nnz(tensor: *const spt_tensor_f64) -> size_t {
    if tensor.is_null() {
        return 0;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        (*tensor).inner().stored_count()
    }));

    result.unwrap_or(0)
}

/// Get the length of the `segments` (`which == 0`) or `crd` (`which == 1`)
/// array of a level. Dense levels have no arrays and report 0.
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_level_len(
    tensor: *const spt_tensor_f64,
    level: size_t,
    which: c_int,
) -> size_t {
    if tensor.is_null() {
        return 0;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let packed = (*tensor).inner().packed();
        match (packed.sparse_index(level), which) {
            (Some(index), 0) => index.segments().len(),
            (Some(index), 1) => index.crd().len(),
            _ => 0,
        }
    }));

    result.unwrap_or(0)
}

fn copy_out<T: Copy>(src: &[T], out: *mut T, len: size_t) -> Result<(), StatusCode> {
    if len < src.len() {
        return Err(SPT_BUFFER_TOO_SMALL);
    }
    unsafe { ptr::copy_nonoverlapping(src.as_ptr(), out, src.len()) };
    Ok(())
}

/// Copy the `segments` (`which == 0`) or `crd` (`which == 1`) array of a
/// sparse level.
///
/// # Arguments
/// * `tensor` - Packed tensor
/// * `level` - Level index in storage order
/// * `which` - Array selector
/// * `out` - Output buffer
/// * `len` - Capacity of `out` in elements
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_copy_level(
    tensor: *const spt_tensor_f64,
    level: size_t,
    which: c_int,
    out: *mut c_int,
    len: size_t,
) -> StatusCode {
    if tensor.is_null() || out.is_null() {
        return SPT_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        let packed = (*tensor).inner().packed();
        let src = match (packed.sparse_index(level), which) {
            (Some(index), 0) => index.segments(),
            (Some(index), 1) => index.crd(),
            _ => return SPT_INVALID_ARGUMENT,
        };
        match copy_out(src, out, len) {
            Ok(()) => SPT_SUCCESS,
            Err(code) => code,
        }
    }));

    result.unwrap_or(SPT_INTERNAL_ERROR)
}

/// Copy the packed values.
#[unsafe(no_mangle)]
pub extern "C" fn spt_tensor_f64_copy_values(
    tensor: *const spt_tensor_f64,
    out: *mut c_double,
    len: size_t,
) -> StatusCode {
    if tensor.is_null() || out.is_null() {
        return SPT_INVALID_ARGUMENT;
    }

    let result = catch_unwind(AssertUnwindSafe(|| unsafe {
        match (*tensor).inner().packed().values().as_slice::<f64>() {
            Ok(src) => match copy_out(src, out, len) {
                Ok(()) => SPT_SUCCESS,
                Err(code) => code,
            },
            Err(err) => status_of(&err),
        }
    }));

    result.unwrap_or(SPT_INTERNAL_ERROR)
}
