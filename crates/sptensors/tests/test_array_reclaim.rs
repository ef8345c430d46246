//! Tests for Array memory reclamation, observed through a tracking allocator.
//!
//! Covers:
//! - `UserOwns` never releases the caller's memory
//! - `Delete` releases exactly once, after the last view drops
//! - `Free` releases C allocations
//! - Zero-fill works under every policy
//!
//! Everything runs in one test so no other test thread allocates while a
//! pointer is being watched.

use std::alloc::{GlobalAlloc, Layout, System};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicUsize, Ordering};

use sptensors::{Array, ComponentType, Policy};

struct Tracking;

static WATCHED: AtomicUsize = AtomicUsize::new(0);
static HITS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for Tracking {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        if ptr as usize == WATCHED.load(Ordering::SeqCst) {
            HITS.fetch_add(1, Ordering::SeqCst);
        }
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static GLOBAL: Tracking = Tracking;

fn watch(ptr: *const u8) {
    HITS.store(0, Ordering::SeqCst);
    WATCHED.store(ptr as usize, Ordering::SeqCst);
}

fn hits() -> usize {
    HITS.load(Ordering::SeqCst)
}

#[test]
fn test_reclamation_policies() {
    // UserOwns: dropping every view leaves the memory alone.
    let mut data = ManuallyDrop::new(vec![1.0f64, 2.0, 3.0]);
    let ptr = data.as_mut_ptr();
    watch(ptr.cast::<u8>());
    let mut array = unsafe {
        Array::from_raw_parts(ComponentType::Double, ptr.cast::<u8>(), 3, Policy::UserOwns)
    };
    assert_eq!(array.as_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
    array.zero().unwrap();
    let view = array.clone();
    assert_eq!(view.as_slice::<f64>().unwrap(), &[0.0, 0.0, 0.0]);
    drop(array);
    drop(view);
    assert_eq!(hits(), 0);
    assert_eq!(data.as_slice(), &[0.0, 0.0, 0.0]);
    // The caller still owns it.
    unsafe { ManuallyDrop::drop(&mut data) };
    assert_eq!(hits(), 1);

    // Delete: released once, when the last view goes away.
    let array = Array::from_vec(vec![1i32, 2, 3, 4]);
    watch(array.as_ptr());
    let view = array.clone();
    drop(array);
    assert_eq!(hits(), 0);
    assert_eq!(view.as_slice::<i32>().unwrap(), &[1, 2, 3, 4]);
    drop(view);
    assert_eq!(hits(), 1);

    // Delete over a caller-leaked boxed slice.
    let boxed: Box<[f32]> = vec![0.5f32; 8].into_boxed_slice();
    let raw = Box::into_raw(boxed).cast::<u8>();
    watch(raw);
    let array = unsafe { Array::from_raw_parts(ComponentType::Float, raw, 8, Policy::Delete) };
    let copy = array.deep_clone();
    drop(array);
    assert_eq!(hits(), 1);
    assert_eq!(copy.as_slice::<f32>().unwrap(), &[0.5; 8]);

    // Free: C allocations go back to the C allocator, not the global one.
    let raw = unsafe { libc::calloc(4, std::mem::size_of::<i32>()) }.cast::<u8>();
    assert!(!raw.is_null());
    watch(raw);
    let mut array = unsafe { Array::from_raw_parts(ComponentType::Int, raw, 4, Policy::Free) };
    array.as_mut_slice::<i32>().unwrap()[2] = 7;
    assert_eq!(array.as_slice::<i32>().unwrap(), &[0, 0, 7, 0]);
    array.zero().unwrap();
    assert_eq!(array.as_slice::<i32>().unwrap(), &[0, 0, 0, 0]);
    assert_eq!(array.policy(), Some(Policy::Free));
    drop(array);
    assert_eq!(hits(), 0);

    watch(std::ptr::null());
}
