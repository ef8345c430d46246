//! Typed, reference-counted memory regions.
//!
//! An [`Array`] is a shared handle to raw memory together with an element
//! type, an element count and a reclamation [`Policy`]. Clones are views of
//! the same allocation; the memory is reclaimed according to the policy when
//! the last view is dropped.

use std::fmt;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TensorError};
use crate::scalar::{Component, ComponentType, Value};
use crate::storage::TypedValue;

/// Memory reclamation policy of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Policy {
    /// The caller keeps ownership; the array never frees its memory.
    UserOwns,
    /// Reclaimed with the C allocator's `free`.
    Free,
    /// Reclaimed as a Rust boxed slice of the element type.
    Delete,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::UserOwns => f.write_str("user"),
            Policy::Free => f.write_str("free"),
            Policy::Delete => f.write_str("delete"),
        }
    }
}

struct Content {
    ty: ComponentType,
    data: NonNull<u8>,
    len: usize,
    policy: Policy,
}

// SAFETY: `Content` is never mutated through a shared reference; mutable
// access goes through `Arc::get_mut`, which proves exclusivity.
unsafe impl Send for Content {}
unsafe impl Sync for Content {}

impl Drop for Content {
    fn drop(&mut self) {
        match self.policy {
            Policy::UserOwns => {}
            Policy::Free => unsafe { libc::free(self.data.as_ptr().cast()) },
            Policy::Delete => unsafe { reclaim_boxed(self.ty, self.data, self.len) },
        }
    }
}

unsafe fn reclaim_boxed(ty: ComponentType, data: NonNull<u8>, len: usize) {
    unsafe fn reclaim<T>(data: NonNull<u8>, len: usize) {
        let slice = ptr::slice_from_raw_parts_mut(data.as_ptr().cast::<T>(), len);
        drop(unsafe { Box::from_raw(slice) });
    }

    unsafe {
        match ty {
            ComponentType::Bool => reclaim::<bool>(data, len),
            ComponentType::Int => reclaim::<i32>(data, len),
            ComponentType::Float => reclaim::<f32>(data, len),
            ComponentType::Double => reclaim::<f64>(data, len),
        }
    }
}

/// A typed, fixed-length, shared memory region.
///
/// # Example
///
/// ```
/// use sptensors::storage::{Array, Policy};
/// use sptensors::ComponentType;
///
/// let a = Array::from_vec(vec![1.0f64, 2.0, 3.0]);
/// assert_eq!(a.component_type(), Some(ComponentType::Double));
/// assert_eq!(a.len(), 3);
/// assert_eq!(a.policy(), Some(Policy::Delete));
/// assert_eq!(a.as_slice::<f64>().unwrap(), &[1.0, 2.0, 3.0]);
/// assert_eq!(a.to_string(), "[1, 2, 3]");
/// ```
#[derive(Clone, Default)]
pub struct Array {
    content: Option<Arc<Content>>,
}

impl Array {
    /// Create an empty array of undefined element type.
    pub fn new() -> Self {
        Self { content: None }
    }

    /// Create an array over existing memory.
    ///
    /// A null `data` pointer yields an empty array.
    ///
    /// # Safety
    ///
    /// `data` must be null or valid for reads and writes of `len` elements of
    /// `ty`, properly aligned, for as long as any view of the array exists.
    /// With [`Policy::Free`] the memory must come from the C allocator; with
    /// [`Policy::Delete`] it must be a leaked `Box<[T]>` of exactly `len`
    /// elements of the Rust type matching `ty`. Nothing else may free it.
    pub unsafe fn from_raw_parts(
        ty: ComponentType,
        data: *mut u8,
        len: usize,
        policy: Policy,
    ) -> Self {
        match NonNull::new(data) {
            Some(data) => Self {
                content: Some(Arc::new(Content {
                    ty,
                    data,
                    len,
                    policy,
                })),
            },
            None => Self::new(),
        }
    }

    /// Take ownership of a vector; reclaimed with [`Policy::Delete`].
    pub fn from_vec<T: Component>(data: Vec<T>) -> Self {
        let len = data.len();
        let raw = Box::into_raw(data.into_boxed_slice());
        // SAFETY: a leaked boxed slice of `len` elements of `T`.
        unsafe { Self::from_raw_parts(T::TYPE, raw.cast::<T>().cast::<u8>(), len, Policy::Delete) }
    }

    /// Allocate `len` zeroed elements of `ty`.
    pub fn zeros(ty: ComponentType, len: usize) -> Self {
        match ty {
            ComponentType::Bool => Self::from_vec(vec![false; len]),
            ComponentType::Int => Self::from_vec(vec![0i32; len]),
            ComponentType::Float => Self::from_vec(vec![0f32; len]),
            ComponentType::Double => Self::from_vec(vec![0f64; len]),
        }
    }

    /// Build an array of `ty` from dynamically typed values.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::TypeMismatch` if any value has a different type.
    pub fn from_values(ty: ComponentType, values: &[Value]) -> Result<Self> {
        let mut array = Self::zeros(ty, values.len());
        for (i, &value) in values.iter().enumerate() {
            array.slot_mut(i)?.store(value)?;
        }
        Ok(array)
    }

    /// Element type, or `None` for an empty array created with [`Array::new`].
    #[inline]
    pub fn component_type(&self) -> Option<ComponentType> {
        self.content.as_ref().map(|c| c.ty)
    }

    /// Reclamation policy, or `None` for an unbacked array.
    #[inline]
    pub fn policy(&self) -> Option<Policy> {
        self.content.as_ref().map(|c| c.policy)
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the array content in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.len * c.ty.width())
    }

    /// Number of views sharing this allocation.
    pub fn reference_count(&self) -> usize {
        self.content.as_ref().map_or(0, Arc::strong_count)
    }

    /// Whether two arrays are views of the same allocation.
    pub fn ptr_eq(&self, other: &Array) -> bool {
        match (&self.content, &other.content) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Get raw pointer to the data (null when unbacked).
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.content
            .as_ref()
            .map_or(ptr::null(), |c| c.data.as_ptr().cast_const())
    }

    /// Get mutable raw pointer to the data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::SharedStorage` if other views exist.
    pub fn as_mut_ptr(&mut self) -> Result<*mut u8> {
        Ok(self.unique()?.map_or(ptr::null_mut(), |c| c.data.as_ptr()))
    }

    /// Get immutable typed slice of the data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::TypeMismatch` if `T` is not the element type.
    pub fn as_slice<T: Component>(&self) -> Result<&[T]> {
        match &self.content {
            None => Ok(&[]),
            Some(c) => {
                check_type(c.ty, T::TYPE)?;
                // SAFETY: constructor contract guarantees `len` valid elements.
                Ok(unsafe { std::slice::from_raw_parts(c.data.as_ptr().cast::<T>(), c.len) })
            }
        }
    }

    /// Get mutable typed slice of the data.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::TypeMismatch` on a wrong `T`, or
    /// `TensorError::SharedStorage` if other views exist.
    pub fn as_mut_slice<T: Component>(&mut self) -> Result<&mut [T]> {
        match self.unique()? {
            None => Ok(&mut []),
            Some(c) => {
                check_type(c.ty, T::TYPE)?;
                // SAFETY: exclusive access proven by `Arc::get_mut`.
                Ok(unsafe { std::slice::from_raw_parts_mut(c.data.as_ptr().cast::<T>(), c.len) })
            }
        }
    }

    /// Read element `i` as a dynamically typed value.
    pub fn get(&self, i: usize) -> Option<Value> {
        let c = self.content.as_ref()?;
        if i >= c.len {
            return None;
        }
        // SAFETY: `i` is in bounds and the slot holds a `c.ty`.
        Some(unsafe { (c.ty.ops().load)(c.data.as_ptr().add(i * c.ty.width())) })
    }

    /// Bind a dynamically typed handle to element `i`.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `i >= len`, or
    /// `TensorError::SharedStorage` if other views exist.
    pub fn slot_mut(&mut self, i: usize) -> Result<TypedValue<'_>> {
        let len = self.len();
        let c = self.unique()?.ok_or(TensorError::IndexOutOfBounds {
            index: i,
            dim: 0,
            dim_size: 0,
        })?;
        if i >= len {
            return Err(TensorError::IndexOutOfBounds {
                index: i,
                dim: 0,
                dim_size: len,
            });
        }
        // SAFETY: in bounds, exclusively borrowed for the handle's lifetime.
        Ok(unsafe { TypedValue::from_raw(c.ty, c.data.as_ptr().add(i * c.ty.width())) })
    }

    /// Overwrite the content with zero bytes.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::SharedStorage` if other views exist.
    pub fn zero(&mut self) -> Result<()> {
        if let Some(c) = self.unique()? {
            // SAFETY: `len * width` bytes are valid and exclusively borrowed.
            unsafe { ptr::write_bytes(c.data.as_ptr(), 0, c.len * c.ty.width()) };
        }
        Ok(())
    }

    /// Copy the content into a new array owned with [`Policy::Delete`].
    pub fn deep_clone(&self) -> Self {
        match &self.content {
            None => Self::new(),
            Some(c) => {
                let copy = Self::zeros(c.ty, c.len);
                if let Some(dst) = copy.content.as_ref() {
                    // SAFETY: both regions hold `len * width` bytes and do not overlap.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            c.data.as_ptr().cast_const(),
                            dst.data.as_ptr(),
                            c.len * c.ty.width(),
                        )
                    };
                }
                copy
            }
        }
    }

    /// Iterate over the elements as dynamically typed values.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    fn unique(&mut self) -> Result<Option<&Content>> {
        match &mut self.content {
            None => Ok(None),
            Some(arc) => {
                let references = Arc::strong_count(arc);
                Arc::get_mut(arc)
                    .map(|c| Some(&*c))
                    .ok_or(TensorError::SharedStorage { references })
            }
        }
    }
}

fn check_type(expected: ComponentType, actual: ComponentType) -> Result<()> {
    if expected != actual {
        return Err(TensorError::TypeMismatch { expected, actual });
    }
    Ok(())
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array")
            .field("type", &self.component_type())
            .field("len", &self.len())
            .field("policy", &self.policy())
            .finish()
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}
