//! Dynamically typed handles to single scalar slots.

use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;

use crate::error::{Result, TensorError};
use crate::scalar::{Component, ComponentType, MAX_WIDTH, Value};

/// A type-tagged handle to one scalar memory slot.
///
/// The handle usually refers into an [`Array`](super::Array) or an external
/// scalar and does not own that memory. Handles created with
/// [`TypedValue::alloc`] own a private slot wide enough for any component
/// type; it is released by [`TypedValue::free_memory`] or on drop.
///
/// Comparisons dispatch on the component type at runtime and fail with
/// `TensorError::TypeMismatch` when the two types differ.
///
/// # Example
///
/// ```
/// use sptensors::storage::TypedValue;
/// use sptensors::{ComponentType, Value};
///
/// let mut a = TypedValue::alloc(ComponentType::Int);
/// let mut b = TypedValue::alloc(ComponentType::Int);
/// a.set_constant(3).unwrap();
/// b.set_constant(5).unwrap();
/// assert!(a.lt(&b).unwrap());
///
/// let mut x = 2.5f64;
/// let slot = TypedValue::bind(&mut x);
/// assert_eq!(slot.load().unwrap(), Value::Double(2.5));
/// assert!(slot.lt(&a).is_err());
/// ```
pub struct TypedValue<'a> {
    ty: Option<ComponentType>,
    loc: *mut u8,
    owned: bool,
    _marker: PhantomData<&'a mut u8>,
}

impl TypedValue<'static> {
    /// A handle bound to nothing.
    pub fn unbound() -> Self {
        Self {
            ty: None,
            loc: ptr::null_mut(),
            owned: false,
            _marker: PhantomData,
        }
    }

    /// Allocate a zeroed slot holding one element of `ty`.
    pub fn alloc(ty: ComponentType) -> Self {
        // SAFETY: plain C allocation; ownership is tracked by `owned`.
        let loc = unsafe { libc::calloc(1, MAX_WIDTH) }.cast::<u8>();
        if loc.is_null() {
            std::alloc::handle_alloc_error(
                std::alloc::Layout::from_size_align(MAX_WIDTH, MAX_WIDTH)
                    .unwrap_or(std::alloc::Layout::new::<u64>()),
            );
        }
        Self {
            ty: Some(ty),
            loc,
            owned: true,
            _marker: PhantomData,
        }
    }
}

impl<'a> TypedValue<'a> {
    /// Bind to an existing memory location.
    ///
    /// # Safety
    ///
    /// `loc` must be valid for reads and writes of one `ty` element for `'a`
    /// and must not be accessed through other references meanwhile.
    pub unsafe fn from_raw(ty: ComponentType, loc: *mut u8) -> Self {
        Self {
            ty: Some(ty),
            loc,
            owned: false,
            _marker: PhantomData,
        }
    }

    /// Bind to a statically typed scalar.
    pub fn bind<T: Component>(slot: &'a mut T) -> Self {
        // SAFETY: the exclusive borrow lives as long as the handle.
        unsafe { Self::from_raw(T::TYPE, (slot as *mut T).cast::<u8>()) }
    }

    #[inline]
    pub fn component_type(&self) -> Option<ComponentType> {
        self.ty
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        !self.loc.is_null()
    }

    /// The memory location (null when unbound).
    #[inline]
    pub fn get(&self) -> *mut u8 {
        self.loc
    }

    /// The memory location as a typed pointer.
    ///
    /// # Errors
    ///
    /// `TensorError::Unbound` or `TensorError::TypeMismatch`.
    pub fn as_ptr<T: Component>(&self) -> Result<*mut T> {
        let ty = self.bound_type()?;
        if ty != T::TYPE {
            return Err(TensorError::TypeMismatch {
                expected: ty,
                actual: T::TYPE,
            });
        }
        Ok(self.loc.cast::<T>())
    }

    /// Read the referenced value.
    pub fn load(&self) -> Result<Value> {
        let ty = self.bound_type()?;
        // SAFETY: bound handles point to a valid `ty` slot.
        Ok(unsafe { (ty.ops().load)(self.loc) })
    }

    /// Write a value of the held type.
    pub fn store(&mut self, value: Value) -> Result<()> {
        let ty = self.bound_type()?;
        if value.component_type() != ty {
            return Err(TensorError::TypeMismatch {
                expected: ty,
                actual: value.component_type(),
            });
        }
        // SAFETY: bound handles point to a valid, writable `ty` slot.
        unsafe { (ty.ops().store)(self.loc, value) };
        Ok(())
    }

    /// Copy type and value from another handle.
    ///
    /// Owned slots take on the source type; bound slots must already hold it.
    pub fn set(&mut self, other: &TypedValue<'_>) -> Result<()> {
        let value = other.load()?;
        if self.owned {
            self.ty = Some(value.component_type());
        }
        self.store(value)
    }

    /// Cast an integer constant into the held type and store it.
    pub fn set_constant(&mut self, constant: i32) -> Result<()> {
        let ty = self.bound_type()?;
        self.store(Value::from_constant(ty, constant))
    }

    /// Release memory obtained from [`TypedValue::alloc`].
    ///
    /// The handle is unbound afterwards.
    ///
    /// # Errors
    ///
    /// `TensorError::NotOwned` for handles bound to foreign memory.
    pub fn free_memory(&mut self) -> Result<()> {
        if !self.owned {
            return Err(TensorError::NotOwned);
        }
        // SAFETY: `owned` slots come from `libc::calloc` and are freed once.
        unsafe { libc::free(self.loc.cast()) };
        self.loc = ptr::null_mut();
        self.ty = None;
        self.owned = false;
        Ok(())
    }

    /// Compare with the native ordering of the shared component type.
    pub fn try_cmp(&self, other: &TypedValue<'_>) -> Result<Option<Ordering>> {
        self.load()?.try_cmp(&other.load()?)
    }

    pub fn lt(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(self.try_cmp(other)? == Some(Ordering::Less))
    }

    pub fn le(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(matches!(
            self.try_cmp(other)?,
            Some(Ordering::Less | Ordering::Equal)
        ))
    }

    pub fn gt(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(self.try_cmp(other)? == Some(Ordering::Greater))
    }

    pub fn ge(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(matches!(
            self.try_cmp(other)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))
    }

    pub fn eq(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(self.try_cmp(other)? == Some(Ordering::Equal))
    }

    pub fn ne(&self, other: &TypedValue<'_>) -> Result<bool> {
        Ok(!self.eq(other)?)
    }

    fn bound_type(&self) -> Result<ComponentType> {
        match self.ty {
            Some(ty) if !self.loc.is_null() => Ok(ty),
            _ => Err(TensorError::Unbound),
        }
    }
}

impl Drop for TypedValue<'_> {
    fn drop(&mut self) {
        if self.owned {
            // SAFETY: see `free_memory`.
            unsafe { libc::free(self.loc.cast()) };
        }
    }
}

impl fmt::Debug for TypedValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedValue")
            .field("type", &self.ty)
            .field("value", &self.load().ok())
            .field("owned", &self.owned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound() {
        let v = TypedValue::unbound();
        assert!(!v.is_bound());
        assert!(matches!(v.load(), Err(TensorError::Unbound)));
    }

    #[test]
    fn test_alloc_is_zeroed() {
        for ty in ComponentType::ALL {
            let v = TypedValue::alloc(ty);
            assert!(v.load().unwrap().is_zero());
        }
    }

    #[test]
    fn test_bind_writes_through() {
        let mut x = 0i32;
        {
            let mut slot = TypedValue::bind(&mut x);
            slot.set_constant(42).unwrap();
        }
        assert_eq!(x, 42);
    }

    #[test]
    fn test_set_retypes_owned_slot() {
        let mut src_val = 1.5f64;
        let src = TypedValue::bind(&mut src_val);
        let mut dst = TypedValue::alloc(ComponentType::Int);
        dst.set(&src).unwrap();
        assert_eq!(dst.component_type(), Some(ComponentType::Double));
        assert_eq!(dst.load().unwrap(), Value::Double(1.5));
    }

    #[test]
    fn test_set_rejects_retyping_bound_slot() {
        let mut src_val = 1.5f64;
        let src = TypedValue::bind(&mut src_val);
        let mut dst_val = 0i32;
        let mut dst = TypedValue::bind(&mut dst_val);
        assert!(matches!(
            dst.set(&src),
            Err(TensorError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_free_memory() {
        let mut v = TypedValue::alloc(ComponentType::Double);
        v.free_memory().unwrap();
        assert!(!v.is_bound());
        assert!(matches!(v.free_memory(), Err(TensorError::NotOwned)));

        let mut x = 1.0f32;
        let mut bound = TypedValue::bind(&mut x);
        assert!(matches!(bound.free_memory(), Err(TensorError::NotOwned)));
    }

    #[test]
    fn test_typed_pointer() {
        let mut x = 7i32;
        let slot = TypedValue::bind(&mut x);
        assert!(slot.as_ptr::<i32>().is_ok());
        assert!(slot.as_ptr::<f32>().is_err());
    }
}
