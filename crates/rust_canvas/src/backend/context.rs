//! GL context sharing bookkeeping
//!
//! A [`SharedContext`] is one context identity. The first canvas that joins it
//! becomes the owner and creates the native context; every later canvas
//! receives the owner's handle. There is no release protocol: the owning
//! canvas must outlive the canvases sharing with it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

use crate::error::AppError;

/// Opaque native GL context identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeContextHandle(pub u64);

/// How a canvas joined a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    /// Created the native context
    Owner,
    /// Reuses the owner's native context
    Sharer,
}

/// Outcome of [`SharedContext::add_ref`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextRef {
    /// The native context to render with
    pub handle: NativeContextHandle,
    /// Whether the caller created it
    pub role: ContextRole,
}

#[derive(Debug, Default)]
struct ContextState {
    backend: RefCell<Option<String>>,
    handle: Cell<Option<NativeContextHandle>>,
    refs: Cell<usize>,
}

/// One shareable GL context identity
///
/// Cloning yields another handle to the same identity.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    state: Rc<ContextState>,
}

impl SharedContext {
    /// A fresh identity nobody has joined yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Join this identity from a canvas of backend `backend_name`
    ///
    /// The first caller runs `create` and becomes the owner. Joining from a
    /// different backend than the owner's is a configuration error.
    pub fn add_ref<F>(&self, backend_name: &str, create: F) -> Result<ContextRef, AppError>
    where
        F: FnOnce() -> Result<NativeContextHandle, AppError>,
    {
        self.join(backend_name, || create().map(|handle| (handle, ())), |_| Ok(()))
            .map(|(joined, ())| joined)
    }

    /// Like [`add_ref`](Self::add_ref), but a sharer first runs `share` with
    /// the owner's handle
    ///
    /// The reference is only counted once `create` or `share` succeeded, so
    /// a failed native resource never leaves the count inflated.
    pub fn join<T, C, S>(
        &self,
        backend_name: &str,
        create: C,
        share: S,
    ) -> Result<(ContextRef, T), AppError>
    where
        C: FnOnce() -> Result<(NativeContextHandle, T), AppError>,
        S: FnOnce(NativeContextHandle) -> Result<T, AppError>,
    {
        if let Some(owner_backend) = self.state.backend.borrow().as_deref() {
            if !owner_backend.eq_ignore_ascii_case(backend_name) {
                return Err(AppError::Configuration(format!(
                    "Cannot share a '{owner_backend}' context with a '{backend_name}' canvas"
                )));
            }
        }

        if let Some(handle) = self.state.handle.get() {
            let resource = share(handle)?;
            self.state.refs.set(self.state.refs.get() + 1);
            debug!("Sharing context {handle:?} ({} refs)", self.state.refs.get());
            return Ok((ContextRef { handle, role: ContextRole::Sharer }, resource));
        }

        let (handle, resource) = create()?;
        self.state.backend.replace(Some(backend_name.to_string()));
        self.state.handle.set(Some(handle));
        self.state.refs.set(1);
        Ok((ContextRef { handle, role: ContextRole::Owner }, resource))
    }

    /// Native handle of the owner, once created
    pub fn handle(&self) -> Option<NativeContextHandle> {
        self.state.handle.get()
    }

    /// Backend of the owner, once created
    pub fn backend_name(&self) -> Option<String> {
        self.state.backend.borrow().clone()
    }

    /// Number of canvases that joined
    pub fn ref_count(&self) -> usize {
        self.state.refs.get()
    }

    /// Whether both values are the same identity
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_caller_owns_and_later_callers_share() {
        let shared = SharedContext::new();
        let mut created = 0;

        let first = shared
            .add_ref("headless", || {
                created += 1;
                Ok(NativeContextHandle(7))
            })
            .unwrap();
        let second = shared
            .add_ref("headless", || Ok(NativeContextHandle(99)))
            .unwrap();

        assert_eq!(created, 1);
        assert_eq!(first.role, ContextRole::Owner);
        assert_eq!(second.role, ContextRole::Sharer);
        assert_eq!(first.handle, second.handle);
        assert_eq!(shared.ref_count(), 2);
    }

    #[test]
    fn test_cross_backend_sharing_is_rejected() {
        let shared = SharedContext::new();
        shared.add_ref("glfw", || Ok(NativeContextHandle(1))).unwrap();
        let err = shared.add_ref("headless", || Ok(NativeContextHandle(2))).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert_eq!(shared.ref_count(), 1);
    }

    #[test]
    fn test_failed_creation_leaves_identity_unowned() {
        let shared = SharedContext::new();
        let result = shared.add_ref("glfw", || Err(AppError::NativeResource("no GL".into())));
        assert!(result.is_err());
        assert!(shared.handle().is_none());

        let retry = shared.add_ref("headless", || Ok(NativeContextHandle(3))).unwrap();
        assert_eq!(retry.role, ContextRole::Owner);
        assert_eq!(shared.backend_name().as_deref(), Some("headless"));
    }

    #[test]
    fn test_failed_share_is_not_counted() {
        let shared = SharedContext::new();
        shared
            .join("glfw", || Ok((NativeContextHandle(4), "owner")), |_| Ok("unused"))
            .unwrap();

        let err = shared
            .join("glfw", || Ok((NativeContextHandle(5), "unused")), |_| {
                Err::<&str, _>(AppError::NativeResource("window refused".into()))
            })
            .unwrap_err();
        assert!(matches!(err, AppError::NativeResource(_)));
        assert_eq!(shared.ref_count(), 1);

        let (joined, window) = shared
            .join("glfw", || Ok((NativeContextHandle(6), "unused")), |handle| {
                assert_eq!(handle, NativeContextHandle(4));
                Ok("sharer")
            })
            .unwrap();
        assert_eq!(joined.role, ContextRole::Sharer);
        assert_eq!(window, "sharer");
        assert_eq!(shared.ref_count(), 2);
    }
}
