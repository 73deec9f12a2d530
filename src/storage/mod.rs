//! Persistent variable storage consumed by the virtual machine.
//!
//! The node supplies an implementation of [`VariableStore`](store::VariableStore);
//! during execution all writes are buffered in an
//! [`OverlayStore`](store::OverlayStore) and applied atomically only when the
//! invocation completes successfully.

pub mod store;
pub mod var_key;
