pub mod config;
pub mod error;
pub mod io;
pub mod model;

// Collaborator traits are shared across threads natively but live on the
// browser event loop on wasm32, where futures are not `Send`.
#[cfg(target_arch = "wasm32")]
pub trait ServiceBounds {}
#[cfg(target_arch = "wasm32")]
impl<T> ServiceBounds for T {}

#[cfg(not(target_arch = "wasm32"))]
pub trait ServiceBounds: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> ServiceBounds for T {}
