//! The flush pipeline's consumer side.

use crate::bundle::Bundle;
use std::future::Future;
use std::pin::Pin;

/// Receives every closed bundle.
///
/// The handler owns failure handling: by the time it runs, the `add` calls
/// that filled the bundle have long returned, so there is nobody to hand an
/// error back to. The bundle's size is released from the backlog once the
/// returned future completes (or panics).
///
/// Uses native async fn in traits; see [`BundleHandlerBoxed`] for dynamic
/// dispatch.
pub trait BundleHandler<T>: Send + Sync {
    /// Processes one closed bundle.
    fn handle(&self, bundle: Bundle<T>) -> impl Future<Output = ()> + Send;
}

/// Object-safe version of [`BundleHandler`].
pub trait BundleHandlerBoxed<T>: Send + Sync {
    /// Processes one closed bundle (boxed future for object safety).
    fn handle_boxed(&self, bundle: Bundle<T>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Blanket implementation: any BundleHandler can be used as BundleHandlerBoxed
impl<T: 'static, H: BundleHandler<T>> BundleHandlerBoxed<T> for H {
    fn handle_boxed(&self, bundle: Bundle<T>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.handle(bundle))
    }
}
