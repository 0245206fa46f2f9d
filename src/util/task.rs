use futures::FutureExt;
use std::panic::AssertUnwindSafe;

/// Run `future`, turning a panic into its message.
///
/// Spawned work uses this so a panic reaches the owner as an event instead
/// of silently killing the task and leaving state half-updated.
pub(crate) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic payload".to_string()
            }
        })
}
