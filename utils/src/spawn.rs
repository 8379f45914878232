use std::future::Future;

#[cfg(not(target_family = "wasm"))]
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future);
}

#[cfg(target_family = "wasm")]
pub fn spawn<F>(future: F)
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    use futures::FutureExt;

    // `spawn_local` only supports futures that return the unit type.
    wasm_bindgen_futures::spawn_local(future.map(|_| ()))
}
