//! Detached execution of cache side effects.

use std::future::Future;

use tracing::Instrument;

/// How fire-and-forget work (population, invalidation) is executed.
///
/// `Background` hands the future to the Tokio runtime and returns at once; the
/// task's lifetime and errors are not linked to the caller. `Inline` awaits it
/// before returning so tests can observe outcomes deterministically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Spawner {
    #[default]
    Background,
    Inline,
}

impl Spawner {
    pub async fn run<F>(&self, task: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("detached", task);
        match self {
            Spawner::Background => {
                tokio::spawn(fut.instrument(span));
            }
            Spawner::Inline => fut.instrument(span).await,
        }
    }
}
