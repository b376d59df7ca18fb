pub mod debounce;
pub mod engine;
pub mod local_watcher;
pub mod paths;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod remote;

#[cfg(test)]
pub(crate) mod test_support;
