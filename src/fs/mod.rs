pub mod cache;
pub mod gateway;
pub mod names;
pub mod node;
pub mod reducer;
pub mod service;
pub mod sort;
pub mod store;
pub mod watcher;

#[cfg(test)]
pub mod testing;
