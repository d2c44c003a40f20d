//! The guardian: periodic reconciliation of expected vs. actual stock.

#[allow(clippy::module_inception)]
mod reconciler;
#[cfg(test)]
mod tests;

pub use reconciler::{ReconcilerConfig, ReconciliationReport, Reconciler};
