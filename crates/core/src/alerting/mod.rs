//! The alert agent and delivery plumbing.

mod agent;
mod dispatch;
#[cfg(test)]
mod tests;

pub use agent::AlertAgent;
pub use dispatch::{AlertDispatcher, EmailSender, LoggingEmailSender, MockEmailSender};
