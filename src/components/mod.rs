// Infrastructure pieces wired together at the composition root (`app`).
pub mod app;
pub mod backend;
pub mod configuration;
pub mod health;
pub mod notifier;
pub mod realtime;
pub mod session;
pub mod tracing;
