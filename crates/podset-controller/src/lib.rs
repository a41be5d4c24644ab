pub mod app;
pub mod cmd;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export main modules
pub use domain::dispatch;
pub use domain::reconciler;
pub use infrastructure::k8s;
pub use infrastructure::kube_client;
