pub mod dispatch;
pub mod reconciler;
