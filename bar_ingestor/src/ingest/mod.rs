pub mod locks;
pub mod pipeline;
pub mod progress;
pub mod retry;
