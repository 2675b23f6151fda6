pub mod frame;
pub mod metrics;
pub mod throttle;

pub use frame::*;
pub use metrics::*;
pub use throttle::*;
