mod compress;
mod health;
mod metrics;
mod origin;
mod payment;
mod usage;

pub use compress::compress_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use origin::ClientOrigin;
pub use payment::{create_order_handler, verify_payment_handler};
pub use usage::usage_handler;
