pub mod account;
pub mod idempotency;
pub mod payment;
pub mod pricing;

pub use account::*;
pub use idempotency::*;
pub use payment::*;
pub use pricing::*;
