mod gateway_config;
mod invoice;
mod payment;
mod refund;
mod subscription;
mod wallet;
mod webhook;

pub use gateway_config::*;
pub use invoice::*;
pub use payment::*;
pub use refund::*;
pub use subscription::*;
pub use wallet::*;
pub use webhook::*;
