pub mod common;
pub mod order;
pub mod recharge;
pub mod session;

pub use common::*;
pub use order::*;
pub use recharge::*;
pub use session::*;
