pub mod poller;
pub mod recharge_service;
pub mod validator;
pub mod wizard;

pub use poller::*;
pub use recharge_service::*;
pub use validator::*;
pub use wizard::*;
