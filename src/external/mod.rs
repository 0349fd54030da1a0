pub mod starshare;

pub use starshare::*;
