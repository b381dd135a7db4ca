mod client;
mod deletion;
mod harvest;

pub use client::*;
pub use deletion::*;
pub use harvest::*;
