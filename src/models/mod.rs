mod payment;
mod user;

pub use payment::*;
pub use user::*;
