pub mod ctrl;
pub mod error;
pub mod frame;
pub mod health;
