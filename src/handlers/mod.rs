pub mod ctrl;
pub mod direct;
pub mod health;
pub mod ws;
