pub mod entities;
pub mod money;
