pub mod categories;
pub mod resolve;
