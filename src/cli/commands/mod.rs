pub mod db;
pub mod org;
pub mod plans;
