pub mod db;
pub mod relational;
pub mod types;
pub mod vector;
