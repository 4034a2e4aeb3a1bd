pub mod repository;
pub mod repository_sqlx;
pub mod sink;
pub mod types;
pub mod validator;
