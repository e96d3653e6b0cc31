pub mod genre;
pub mod movie;
pub mod review;
pub mod user;
