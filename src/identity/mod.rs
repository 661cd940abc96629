//! Identity store - staff users, roles and departments.

pub mod departments;
pub mod models;
pub mod users;

pub use models::{Department, DepartmentUpdate, NewUser, Role, User, UserUpdate};
