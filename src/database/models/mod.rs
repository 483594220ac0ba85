pub mod drink;
pub mod user;

pub use drink::DrinkModel;
pub use user::{encrypt_password, UsersModel};
