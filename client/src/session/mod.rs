pub mod manager;
pub mod state;
pub mod validation;

pub use manager::*;
pub use state::*;
pub use validation::{Credentials, MIN_PASSWORD_LEN, RegisterForm, Registration};
