pub mod clinical;
pub mod session;
pub mod tools;
