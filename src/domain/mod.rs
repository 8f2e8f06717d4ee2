pub mod button;
pub mod cover;
pub mod entity;

pub use button::*;
pub use cover::*;
pub use entity::*;
