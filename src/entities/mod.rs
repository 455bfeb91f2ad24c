pub mod category;
pub mod product;
pub mod sale;
pub mod sale_item;
pub mod stock_movement;
pub mod user;

pub use sale::PaymentMethod;
pub use stock_movement::MovementType;
pub use user::Role;
