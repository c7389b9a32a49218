pub mod badges;
pub mod catalog;
pub mod engagement;
pub mod notifications;
pub mod points;
pub mod reports;
pub mod side_effects;
pub mod trending;
pub mod users;
