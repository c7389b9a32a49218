pub mod engagement;
pub mod gamification;
pub mod notification;
pub mod report;
pub mod user;
