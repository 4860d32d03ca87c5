pub mod assignments;
pub mod attendance;
pub mod catalog;
pub mod core;
pub mod enrollment;
pub mod fees;
pub mod grades;
pub mod hostel;
pub mod library;
pub mod notifications;
pub mod people;
pub mod progression;
pub mod teaching;
