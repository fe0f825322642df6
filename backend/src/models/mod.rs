pub mod calendar;
pub mod checkin;
pub mod macros;
pub mod organization;
pub mod user;
pub mod vacation;

pub use calendar::*;
pub use checkin::*;
pub use organization::*;
pub use user::*;
pub use vacation::*;
