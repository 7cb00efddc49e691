//! Database models.

pub mod group;
pub mod theme;
pub mod user;

pub use group::GroupMembership;
pub use theme::{ThemeDescriptor, ThemeRecord, ThemeState, ThemeType};
pub use user::{NewUser, User, UserLookupKey, UserQuery};
