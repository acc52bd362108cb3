pub mod api;
pub mod auth;
pub mod beat;

pub use crate::domain::model::{AuthToken, BeatEvent, ContentBlob, Subscription};
pub use crate::domain::ports::{EventSink, Registry};
pub use crate::utils::error::Result;
