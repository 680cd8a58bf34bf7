//! Terminal client for the video API.
//!
//! Each page controller owns its requests and rendering; they share only the
//! typed [`api::ApiClient`] and the [`ui::Interaction`] seam.

pub mod analysis;
pub mod api;
pub mod dashboard;
pub mod session;
pub mod ui;
pub mod upload;

pub use api::{ApiClient, ClientError};
pub use session::Session;
pub use ui::{Interaction, Page, TerminalUi};
