//! The media modal: one playback session at a time, driven through a [`ModalHandle`].

pub mod controller;
pub mod expiry;
pub mod identity;
pub mod state;

pub use controller::{MediaHost, ModalController, ModalHandle, ModalServices};
pub use expiry::{LinkStatus, check_link, validate_link};
pub use identity::IdentityGate;
pub use state::{CloseReason, MediaEvent, ModalInput, ModalPhase, ModalView, OpenRequest};
