//! Bot replies and the controls attached to them.
//!
//! Every reply the bot sends for a voice message gets a [`ReplyRecord`] in
//! the [`ReplyRegistry`]. [`ReactionControls`] reacts to the delete and
//! configure reactions; [`SelectorController`] handles the model/language
//! selector that the configure reaction attaches.

mod controls;
mod record;
mod registry;
mod selector;

pub use controls::ReactionControls;
pub use record::{ReplyRecord, ReplyState, RetranscribeRequest};
pub use registry::{ReplyRegistry, SharedRecord};
pub use selector::{RETRANSCRIBE_LABEL, SelectorController, render};
