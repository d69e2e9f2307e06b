//! Translation of remote agent responses into chat messages.
//!
//! [`render`] is the pure per-item transform; [`render_batch`] drives it over a whole response
//! and hands the output to an injected [`MessageSink`].

mod delivery;
mod message;
mod render;

pub use delivery::{BatchReport, DeliveryError, ItemIssue, MessageSink, render_batch};
pub use message::{
    Action, ActionKind, Attachment, Field, Integration, OutboundMessage, SelectOption,
};
pub use render::{
    DATE_ACTION_ID, FILE_UPLOAD_SUFFIX, IMAGE_FALLBACK_TEXT, IMAGE_UPLOAD_SUFFIX, RenderContext,
    RenderIssue, Rendered, SELECT_ACTION_ID, YOUTUBE_WATCH_URL, image_file_name, render,
};
