//! Mne - markdown notes with embedded automation scripts
//!
//! [`markup`] turns note text into HTML, [`automation`] compiles and runs the
//! automation blocks found in it, and [`core`] holds documents, the workspace
//! store and configuration.

pub mod app;
pub mod automation;
pub mod core;
pub mod markup;
pub mod terminal;

pub use app::MneApp;
pub use markup::{
    automation_help, preview, preview_empty_state, render, render_document, RenderedDocument,
};
