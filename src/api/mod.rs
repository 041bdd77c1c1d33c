//! API module
//!
//! Contains HTTP request handlers for the evaluation core's thin surface:
//! publishing a definition, submitting against it, and reading results back.

pub mod definitions;
pub mod submissions;

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::store::Store;

/// Shared application state handed to every handler via axum's `State`.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<dyn Dispatcher>,
}

pub type SharedAppState = Arc<AppState>;
