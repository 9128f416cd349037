//! Debug overlay orchestrator following the RSB module specification.
//!
//! The session controller and its boundary traits live in the private
//! `core` module, configuration in `config`.

mod config;
mod core;

pub use config::DevServerConfig;
pub use core::{
    DevOverlay, DialogPresenter, DialogState, InlineDispatcher, LiveReload, LiveReloadCallback,
    MenuSelection, ReloadAction, ReloadCallback, UiDispatcher, UiTask,
};
