//! Runtime management for control-plane fixtures

pub mod addr;
pub mod apiserver;
pub mod control_plane;
pub mod defaulting;
pub mod etcd;
pub mod health;
pub mod output;
pub mod process;
pub mod templates;

use crate::error::{FixtureError, FixtureResult};
use defaulting::DefaultedProcessInput;
use process::{ProcessState, ProcessStatus};
use shared::{ComponentId, component_warn};
use templates::TemplateContext;

/// Reject a start while a previous run is still live; stopped or failed runs may restart
pub(crate) fn ensure_startable(state: Option<&ProcessState>) -> FixtureResult<()> {
    match state {
        Some(state) if matches!(state.status(), ProcessStatus::Starting | ProcessStatus::Ready | ProcessStatus::Stopping) => {
            Err(FixtureError::AlreadyStarted {
                binary: state.binary_name(),
            })
        }
        _ => Ok(()),
    }
}

/// Render argument templates, removing a fixture-created directory if that fails
pub(crate) fn render_args(
    component: ComponentId,
    input: &mut DefaultedProcessInput,
    templates: &[String],
    context: &TemplateContext,
) -> FixtureResult<Vec<String>> {
    templates::render_templates(templates, context).inspect_err(|_| {
        if let Err(e) = input.dir.cleanup() {
            component_warn!(component, "⚠️ Failed to remove data directory: {}", e);
        }
    })
}
