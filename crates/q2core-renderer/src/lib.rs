#![allow(clippy::too_many_arguments, clippy::needless_range_loop, clippy::float_cmp,
         clippy::type_complexity, clippy::manual_range_contains)]

//! BSP renderer core: view setup, frustum culling, light sampling and
//! lightmap building, entity and particle composition, and the 2D layer.
//! All drawing goes through a [`r_backend::RenderBackend`].

pub mod r_matrix;
pub mod r_backend;
pub mod r_model;
pub mod r_image;
pub mod r_local;
pub mod r_light;
pub mod r_mesh;
pub mod r_main;
pub mod r_draw;

use q2core_common::common::{com_error, ComError, ErrorCode};
use thiserror::Error;

pub use r_backend::{RecordingBackend, RenderBackend};
pub use r_local::{Entity, RefDef};
pub use r_main::Renderer;

/// Conditions that abort a render call. These are caller misuse, never
/// bad runtime data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RendererError {
    #[error("R_RenderView: NULL worldmodel")]
    NullWorldModel,
    #[error("R_BuildLightMap called for non-lit surface")]
    NonLitSurface,
    #[error("Bad s_blocklights size")]
    BadBlocklightsSize,
    #[error("Bad modeltype")]
    BadModelType,
    #[error("Draw_Fill: bad color")]
    BadFillColor,
    #[error("Couldn't load pics/colormap.pcx")]
    MissingPalette,
}

impl RendererError {
    /// Logs the error and hands it to the engine as a fatal `ComError`.
    pub fn into_com_error(self) -> ComError {
        com_error(ErrorCode::Fatal, &self.to_string())
    }
}

impl From<RendererError> for ComError {
    fn from(err: RendererError) -> Self {
        err.into_com_error()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Routes `tracing` output to the test harness so renderer diagnostics
    /// show up with `--nocapture`.
    pub fn init_tracing() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(tracing::Level::DEBUG)
                .try_init();
        });
    }

    pub fn assert_near(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    }

    pub fn assert_vec_near(a: [f32; 3], b: [f32; 3]) {
        for i in 0..3 {
            assert_near(a[i], b[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_error_is_fatal_com_error() {
        let err: ComError = RendererError::NullWorldModel.into();
        assert!(err.is_fatal());
        assert_eq!(err.message, "R_RenderView: NULL worldmodel");
    }
}
