//! Rendering backend interface.
//!
//! The renderer core decides what to draw and in which order; a backend
//! owns the GPU (or whatever sits underneath) and turns these calls into
//! commands. World surface rasterization and texture storage live entirely
//! behind this trait.

use bitflags::bitflags;
use q2core_common::q_shared::Vec3;

use crate::r_local::Entity;
use crate::r_matrix::Mat4;
use crate::r_model::WorldModel;

bitflags! {
    /// Toggleable pipeline state.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RenderState: u32 {
        const BLEND        = 1 << 0;
        const DEPTH_TEST   = 1 << 1;
        const DEPTH_WRITE  = 1 << 2;
        const CULL_FACE    = 1 << 3;
        const TEXTURE_2D   = 1 << 4;
        const ALPHA_TEST   = 1 << 5;
        const STENCIL_TEST = 1 << 6;
        const SCISSOR_TEST = 1 << 7;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR   = 1 << 0;
        const DEPTH   = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Points,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    LessEqual,
    GreaterEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// src_alpha, one_minus_src_alpha
    Alpha,
    /// one, one
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullFace {
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawBuffer {
    Front,
    Back,
}

/// Texture filtering, named after the GL modes the `gl_texturemode` cvar
/// accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMode {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl TextureMode {
    const MODES: [(&'static str, TextureMode); 6] = [
        ("GL_NEAREST", TextureMode::Nearest),
        ("GL_LINEAR", TextureMode::Linear),
        ("GL_NEAREST_MIPMAP_NEAREST", TextureMode::NearestMipmapNearest),
        ("GL_LINEAR_MIPMAP_NEAREST", TextureMode::LinearMipmapNearest),
        ("GL_NEAREST_MIPMAP_LINEAR", TextureMode::NearestMipmapLinear),
        ("GL_LINEAR_MIPMAP_LINEAR", TextureMode::LinearMipmapLinear),
    ];

    /// Case-insensitive lookup of a mode name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::MODES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, m)| m)
    }
}

/// One vertex of immediate geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vertex {
    pub xyz: Vec3,
    pub st: [f32; 2],
    pub rgba: [f32; 4],
}

impl Vertex {
    pub fn new(xyz: Vec3, st: [f32; 2], rgba: [f32; 4]) -> Self {
        Self { xyz, st, rgba }
    }

    pub fn colored(xyz: Vec3, rgba: [f32; 4]) -> Self {
        Self { xyz, st: [0.0; 2], rgba }
    }
}

/// World surfaces collected by the front-to-back BSP walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceBatch {
    pub opaque: Vec<usize>,
    pub sky: Vec<usize>,
}

impl SurfaceBatch {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.sky.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendStrings {
    pub vendor: String,
    pub renderer: String,
    pub version: String,
    pub extensions: String,
}

/// Trait defining what the renderer core needs from a graphics backend.
pub trait RenderBackend {
    /// Called at the start of each frame, before any clear.
    fn begin_frame(&mut self);

    /// Presents the frame.
    fn end_frame(&mut self);

    /// Identification printed by `gl_strings`.
    fn strings(&self) -> BackendStrings;

    // ========== Pipeline state ==========

    fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn load_projection(&mut self, m: &Mat4);
    fn load_modelview(&mut self, m: &Mat4);
    fn enable(&mut self, state: RenderState);
    fn disable(&mut self, state: RenderState);
    fn depth_range(&mut self, near: f32, far: f32);
    fn depth_func(&mut self, func: DepthFunc);
    fn cull_face(&mut self, face: CullFace);
    fn blend_mode(&mut self, mode: BlendMode);
    fn clear_color(&mut self, rgba: [f32; 4]);
    fn clear(&mut self, flags: ClearFlags);
    fn set_gamma(&mut self, gamma: f32);
    fn set_texture_mode(&mut self, mode: TextureMode);
    fn set_draw_buffer(&mut self, buffer: DrawBuffer);

    // ========== Textures ==========

    fn bind_texture(&mut self, texnum: i32);
    fn upload_image(&mut self, texnum: i32, width: u32, height: u32, rgba: &[u8]);
    /// Replaces the lightmap of one world surface.
    fn upload_lightmap(&mut self, surface: usize, smax: usize, tmax: usize, rgba: &[u8]);

    // ========== Geometry ==========

    fn point_size(&mut self, size: f32);
    fn draw(&mut self, primitive: Primitive, vertices: &[Vertex]);

    /// Draw the visible world surfaces, already sorted front to back.
    fn draw_world(&mut self, world: &WorldModel, batch: &SurfaceBatch);

    /// Draw alpha-blended world surfaces (water, glass, etc.).
    fn draw_alpha_surfaces(&mut self, world: &WorldModel, surfaces: &[usize]);

    /// Draw the surfaces of an inline brush model placed by `entity`.
    fn draw_brush_surfaces(&mut self, world: &WorldModel, entity: &Entity, surfaces: &[usize]);
}

// ============================================================
// RecordingBackend
// ============================================================

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    BeginFrame,
    EndFrame,
    Viewport(i32, i32, i32, i32),
    Scissor(i32, i32, i32, i32),
    Projection(Mat4),
    ModelView(Mat4),
    Enable(RenderState),
    Disable(RenderState),
    DepthRange(f32, f32),
    DepthFunc(DepthFunc),
    CullFace(CullFace),
    Blend(BlendMode),
    ClearColor([f32; 4]),
    Clear(ClearFlags),
    Gamma(f32),
    TextureMode(TextureMode),
    DrawBuffer(DrawBuffer),
    BindTexture(i32),
    UploadImage { texnum: i32, width: u32, height: u32 },
    UploadLightmap { surface: usize, smax: usize, tmax: usize, rgba: Vec<u8> },
    PointSize(f32),
    Draw { primitive: Primitive, vertices: Vec<Vertex> },
    DrawWorld(SurfaceBatch),
    DrawAlphaSurfaces(Vec<usize>),
    DrawBrushSurfaces { origin: Vec3, surfaces: Vec<usize> },
}

/// Headless backend that keeps every call for inspection. Embedders use it
/// to run the renderer without a GPU (dedicated tools, replay checks) and
/// the workspace's tests draw through it. It also tracks the enabled state
/// so callers can check what a pass leaves behind.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<BackendCall>,
    pub state: RenderState,
    pub bound_texture: i32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Only the geometry submitted through `draw`.
    pub fn draws(&self) -> Vec<(Primitive, &[Vertex])> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::Draw { primitive, vertices } => Some((*primitive, vertices.as_slice())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl RenderBackend for RecordingBackend {
    fn begin_frame(&mut self) {
        self.calls.push(BackendCall::BeginFrame);
    }

    fn end_frame(&mut self) {
        self.calls.push(BackendCall::EndFrame);
    }

    fn strings(&self) -> BackendStrings {
        BackendStrings {
            vendor: "q2core".to_string(),
            renderer: "recording".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extensions: String::new(),
        }
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(BackendCall::Viewport(x, y, width, height));
    }

    fn set_scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(BackendCall::Scissor(x, y, width, height));
    }

    fn load_projection(&mut self, m: &Mat4) {
        self.calls.push(BackendCall::Projection(*m));
    }

    fn load_modelview(&mut self, m: &Mat4) {
        self.calls.push(BackendCall::ModelView(*m));
    }

    fn enable(&mut self, state: RenderState) {
        self.state.insert(state);
        self.calls.push(BackendCall::Enable(state));
    }

    fn disable(&mut self, state: RenderState) {
        self.state.remove(state);
        self.calls.push(BackendCall::Disable(state));
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        self.calls.push(BackendCall::DepthRange(near, far));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.calls.push(BackendCall::DepthFunc(func));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.calls.push(BackendCall::CullFace(face));
    }

    fn blend_mode(&mut self, mode: BlendMode) {
        self.calls.push(BackendCall::Blend(mode));
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.calls.push(BackendCall::ClearColor(rgba));
    }

    fn clear(&mut self, flags: ClearFlags) {
        self.calls.push(BackendCall::Clear(flags));
    }

    fn set_gamma(&mut self, gamma: f32) {
        self.calls.push(BackendCall::Gamma(gamma));
    }

    fn set_texture_mode(&mut self, mode: TextureMode) {
        self.calls.push(BackendCall::TextureMode(mode));
    }

    fn set_draw_buffer(&mut self, buffer: DrawBuffer) {
        self.calls.push(BackendCall::DrawBuffer(buffer));
    }

    fn bind_texture(&mut self, texnum: i32) {
        self.bound_texture = texnum;
        self.calls.push(BackendCall::BindTexture(texnum));
    }

    fn upload_image(&mut self, texnum: i32, width: u32, height: u32, _rgba: &[u8]) {
        self.calls.push(BackendCall::UploadImage { texnum, width, height });
    }

    fn upload_lightmap(&mut self, surface: usize, smax: usize, tmax: usize, rgba: &[u8]) {
        self.calls.push(BackendCall::UploadLightmap {
            surface,
            smax,
            tmax,
            rgba: rgba.to_vec(),
        });
    }

    fn point_size(&mut self, size: f32) {
        self.calls.push(BackendCall::PointSize(size));
    }

    fn draw(&mut self, primitive: Primitive, vertices: &[Vertex]) {
        self.calls.push(BackendCall::Draw {
            primitive,
            vertices: vertices.to_vec(),
        });
    }

    fn draw_world(&mut self, _world: &WorldModel, batch: &SurfaceBatch) {
        self.calls.push(BackendCall::DrawWorld(batch.clone()));
    }

    fn draw_alpha_surfaces(&mut self, _world: &WorldModel, surfaces: &[usize]) {
        self.calls.push(BackendCall::DrawAlphaSurfaces(surfaces.to_vec()));
    }

    fn draw_brush_surfaces(&mut self, _world: &WorldModel, entity: &Entity, surfaces: &[usize]) {
        self.calls.push(BackendCall::DrawBrushSurfaces {
            origin: entity.origin,
            surfaces: surfaces.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_mode_names() {
        assert_eq!(TextureMode::from_name("gl_linear_mipmap_nearest"), Some(TextureMode::LinearMipmapNearest));
        assert_eq!(TextureMode::from_name("GL_NEAREST"), Some(TextureMode::Nearest));
        assert_eq!(TextureMode::from_name("GL_BOGUS"), None);
    }

    #[test]
    fn test_recording_tracks_state() {
        let mut b = RecordingBackend::new();
        b.enable(RenderState::BLEND | RenderState::DEPTH_TEST);
        b.disable(RenderState::BLEND);
        assert_eq!(b.state, RenderState::DEPTH_TEST);
        b.draw(Primitive::Quads, &[Vertex::default(); 4]);
        assert_eq!(b.draws().len(), 1);
        assert_eq!(b.draws()[0].1.len(), 4);
        assert_eq!(b.take_calls().len(), 3);
        assert!(b.calls.is_empty());
    }
}
