// r_local.rs: per-frame inputs and the renderer's cvar set

use q2core_common::cvar::CvarContext;
use q2core_common::q_shared::{
    DLight, LightStyle, Particle, Vec3, CVAR_ARCHIVE, CVAR_LATCH, CVAR_USERINFO, CVAR_ZERO,
};

use crate::r_image::ImageId;
use crate::r_model::ModelId;

/// Full-screen near plane distance.
pub const Z_NEAR: f64 = 4.0;
pub const Z_FAR: f64 = 4096.0;
pub const Z_FAR_SEE: f64 = 8192.0;

/// A renderable entity, copied per frame from the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    pub model: Option<ModelId>,
    pub angles: Vec3,

    // most recent data
    pub origin: Vec3,
    pub frame: i32,

    // previous data for lerping
    pub oldorigin: Vec3,
    pub oldframe: i32,

    /// 0.0 = current, 1.0 = old
    pub backlerp: f32,
    pub skinnum: i32,

    pub lightstyle: i32,
    pub alpha: f32,

    /// `None` for inline skin
    pub skin: Option<ImageId>,
    pub flags: i32,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            model: None,
            angles: [0.0; 3],
            origin: [0.0; 3],
            frame: 0,
            oldorigin: [0.0; 3],
            oldframe: 0,
            backlerp: 0.0,
            skinnum: 0,
            lightstyle: 0,
            alpha: 1.0,
            skin: None,
            flags: 0,
        }
    }
}

/// Everything needed to draw one view.
#[derive(Debug, Clone, Default)]
pub struct RefDef {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub fov_x: f32,
    pub fov_y: f32,
    pub vieworg: Vec3,
    pub viewangles: Vec3,
    /// rgba 0-1 full screen blend
    pub blend: [f32; 4],
    /// time is used to auto animate
    pub time: f32,
    /// RDF_UNDERWATER, etc
    pub rdflags: i32,

    pub lightstyles: Vec<LightStyle>,
    pub entities: Vec<Entity>,
    pub dlights: Vec<DLight>,
    pub particles: Vec<Particle>,
}

impl RefDef {
    pub fn lightstyle(&self, style: u8) -> LightStyle {
        self.lightstyles.get(style as usize).copied().unwrap_or_default()
    }
}

// ============================================================
// Cvars
// ============================================================

/// Name, default and flags of every cvar the renderer registers.
pub const RENDERER_CVARS: &[(&str, &str, i32)] = &[
    ("r_norefresh", "0", CVAR_ZERO),
    ("r_fullbright", "0", CVAR_ZERO),
    ("r_drawentities", "1", CVAR_ZERO),
    ("r_drawworld", "1", CVAR_ZERO),
    ("r_novis", "0", CVAR_ZERO),
    ("r_nocull", "0", CVAR_ZERO),
    ("r_lerpmodels", "1", CVAR_ZERO),
    ("r_speeds", "0", CVAR_ZERO),
    ("r_lightlevel", "0", CVAR_ZERO),
    ("hand", "0", CVAR_USERINFO | CVAR_ARCHIVE),
    ("gl_farsee", "0", CVAR_LATCH | CVAR_ARCHIVE),
    ("gl_overbrightbits", "2", CVAR_ARCHIVE),
    ("gl_particle_min_size", "2", CVAR_ARCHIVE),
    ("gl_particle_max_size", "40", CVAR_ARCHIVE),
    ("gl_particle_size", "40", CVAR_ARCHIVE),
    ("gl_particle_att_a", "0.01", CVAR_ARCHIVE),
    ("gl_particle_att_b", "0.0", CVAR_ARCHIVE),
    ("gl_particle_att_c", "0.01", CVAR_ARCHIVE),
    ("gl_particle_point", "1", CVAR_ARCHIVE),
    ("gl_modulate", "1", CVAR_ARCHIVE),
    ("gl_shadows", "0", CVAR_ARCHIVE),
    ("gl_ztrick", "0", CVAR_ZERO),
    ("gl_clear", "0", CVAR_ZERO),
    ("gl_polyblend", "1", CVAR_ZERO),
    ("gl_flashblend", "0", CVAR_ZERO),
    ("gl_mtexcombine", "1", CVAR_ARCHIVE),
    ("gl_texturemode", "GL_LINEAR_MIPMAP_NEAREST", CVAR_ARCHIVE),
    ("gl_drawbuffer", "GL_BACK", CVAR_ZERO),
    ("vid_gamma", "1.0", CVAR_ARCHIVE),
];

pub fn register_cvars(cvars: &mut CvarContext) {
    for &(name, value, flags) in RENDERER_CVARS {
        cvars.get(name, Some(value), flags);
    }
}

/// Values of the renderer cvars, re-read once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererCvars {
    pub norefresh: bool,
    pub fullbright: bool,
    pub drawentities: bool,
    pub drawworld: bool,
    pub novis: bool,
    pub nocull: bool,
    pub lerpmodels: bool,
    pub speeds: bool,
    pub hand: i32,
    pub farsee: bool,
    pub overbrightbits: f32,
    pub particle_min_size: f32,
    pub particle_max_size: f32,
    pub particle_size: f32,
    pub particle_att_a: f32,
    pub particle_att_b: f32,
    pub particle_att_c: f32,
    pub particle_point: bool,
    pub modulate: f32,
    pub shadows: bool,
    pub ztrick: bool,
    pub clear: bool,
    pub polyblend: bool,
    pub flashblend: bool,
    pub mtexcombine: bool,
}

impl Default for RendererCvars {
    fn default() -> Self {
        let mut cvars = CvarContext::new();
        register_cvars(&mut cvars);
        Self::read(&cvars)
    }
}

impl RendererCvars {
    pub fn read(cvars: &CvarContext) -> Self {
        let flag = |name: &str| cvars.variable_value(name) != 0.0;
        let value = |name: &str| cvars.variable_value(name);
        Self {
            norefresh: flag("r_norefresh"),
            fullbright: flag("r_fullbright"),
            drawentities: flag("r_drawentities"),
            drawworld: flag("r_drawworld"),
            novis: flag("r_novis"),
            nocull: flag("r_nocull"),
            lerpmodels: flag("r_lerpmodels"),
            speeds: flag("r_speeds"),
            hand: value("hand") as i32,
            farsee: flag("gl_farsee"),
            overbrightbits: value("gl_overbrightbits"),
            particle_min_size: value("gl_particle_min_size"),
            particle_max_size: value("gl_particle_max_size"),
            particle_size: value("gl_particle_size"),
            particle_att_a: value("gl_particle_att_a"),
            particle_att_b: value("gl_particle_att_b"),
            particle_att_c: value("gl_particle_att_c"),
            particle_point: flag("gl_particle_point"),
            modulate: value("gl_modulate"),
            shadows: flag("gl_shadows"),
            ztrick: flag("gl_ztrick"),
            clear: flag("gl_clear"),
            polyblend: flag("gl_polyblend"),
            flashblend: flag("gl_flashblend"),
            mtexcombine: flag("gl_mtexcombine"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_after_register() {
        let c = RendererCvars::default();
        assert!(!c.norefresh);
        assert!(c.drawentities);
        assert!(c.drawworld);
        assert!(c.lerpmodels);
        assert!(c.polyblend);
        assert!(c.particle_point);
        assert_eq!(c.modulate, 1.0);
        assert_eq!(c.overbrightbits, 2.0);
        assert_eq!(c.particle_size, 40.0);
        assert_eq!(c.hand, 0);
    }

    #[test]
    fn test_register_keeps_existing_values() {
        let mut cvars = CvarContext::new();
        cvars.get("gl_modulate", Some("2.5"), 0);
        register_cvars(&mut cvars);
        assert_eq!(RendererCvars::read(&cvars).modulate, 2.5);
        assert_eq!(cvars.variable_string("gl_texturemode"), "GL_LINEAR_MIPMAP_NEAREST");
    }

    #[test]
    fn test_missing_lightstyle_defaults() {
        let fd = RefDef::default();
        assert_eq!(fd.lightstyle(7).rgb, [1.0; 3]);
    }
}
