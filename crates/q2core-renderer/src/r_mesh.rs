// r_mesh.rs: alias model culling, lerping, shading and shadows

use q2core_common::q_shared::{
    angle_vectors, dot_product, vector_add, vector_normalize, CPlane, Vec3, RDF_IRGOGGLES, RF_DEPTHHACK,
    RF_FULLBRIGHT, RF_GLOW, RF_IR_VISIBLE, RF_MINLIGHT, RF_NOSHADOW, RF_SHELL_BLUE, RF_SHELL_DOUBLE,
    RF_SHELL_GREEN, RF_SHELL_HALF_DAM, RF_SHELL_RED, RF_TRANSLUCENT, RF_WEAPONMODEL, YAW,
};

use crate::r_backend::{CullFace, Primitive, RenderBackend, RenderState, Vertex};
use crate::r_light::{light_point, LightParams};
use crate::r_local::{Entity, RefDef, RendererCvars};
use crate::r_matrix::{self, Mat4};
use crate::r_model::{AliasFrame, AliasModel, GlCmd, Model, MAX_MD2SKINS};
use crate::r_main::Renderer;

pub const NUMVERTEXNORMALS: usize = 162;
pub const SHADEDOT_QUANT: usize = 16;
pub const POWERSUIT_SCALE: f32 = 4.0;

pub const RF_SHELL_MASK: i32 = RF_SHELL_RED | RF_SHELL_GREEN | RF_SHELL_BLUE | RF_SHELL_DOUBLE | RF_SHELL_HALF_DAM;

/// Vertex normals and per-yaw shading lookups for alias models.
#[derive(Debug, Clone)]
pub struct AliasTables {
    pub normals: Vec<Vec3>,
    /// `SHADEDOT_QUANT` rows of `NUMVERTEXNORMALS` brightness factors.
    pub shadedots: Vec<Vec<f32>>,
}

impl Default for AliasTables {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasTables {
    /// Normals are spread evenly over the unit sphere. Each shadedots row
    /// lights them from above and in front, rotated by one yaw step.
    pub fn new() -> Self {
        let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
        let normals: Vec<Vec3> = (0..NUMVERTEXNORMALS)
            .map(|i| {
                let z = 1.0 - 2.0 * (i as f32 + 0.5) / NUMVERTEXNORMALS as f32;
                let r = (1.0 - z * z).max(0.0).sqrt();
                let theta = golden * i as f32;
                [theta.cos() * r, theta.sin() * r, z]
            })
            .collect();

        let shadedots = (0..SHADEDOT_QUANT)
            .map(|q| {
                let an = (q as f32 * 360.0 / SHADEDOT_QUANT as f32).to_radians();
                let mut light = [(-an).cos(), (-an).sin(), 1.0];
                vector_normalize(&mut light);
                normals
                    .iter()
                    .map(|n| {
                        let d = dot_product(n, &light);
                        if d >= 0.0 {
                            1.0 + d
                        } else {
                            1.0 + 0.3 * d
                        }
                    })
                    .collect()
            })
            .collect();

        Self { normals, shadedots }
    }

    pub fn normal(&self, index: u8) -> Vec3 {
        self.normals.get(index as usize).copied().unwrap_or([0.0, 0.0, 1.0])
    }

    /// The shading row for an entity facing `yaw` degrees.
    pub fn shadedots_for_yaw(&self, yaw: f32) -> &[f32] {
        let q = ((yaw * (SHADEDOT_QUANT as f32 / 360.0)) as i32) & (SHADEDOT_QUANT as i32 - 1);
        &self.shadedots[q as usize]
    }
}

fn frame_valid(alias: &AliasModel, frame: i32) -> bool {
    frame >= 0 && (frame as usize) < alias.frames.len()
}

/// Tests the union of the current and previous frame bounds against the
/// frustum. Out-of-range frames are reset to 0 first.
pub fn cull_alias_model(
    model: &Model,
    alias: &AliasModel,
    e: &mut Entity,
    frustum: &[CPlane; 4],
    console: &q2core_common::common::Console,
) -> bool {
    if !frame_valid(alias, e.frame) {
        console.dprintf(&format!("R_CullAliasModel {}: no such frame {}\n", model.name, e.frame));
        e.frame = 0;
    }
    if !frame_valid(alias, e.oldframe) {
        console.dprintf(&format!("R_CullAliasModel {}: no such oldframe {}\n", model.name, e.oldframe));
        e.oldframe = 0;
    }

    let (Some(pframe), Some(poldframe)) = (alias.frames.get(e.frame as usize), alias.frames.get(e.oldframe as usize))
    else {
        return true;
    };

    // compute axially aligned mins and maxs
    let mut mins = [0.0f32; 3];
    let mut maxs = [0.0f32; 3];
    for i in 0..3 {
        let thismins = pframe.translate[i];
        let thismaxs = thismins + pframe.scale[i] * 255.0;
        let oldmins = poldframe.translate[i];
        let oldmaxs = oldmins + poldframe.scale[i] * 255.0;
        mins[i] = thismins.min(oldmins);
        maxs[i] = thismaxs.max(oldmaxs);
    }

    // rotate the bounding box
    let mut angles = e.angles;
    angles[YAW] = -angles[YAW];
    let (forward, right, up) = angle_vectors(&angles);

    let mut aggregatemask = !0;
    for i in 0..8 {
        let tmp = [
            if i & 1 != 0 { mins[0] } else { maxs[0] },
            if i & 2 != 0 { mins[1] } else { maxs[1] },
            if i & 4 != 0 { mins[2] } else { maxs[2] },
        ];
        let corner = vector_add(
            &e.origin,
            &[dot_product(&forward, &tmp), -dot_product(&right, &tmp), dot_product(&up, &tmp)],
        );

        let mut mask = 0;
        for (f, plane) in frustum.iter().enumerate() {
            if dot_product(&plane.normal, &corner) - plane.dist < 0.0 {
                mask |= 1 << f;
            }
        }
        aggregatemask &= mask;
    }

    aggregatemask != 0
}

/// Colour an alias entity is lit with, before per-vertex shading.
/// `light` is only consulted for entities that aren't shells or fullbright.
pub fn alias_shadelight(e: &Entity, fd: &RefDef, cvars: &RendererCvars, light: impl FnOnce() -> Vec3) -> Vec3 {
    let mut shadelight = if e.flags & RF_SHELL_MASK != 0 {
        let mut s = [0.0f32; 3];
        if e.flags & RF_SHELL_HALF_DAM != 0 {
            s = [0.56, 0.59, 0.45];
        }
        if e.flags & RF_SHELL_DOUBLE != 0 {
            s[0] = 0.9;
            s[1] = 0.7;
        }
        if e.flags & RF_SHELL_RED != 0 {
            s[0] = 1.0;
        }
        if e.flags & RF_SHELL_GREEN != 0 {
            s[1] = 1.0;
        }
        if e.flags & RF_SHELL_BLUE != 0 {
            s[2] = 1.0;
        }
        s
    } else if e.flags & RF_FULLBRIGHT != 0 {
        [1.0; 3]
    } else {
        light()
    };

    if e.flags & RF_MINLIGHT != 0 && shadelight.iter().all(|&c| c <= 0.1) {
        shadelight = [0.1; 3];
    }

    if e.flags & RF_GLOW != 0 {
        // bonus items will pulse with time
        let scale = 0.1 * (fd.time * 7.0).sin();
        for c in shadelight.iter_mut() {
            let min = *c * 0.8;
            *c += scale;
            if *c < min {
                *c = min;
            }
        }
    }

    if cvars.mtexcombine && cvars.overbrightbits != 0.0 {
        for c in shadelight.iter_mut() {
            *c *= cvars.overbrightbits;
        }
    }

    // ir goggles color override
    if fd.rdflags & RDF_IRGOGGLES != 0 && e.flags & RF_IR_VISIBLE != 0 {
        shadelight = [1.0, 0.0, 0.0];
    }

    shadelight
}

/// Planar shadow direction for an entity facing `yaw` degrees.
pub fn shadevector(yaw: f32) -> Vec3 {
    let an = yaw.to_radians();
    let mut v = [(-an).cos(), (-an).sin(), 1.0];
    vector_normalize(&mut v);
    v
}

/// Interpolates vertex positions between `oldframe` and `frame`,
/// including the origin change since the old frame. Shells are pushed out
/// along the vertex normals.
pub fn lerp_verts(frame: &AliasFrame, oldframe: &AliasFrame, e: &Entity, tables: &AliasTables) -> Vec<Vec3> {
    let backlerp = e.backlerp;
    let frontlerp = 1.0 - backlerp;

    // move should be the delta back to the previous frame * backlerp
    let delta = [
        e.oldorigin[0] - e.origin[0],
        e.oldorigin[1] - e.origin[1],
        e.oldorigin[2] - e.origin[2],
    ];
    let (forward, right, up) = angle_vectors(&e.angles);

    let mut mv = [
        dot_product(&delta, &forward),
        -dot_product(&delta, &right),
        dot_product(&delta, &up),
    ];
    mv = vector_add(&mv, &oldframe.translate);

    let mut frontv = [0.0f32; 3];
    let mut backv = [0.0f32; 3];
    for i in 0..3 {
        mv[i] = backlerp * mv[i] + frontlerp * frame.translate[i];
        frontv[i] = frontlerp * frame.scale[i];
        backv[i] = backlerp * oldframe.scale[i];
    }

    let shell = e.flags & RF_SHELL_MASK != 0;

    frame
        .verts
        .iter()
        .zip(oldframe.verts.iter())
        .map(|(v, ov)| {
            let mut p = [0.0f32; 3];
            for i in 0..3 {
                p[i] = mv[i] + ov.v[i] as f32 * backv[i] + v.v[i] as f32 * frontv[i];
            }
            if shell {
                let n = tables.normal(v.lightnormalindex);
                for i in 0..3 {
                    p[i] += n[i] * POWERSUIT_SCALE;
                }
            }
            p
        })
        .collect()
}

/// Projects lerped points onto the ground plane below the entity.
pub fn shadow_points(lerped: &[Vec3], shadevector: &Vec3, lheight: f32) -> Vec<Vec3> {
    let height = -lheight + 0.1;
    lerped
        .iter()
        .map(|p| {
            [
                p[0] - shadevector[0] * (p[2] + lheight),
                p[1] - shadevector[1] * (p[2] + lheight),
                height,
            ]
        })
        .collect()
}

/// Model matrix placing an entity, as R_RotateForEntity.
pub fn rotate_for_entity(base: &Mat4, origin: &Vec3, angles: &Vec3) -> Mat4 {
    let m = r_matrix::translate(base, origin[0], origin[1], origin[2]);
    let m = r_matrix::rotate(&m, angles[1], 0.0, 0.0, 1.0);
    let m = r_matrix::rotate(&m, -angles[0], 0.0, 1.0, 0.0);
    r_matrix::rotate(&m, -angles[2], 1.0, 0.0, 0.0)
}

impl<B: RenderBackend> Renderer<B> {
    pub fn draw_alias_model(&mut self, e: &mut Entity, model: &Model, alias: &AliasModel, fd: &RefDef) {
        if e.flags & RF_WEAPONMODEL == 0 {
            if cull_alias_model(model, alias, e, &self.frustum, &self.console) {
                return;
            }
        } else if self.cvars.hand == 2 {
            return;
        }

        // get lighting information
        let params = LightParams {
            dlights: &fd.dlights,
            lightstyles: &fd.lightstyles,
            modulate: self.cvars.modulate,
        };
        let world = self.world.as_ref();
        let lightspot = &mut self.lightspot;
        let mut sampled = None;
        let shadelight = alias_shadelight(e, fd, &self.cvars, || {
            let c = light_point(world, &e.origin, &e.origin, &params, lightspot);
            sampled = Some(c);
            c
        });

        // player lighting hack for communication back to server
        if let Some(c) = sampled {
            if e.flags & RF_WEAPONMODEL != 0 {
                self.lightlevel = 150.0 * c[0].max(c[1]).max(c[2]);
            }
        }

        let shadedots = self.tables.shadedots_for_yaw(e.angles[YAW]).to_vec();
        let shadevector = shadevector(e.angles[YAW]);

        // locate the proper data
        self.c_alias_polys += alias.num_tris as i32;

        // draw all the triangles
        if e.flags & RF_DEPTHHACK != 0 {
            // hack the depth range to prevent view model from poking into walls
            self.backend
                .depth_range(self.depth_min, self.depth_min + 0.3 * (self.depth_max - self.depth_min));
        }

        let lefthand = e.flags & RF_WEAPONMODEL != 0 && self.cvars.hand == 1;
        if lefthand {
            let aspect = fd.width as f64 / fd.height.max(1) as f64;
            let proj = r_matrix::multiply(
                &r_matrix::scale(&r_matrix::IDENTITY, -1.0, 1.0, 1.0),
                &crate::r_main::perspective(fd.fov_y as f64, aspect, 4.0, 4096.0, 0.0),
            );
            self.backend.load_projection(&proj);
            self.backend.cull_face(CullFace::Back);
        }

        let mut angles = e.angles;
        angles[0] = -angles[0];
        let modelview = rotate_for_entity(&self.world_matrix, &e.origin, &angles);
        self.backend.load_modelview(&modelview);

        // select skin
        let skin = e
            .skin
            .or_else(|| match usize::try_from(e.skinnum) {
                Ok(n) if n < MAX_MD2SKINS => alias.skins.get(n).copied().flatten(),
                _ => None,
            })
            .or_else(|| alias.skins.first().copied().flatten());
        let skin = match skin {
            Some(s) => Some(s),
            None => {
                tracing::warn!(target: "renderer", model = %model.name, skinnum = e.skinnum, "missing skin");
                self.notexture
            }
        };
        let texnum = skin.map_or(0, |s| self.images.read().texnum(s));
        self.backend.bind_texture(texnum);

        if e.flags & RF_TRANSLUCENT != 0 {
            self.backend.enable(RenderState::BLEND);
        }

        if !frame_valid(alias, e.frame) {
            self.console
                .dprintf(&format!("R_DrawAliasModel {}: no such frame {}\n", model.name, e.frame));
            e.frame = 0;
            e.oldframe = 0;
        }
        if !frame_valid(alias, e.oldframe) {
            self.console
                .dprintf(&format!("R_DrawAliasModel {}: no such oldframe {}\n", model.name, e.oldframe));
            e.frame = 0;
            e.oldframe = 0;
        }

        if !self.cvars.lerpmodels {
            e.backlerp = 0.0;
        }

        let (Some(frame), Some(oldframe)) = (alias.frames.get(e.frame as usize), alias.frames.get(e.oldframe as usize))
        else {
            return;
        };
        let lerped = lerp_verts(frame, oldframe, e, &self.tables);
        self.draw_alias_frame(e, alias, frame, &lerped, &shadelight, &shadedots);

        self.backend.load_modelview(&self.world_matrix);

        if lefthand {
            self.backend.load_projection(&self.projection);
            self.backend.cull_face(CullFace::Front);
        }

        if e.flags & RF_TRANSLUCENT != 0 {
            self.backend.disable(RenderState::BLEND);
        }

        if e.flags & RF_DEPTHHACK != 0 {
            self.backend.depth_range(self.depth_min, self.depth_max);
        }

        if self.cvars.shadows && e.flags & (RF_TRANSLUCENT | RF_WEAPONMODEL | RF_NOSHADOW) == 0 {
            self.draw_alias_shadow(e, alias, &lerped, &shadevector);
        }
    }

    fn draw_alias_frame(
        &mut self,
        e: &Entity,
        alias: &AliasModel,
        frame: &AliasFrame,
        lerped: &[Vec3],
        shadelight: &Vec3,
        shadedots: &[f32],
    ) {
        let alpha = if e.flags & RF_TRANSLUCENT != 0 { e.alpha } else { 1.0 };
        let shell = e.flags & RF_SHELL_MASK != 0;

        if shell {
            self.backend.disable(RenderState::TEXTURE_2D);
        }

        let mut verts = Vec::new();
        for cmd in &alias.glcmds {
            let (primitive, list) = match cmd {
                GlCmd::Fan(list) => (Primitive::TriangleFan, list),
                GlCmd::Strip(list) => (Primitive::TriangleStrip, list),
            };
            verts.clear();
            for c in list {
                let Some(&xyz) = lerped.get(c.index) else {
                    continue;
                };
                let rgba = if shell {
                    [shadelight[0], shadelight[1], shadelight[2], alpha]
                } else {
                    // normals and vertexes come from the frame list
                    let l = frame
                        .verts
                        .get(c.index)
                        .and_then(|v| shadedots.get(v.lightnormalindex as usize))
                        .copied()
                        .unwrap_or(1.0);
                    [l * shadelight[0], l * shadelight[1], l * shadelight[2], alpha]
                };
                verts.push(Vertex::new(xyz, [c.s, c.t], rgba));
            }
            self.backend.draw(primitive, &verts);
        }

        if shell {
            self.backend.enable(RenderState::TEXTURE_2D);
        }
    }

    fn draw_alias_shadow(&mut self, e: &Entity, alias: &AliasModel, lerped: &[Vec3], shadevector: &Vec3) {
        // don't rotate shadows on ungodly axes
        let m = r_matrix::translate(&self.world_matrix, e.origin[0], e.origin[1], e.origin[2]);
        let m = r_matrix::rotate(&m, e.angles[YAW], 0.0, 0.0, 1.0);
        self.backend.load_modelview(&m);

        self.backend.disable(RenderState::TEXTURE_2D);
        self.backend.enable(RenderState::BLEND | RenderState::STENCIL_TEST);

        let lheight = e.origin[2] - self.lightspot[2];
        let points = shadow_points(lerped, shadevector, lheight);
        let color = [0.0, 0.0, 0.0, 0.5];

        let mut verts = Vec::new();
        for cmd in &alias.glcmds {
            let (primitive, list) = match cmd {
                GlCmd::Fan(list) => (Primitive::TriangleFan, list),
                GlCmd::Strip(list) => (Primitive::TriangleStrip, list),
            };
            verts.clear();
            verts.extend(
                list.iter()
                    .filter_map(|c| points.get(c.index))
                    .map(|&p| Vertex::colored(p, color)),
            );
            self.backend.draw(primitive, &verts);
        }

        self.backend.disable(RenderState::BLEND | RenderState::STENCIL_TEST);
        self.backend.enable(RenderState::TEXTURE_2D);
        self.backend.load_modelview(&self.world_matrix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::r_model::{GlCmdVertex, ModelKind, TriVertex};
    use crate::test_util::{assert_near, assert_vec_near};
    use q2core_common::common::Console;

    fn frame(translate: Vec3, scale: Vec3, verts: &[[u8; 3]]) -> AliasFrame {
        AliasFrame {
            name: "stand01".to_string(),
            scale,
            translate,
            verts: verts
                .iter()
                .map(|&v| TriVertex { v, lightnormalindex: 0 })
                .collect(),
        }
    }

    fn tri_model() -> (Model, AliasModel) {
        let alias = AliasModel {
            frames: vec![
                frame([0.0; 3], [1.0; 3], &[[0, 0, 0], [10, 0, 0], [0, 10, 0]]),
                frame([0.0, 0.0, 10.0], [1.0; 3], &[[0, 0, 0], [20, 0, 0], [0, 20, 0]]),
            ],
            glcmds: vec![GlCmd::Fan(vec![
                GlCmdVertex { s: 0.0, t: 0.0, index: 0 },
                GlCmdVertex { s: 1.0, t: 0.0, index: 1 },
                GlCmdVertex { s: 0.0, t: 1.0, index: 2 },
            ])],
            num_xyz: 3,
            num_tris: 1,
            skins: vec![None],
        };
        (Model::new("models/tri.md2", ModelKind::Alias(alias.clone())), alias)
    }

    /// Frustum looking down +x from the origin, 90 degrees wide.
    fn frustum_down_x() -> [CPlane; 4] {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        [
            CPlane::new([s, s, 0.0], 0.0),
            CPlane::new([s, -s, 0.0], 0.0),
            CPlane::new([s, 0.0, s], 0.0),
            CPlane::new([s, 0.0, -s], 0.0),
        ]
    }

    #[test]
    fn test_tables_shape() {
        let t = AliasTables::new();
        assert_eq!(t.normals.len(), NUMVERTEXNORMALS);
        assert_eq!(t.shadedots.len(), SHADEDOT_QUANT);
        for n in &t.normals {
            assert_near(dot_product(n, n), 1.0);
        }
        assert!(t.shadedots.iter().flatten().all(|&d| (0.69..=2.01).contains(&d)));
        // yaw 360 wraps to the first row
        assert_eq!(t.shadedots_for_yaw(360.0).as_ptr(), t.shadedots[0].as_ptr());
        assert_eq!(t.shadedots_for_yaw(30.0).as_ptr(), t.shadedots[1].as_ptr());
        assert_eq!(t.shadedots_for_yaw(-30.0).as_ptr(), t.shadedots[15].as_ptr());
        assert_eq!(t.normal(250), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_cull_alias_model() {
        let (model, alias) = tri_model();
        let con = Console::capturing();
        let fr = frustum_down_x();

        let mut e = Entity {
            origin: [100.0, 0.0, 0.0],
            ..Default::default()
        };
        assert!(!cull_alias_model(&model, &alias, &mut e, &fr, &con));

        e.origin = [-400.0, 0.0, 0.0];
        assert!(cull_alias_model(&model, &alias, &mut e, &fr, &con));
    }

    #[test]
    fn test_cull_uses_union_of_frames() {
        let (model, mut alias) = tri_model();
        alias.frames[1].translate = [500.0, 0.0, 0.0];
        let con = Console::capturing();
        let fr = frustum_down_x();

        // current frame fully behind, old frame in view
        let mut e = Entity {
            origin: [-300.0, 0.0, 0.0],
            frame: 0,
            oldframe: 1,
            ..Default::default()
        };
        assert!(!cull_alias_model(&model, &alias, &mut e, &fr, &con));
        e.oldframe = 0;
        assert!(cull_alias_model(&model, &alias, &mut e, &fr, &con));
    }

    #[test]
    fn test_cull_resets_bad_frames() {
        let (model, alias) = tri_model();
        let con = Console::capturing();
        con.set_developer(true);
        let mut e = Entity {
            origin: [100.0, 0.0, 0.0],
            frame: 9,
            oldframe: -1,
            ..Default::default()
        };
        cull_alias_model(&model, &alias, &mut e, &frustum_down_x(), &con);
        assert_eq!((e.frame, e.oldframe), (0, 0));
        assert_eq!(
            con.take_output(),
            "R_CullAliasModel models/tri.md2: no such frame 9\n\
             R_CullAliasModel models/tri.md2: no such oldframe -1\n"
        );
    }

    #[test]
    fn test_shadelight_shells_and_flags() {
        let fd = RefDef::default();
        let mut cvars = RendererCvars::default();
        cvars.mtexcombine = false;

        let e = Entity {
            flags: RF_SHELL_HALF_DAM | RF_SHELL_RED,
            ..Default::default()
        };
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || unreachable!()), [1.0, 0.59, 0.45]);

        let e = Entity {
            flags: RF_SHELL_DOUBLE | RF_SHELL_BLUE,
            ..Default::default()
        };
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || unreachable!()), [0.9, 0.7, 1.0]);

        let e = Entity {
            flags: RF_MINLIGHT,
            ..Default::default()
        };
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || [0.05, 0.0, 0.1]), [0.1; 3]);
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || [0.2, 0.0, 0.0]), [0.2, 0.0, 0.0]);
    }

    #[test]
    fn test_shadelight_overbright_and_goggles() {
        let mut fd = RefDef::default();
        let cvars = RendererCvars::default();
        let e = Entity {
            flags: RF_FULLBRIGHT | RF_IR_VISIBLE,
            ..Default::default()
        };
        // mtexcombine with overbrightbits 2
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || unreachable!()), [2.0; 3]);
        fd.rdflags = RDF_IRGOGGLES;
        assert_vec_near(alias_shadelight(&e, &fd, &cvars, || unreachable!()), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shadelight_glow_floor() {
        let mut fd = RefDef::default();
        let mut cvars = RendererCvars::default();
        cvars.mtexcombine = false;
        // sin(7 * t) = -1
        fd.time = 3.0 * std::f32::consts::PI / 14.0;
        let e = Entity {
            flags: RF_GLOW,
            ..Default::default()
        };
        let s = alias_shadelight(&e, &fd, &cvars, || [0.2, 1.0, 0.0]);
        assert_vec_near(s, [0.16, 0.9, 0.0]);
    }

    #[test]
    fn test_lerp_verts_blends_frames() {
        let (_, alias) = tri_model();
        let tables = AliasTables::new();
        let e = Entity {
            frame: 1,
            oldframe: 0,
            backlerp: 0.5,
            ..Default::default()
        };
        let v = lerp_verts(&alias.frames[1], &alias.frames[0], &e, &tables);
        assert_vec_near(v[0], [0.0, 0.0, 5.0]);
        assert_vec_near(v[1], [15.0, 0.0, 5.0]);
        assert_vec_near(v[2], [0.0, 15.0, 5.0]);
    }

    #[test]
    fn test_lerp_verts_origin_delta_and_shell() {
        let (_, alias) = tri_model();
        let tables = AliasTables::new();
        let e = Entity {
            origin: [10.0, 0.0, 0.0],
            oldorigin: [0.0, 0.0, 0.0],
            backlerp: 1.0,
            ..Default::default()
        };
        // fully back: the old position relative to the new origin
        let v = lerp_verts(&alias.frames[0], &alias.frames[0], &e, &tables);
        assert_vec_near(v[0], [-10.0, 0.0, 0.0]);

        let shell = Entity {
            flags: RF_SHELL_RED,
            ..Default::default()
        };
        let v = lerp_verts(&alias.frames[0], &alias.frames[0], &shell, &tables);
        let n = tables.normal(0);
        assert_vec_near(v[0], [n[0] * 4.0, n[1] * 4.0, n[2] * 4.0]);
    }

    #[test]
    fn test_shadow_points_flatten() {
        let sv = shadevector(0.0);
        assert_vec_near(sv, [std::f32::consts::FRAC_1_SQRT_2, 0.0, std::f32::consts::FRAC_1_SQRT_2]);
        let pts = shadow_points(&[[0.0, 0.0, 10.0]], &sv, 24.0);
        assert_near(pts[0][2], -23.9);
        assert_near(pts[0][0], -34.0 * std::f32::consts::FRAC_1_SQRT_2);
    }
}
