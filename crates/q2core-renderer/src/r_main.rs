// r_main.rs: the renderer object, frame setup and entity composition

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use q2core_common::cmd::CmdContext;
use q2core_common::common::Console;
use q2core_common::cvar::CvarContext;
use q2core_common::q_shared::{
    angle_vectors, box_on_plane_side, dot_product, perpendicular_vector, rotate_point_around_vector,
    signbits_for_plane, vector_add, vector_ma, vector_normalize, vector_subtract, CPlane, DLight, Vec3,
    CONTENTS_SOLID, PLANE_ANYZ, RDF_NOWORLDMODEL, RF_BEAM, RF_FULLBRIGHT, RF_TRANSLUCENT, SURF_SKY,
    SURF_TRANS33, SURF_TRANS66, SURF_WARP,
};

use crate::r_backend::{
    BlendMode, ClearFlags, CullFace, DepthFunc, DrawBuffer, Primitive, RenderBackend, RenderState, SurfaceBatch,
    TextureMode, Vertex,
};
use crate::r_image::{
    notexture_rgba, particle_texture_rgba, ImageId, ImageLoaderFn, ImageRegistry, ImageType,
};
use crate::r_light::{
    dlight_fan, light_point, lightstyles_changed, mark_lights, push_dlights, set_cache_state, LightParams,
    LightmapBuilder, MAX_DLIGHTS,
};
use crate::r_local::{register_cvars, Entity, RefDef, RendererCvars, Z_FAR, Z_FAR_SEE, Z_NEAR};
use crate::r_matrix::{self, Mat4};
use crate::r_mesh::{rotate_for_entity, AliasTables};
use crate::r_model::{
    BrushModel, Model, ModelId, ModelKind, ModelRegistry, NodeRef, SpriteModel, WorldModel, MAXLIGHTMAPS,
    SURF_PLANEBACK,
};
use crate::RendererError;

pub const NUM_BEAM_SEGS: usize = 6;
pub const BACKFACE_EPSILON: f32 = 0.01;

/// Perspective projection with the stereo eye offset applied to both x edges.
pub fn perspective(fovy: f64, aspect: f64, znear: f64, zfar: f64, camera_separation: f32) -> Mat4 {
    let ymax = znear * (fovy * std::f64::consts::PI / 360.0).tan();
    let ymin = -ymax;

    let mut xmin = ymin * aspect;
    let mut xmax = ymax * aspect;

    xmin += -(2.0 * camera_separation as f64) / znear;
    xmax += -(2.0 * camera_separation as f64) / znear;

    r_matrix::frustum(xmin, xmax, ymin, ymax, znear, zfar)
}

/// Returns true if the box is completely outside the frustum.
pub fn cull_box(frustum: &[CPlane; 4], nocull: bool, mins: &Vec3, maxs: &Vec3) -> bool {
    if nocull {
        return false;
    }
    frustum.iter().any(|p| box_on_plane_side(mins, maxs, p) == 2)
}

fn split_minmaxs(m: &[f32; 6]) -> (Vec3, Vec3) {
    ([m[0], m[1], m[2]], [m[3], m[4], m[5]])
}

/// Palette entry as normalised rgb.
fn palette_rgb(table: &[u32; 256], index: i32) -> Vec3 {
    let c = table[(index & 0xff) as usize];
    [
        (c & 0xff) as f32 / 255.0,
        ((c >> 8) & 0xff) as f32 / 255.0,
        ((c >> 16) & 0xff) as f32 / 255.0,
    ]
}

/// Per-frame state threaded through the front-to-back world walk.
struct WorldWalk<'a> {
    frustum: &'a [CPlane; 4],
    nocull: bool,
    modelorg: Vec3,
    framecount: i32,
    visframecount: i32,
    batch: &'a mut SurfaceBatch,
    alpha_surfaces: &'a mut Vec<usize>,
}

fn recursive_world_node(world: &mut WorldModel, node: Option<NodeRef>, walk: &mut WorldWalk) {
    match node {
        None => {}
        Some(NodeRef::Leaf(index)) => {
            let Some(leaf) = world.leafs.get(index) else {
                return;
            };
            if leaf.contents == CONTENTS_SOLID {
                return; // solid
            }
            if leaf.visframe != walk.visframecount {
                return;
            }
            let (mins, maxs) = split_minmaxs(&leaf.minmaxs);
            if cull_box(walk.frustum, walk.nocull, &mins, &maxs) {
                return;
            }

            let marks = leaf.firstmarksurface..leaf.firstmarksurface + leaf.nummarksurfaces;
            for m in marks {
                if let Some(&s) = world.marksurfaces.get(m) {
                    if let Some(surf) = world.surfaces.get_mut(s) {
                        surf.visframe = walk.framecount;
                    }
                }
            }
        }
        Some(NodeRef::Node(index)) => {
            let Some(n) = world.nodes.get(index) else {
                return;
            };
            if n.visframe != walk.visframecount {
                return;
            }
            let (mins, maxs) = split_minmaxs(&n.minmaxs);
            if cull_box(walk.frustum, walk.nocull, &mins, &maxs) {
                return;
            }

            // node is just a decision point, so go down the appropriate sides
            let Some(plane) = world.planes.get(n.plane) else {
                return;
            };
            let dot = plane.distance(&walk.modelorg);
            let (side, sidebit) = if dot >= 0.0 { (0, 0) } else { (1, SURF_PLANEBACK) };
            let children = n.children;
            let surfaces = n.firstsurface..n.firstsurface + n.numsurfaces;

            // recurse down the children, front side first
            recursive_world_node(world, children[side], walk);

            for s in surfaces {
                let Some(surf) = world.surfaces.get(s) else {
                    break;
                };
                if surf.visframe != walk.framecount {
                    continue;
                }
                if surf.flags & SURF_PLANEBACK != sidebit {
                    continue; // wrong side
                }
                let flags = world.texinfo.get(surf.texinfo).map_or(0, |t| t.flags);
                if flags & SURF_SKY != 0 {
                    walk.batch.sky.push(s);
                } else if flags & (SURF_TRANS33 | SURF_TRANS66) != 0 {
                    walk.alpha_surfaces.push(s);
                } else {
                    walk.batch.opaque.push(s);
                }
            }

            // recurse down the back side
            recursive_world_node(world, children[side ^ 1], walk);
        }
    }
}

/// Rebuilds and uploads the lightmaps of `surfaces` that are dynamically
/// lit this frame or whose light styles changed. Returns the upload count.
fn update_lightmaps<B: RenderBackend>(
    backend: &mut B,
    builder: &mut LightmapBuilder,
    world: &mut WorldModel,
    surfaces: &[usize],
    params: &LightParams,
    framecount: i32,
) -> Result<i32, RendererError> {
    let mut uploads = 0;
    for &s in surfaces {
        let Some(surf) = world.surfaces.get(s) else {
            continue;
        };
        let flags = world.texinfo.get(surf.texinfo).map_or(0, |t| t.flags);
        if flags & (SURF_SKY | SURF_TRANS33 | SURF_TRANS66 | SURF_WARP) != 0 {
            continue;
        }
        let dynamic = surf.dlightframe == framecount;
        if !dynamic && !lightstyles_changed(surf, params.lightstyles) {
            continue;
        }

        let (smax, tmax) = surf.lightmap_size();
        let mut texels = vec![0u8; smax * tmax * 4];
        builder.build(world, s, &mut texels, smax * 4, params, framecount)?;

        let surf = &mut world.surfaces[s];
        if dynamic {
            // force a rebuild once the light is gone
            surf.cached_light = [-1.0; MAXLIGHTMAPS];
        } else {
            set_cache_state(surf, params.lightstyles);
        }
        backend.upload_lightmap(s, smax, tmax, &texels);
        uploads += 1;
    }
    Ok(uploads)
}

/// The BSP renderer core. Owns the loaded world, the model and image
/// registries and all per-frame view state; drawing goes through `B`.
pub struct Renderer<B: RenderBackend> {
    pub backend: B,
    pub(crate) console: Console,
    pub(crate) cvars: RendererCvars,

    pub(crate) images: Arc<RwLock<ImageRegistry>>,
    pub(crate) models: Arc<RwLock<ModelRegistry>>,
    pub(crate) world: Option<WorldModel>,
    image_loader: Option<ImageLoaderFn>,

    pub(crate) tables: AliasTables,
    lightmaps: LightmapBuilder,

    pub d_8to24table: [u32; 256],
    pub(crate) raw_palette: [u32; 256],

    pub(crate) notexture: Option<ImageId>,
    pub(crate) particletexture: Option<ImageId>,
    pub(crate) draw_chars: Option<ImageId>,

    pub(crate) vid_width: i32,
    pub(crate) vid_height: i32,

    // view state
    pub(crate) framecount: i32,
    pub(crate) visframecount: i32,
    pub(crate) dlightframecount: i32,
    pub(crate) origin: Vec3,
    pub(crate) vpn: Vec3,
    pub(crate) vright: Vec3,
    pub(crate) vup: Vec3,
    pub(crate) frustum: [CPlane; 4],
    pub(crate) world_matrix: Mat4,
    pub(crate) projection: Mat4,
    viewcluster: i32,
    viewcluster2: i32,
    oldviewcluster: i32,
    oldviewcluster2: i32,
    pub(crate) v_blend: [f32; 4],
    pub(crate) camera_separation: f32,
    trickframe: i32,
    pub(crate) depth_min: f32,
    pub(crate) depth_max: f32,
    pub(crate) lightspot: Vec3,
    pub(crate) lightlevel: f32,

    batch: SurfaceBatch,
    alpha_surfaces: Vec<usize>,

    // performance counters
    pub c_brush_polys: i32,
    pub c_alias_polys: i32,
    pub c_visible_textures: i32,
    pub c_visible_lightmaps: i32,
}

impl<B: RenderBackend> Renderer<B> {
    pub fn new(backend: B, console: Console) -> Self {
        Self {
            backend,
            console,
            cvars: RendererCvars::default(),
            images: Arc::new(RwLock::new(ImageRegistry::new())),
            models: Arc::new(RwLock::new(ModelRegistry::new())),
            world: None,
            image_loader: None,
            tables: AliasTables::new(),
            lightmaps: LightmapBuilder::new(),
            d_8to24table: [0; 256],
            raw_palette: [0; 256],
            notexture: None,
            particletexture: None,
            draw_chars: None,
            vid_width: 0,
            vid_height: 0,
            framecount: 0,
            visframecount: 0,
            dlightframecount: 0,
            origin: [0.0; 3],
            vpn: [0.0; 3],
            vright: [0.0; 3],
            vup: [0.0; 3],
            frustum: [CPlane::default(); 4],
            world_matrix: r_matrix::IDENTITY,
            projection: r_matrix::IDENTITY,
            viewcluster: -1,
            viewcluster2: -1,
            oldviewcluster: -1,
            oldviewcluster2: -1,
            v_blend: [0.0; 4],
            camera_separation: 0.0,
            trickframe: 0,
            depth_min: 0.0,
            depth_max: 1.0,
            lightspot: [0.0; 3],
            lightlevel: 0.0,
            batch: SurfaceBatch::default(),
            alpha_surfaces: Vec::new(),
            c_brush_polys: 0,
            c_alias_polys: 0,
            c_visible_textures: 0,
            c_visible_lightmaps: 0,
        }
    }

    // ========================================================
    // Setup and teardown
    // ========================================================

    /// Registers the renderer cvars and commands, builds the palette and
    /// uploads the built-in textures.
    pub fn init(&mut self, cmd: &mut CmdContext, palette: Option<&[u8]>) -> Result<(), RendererError> {
        register_cvars(&mut cmd.cvars);
        self.cvars = RendererCvars::read(&cmd.cvars);

        let images = Arc::clone(&self.images);
        cmd.add_command("imagelist", move |ctx| images.read().list(&ctx.console));
        let models = Arc::clone(&self.models);
        cmd.add_command("modellist", move |ctx| models.read().list(&ctx.console));
        let strings = self.backend.strings();
        cmd.add_command("gl_strings", move |ctx| {
            ctx.console.printf(&format!("GL_VENDOR: {}\n", strings.vendor));
            ctx.console.printf(&format!("GL_RENDERER: {}\n", strings.renderer));
            ctx.console.printf(&format!("GL_VERSION: {}\n", strings.version));
            ctx.console.printf(&format!("GL_EXTENSIONS: {}\n", strings.extensions));
        });

        self.draw_get_palette(palette)?;
        self.set_palette(None);

        // default state
        self.backend.clear_color([1.0, 0.0, 0.5, 0.5]);
        self.backend.cull_face(CullFace::Front);
        self.backend.enable(RenderState::TEXTURE_2D | RenderState::ALPHA_TEST);
        self.backend.disable(RenderState::DEPTH_TEST | RenderState::CULL_FACE | RenderState::BLEND);
        let mode = cmd.cvars.variable_string("gl_texturemode").to_string();
        self.texture_mode(&mode);
        cmd.cvars.take_modified("gl_texturemode");

        self.notexture = Some(self.upload_builtin("***r_notexture***", &notexture_rgba()));
        self.particletexture = Some(self.upload_builtin("***particle***", &particle_texture_rgba()));
        self.draw_init_local(&mut cmd.cvars);

        tracing::debug!(target: "renderer", "renderer initialised");
        Ok(())
    }

    pub fn shutdown(&mut self, cmd: &mut CmdContext) {
        cmd.remove_command("modellist");
        cmd.remove_command("imagelist");
        cmd.remove_command("gl_strings");
        self.world = None;
        self.models.write().clear();
        self.images.write().clear();
        self.notexture = None;
        self.particletexture = None;
        self.draw_chars = None;
    }

    pub fn set_mode(&mut self, width: i32, height: i32) {
        self.vid_width = width;
        self.vid_height = height;
        tracing::debug!(target: "renderer", width, height, "video mode set");
    }

    /// Installs the decoder used to load images by name.
    pub fn set_image_loader(&mut self, loader: ImageLoaderFn) {
        self.image_loader = Some(loader);
    }

    fn upload_builtin(&mut self, name: &str, rgba: &[u8]) -> ImageId {
        let (id, texnum) = {
            let mut images = self.images.write();
            let id = images.register(name, ImageType::Wall, 8, 8);
            (id, images.texnum(id))
        };
        self.backend.upload_image(texnum, 8, 8, rgba);
        id
    }

    /// Finds an image by name, loading and uploading it on first use.
    pub fn find_image(&mut self, name: &str, image_type: ImageType) -> Option<ImageId> {
        if let Some(id) = self.images.read().find(name) {
            return Some(id);
        }
        let Some(loaded) = self.image_loader.as_ref().and_then(|load| load(name)) else {
            tracing::debug!(target: "renderer", name, "image not found");
            return None;
        };
        let (id, texnum) = {
            let mut images = self.images.write();
            let id = images.register(name, image_type, loaded.width as i32, loaded.height as i32);
            (id, images.texnum(id))
        };
        self.backend.upload_image(texnum, loaded.width, loaded.height, &loaded.rgba);
        Some(id)
    }

    pub fn register_model(&mut self, model: Model) -> ModelId {
        tracing::debug!(target: "renderer", name = %model.name, "model registered");
        self.models.write().register(model)
    }

    /// Makes `world` the current map and lists it with the loaded models.
    pub fn set_world_model(&mut self, world: WorldModel) -> ModelId {
        let mut entry = Model::new(&world.name, ModelKind::Brush(BrushModel::default()));
        entry.extradatasize = world.size_bytes();
        let id = self.models.write().register(entry);

        self.world = Some(world);
        self.viewcluster = -1;
        self.viewcluster2 = -1;
        self.oldviewcluster = -1;
        self.oldviewcluster2 = -1;
        id
    }

    pub fn world(&self) -> Option<&WorldModel> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut WorldModel> {
        self.world.as_mut()
    }

    pub fn images(&self) -> Arc<RwLock<ImageRegistry>> {
        Arc::clone(&self.images)
    }

    /// The light level last reported for the view, 150 per unit of light.
    pub fn lightlevel(&self) -> f32 {
        self.lightlevel
    }

    pub fn framecount(&self) -> i32 {
        self.framecount
    }

    /// Sets the raw palette used by `draw_stretch_raw`. `None` reuses the
    /// 8-bit to 24-bit table.
    pub fn set_palette(&mut self, palette: Option<&[u8]>) {
        for i in 0..256 {
            self.raw_palette[i] = match palette {
                Some(p) if p.len() >= (i + 1) * 3 => {
                    p[i * 3] as u32 | (p[i * 3 + 1] as u32) << 8 | (p[i * 3 + 2] as u32) << 16 | 0xff00_0000
                }
                _ => (self.d_8to24table[i] & 0x00ff_ffff) | 0xff00_0000,
            };
        }
        self.backend.clear_color([0.0; 4]);
        self.backend.clear(ClearFlags::COLOR);
        self.backend.clear_color([1.0, 0.0, 0.5, 0.5]);
    }

    fn texture_mode(&mut self, name: &str) {
        match TextureMode::from_name(name) {
            Some(mode) => self.backend.set_texture_mode(mode),
            None => self.console.printf("bad filter name\n"),
        }
    }

    // ========================================================
    // Frame entry points
    // ========================================================

    /// Applies changed video cvars, goes to 2D and clears the buffers.
    pub fn begin_frame(&mut self, cvars: &mut CvarContext, camera_separation: f32) {
        self.camera_separation = camera_separation;
        self.cvars = RendererCvars::read(cvars);
        self.backend.begin_frame();

        if cvars.take_modified("vid_gamma") {
            self.backend.set_gamma(cvars.variable_value("vid_gamma"));
        }

        self.set_gl_2d();

        // draw buffer stuff
        if cvars.take_modified("gl_drawbuffer") {
            let buffer = if cvars.variable_string("gl_drawbuffer").eq_ignore_ascii_case("GL_FRONT") {
                DrawBuffer::Front
            } else {
                DrawBuffer::Back
            };
            self.backend.set_draw_buffer(buffer);
        }

        // texturemode stuff
        if cvars.take_modified("gl_texturemode") {
            let mode = cvars.variable_string("gl_texturemode").to_string();
            self.texture_mode(&mode);
        }

        // clear screen if desired
        self.clear();
    }

    pub fn end_frame(&mut self) {
        self.backend.end_frame();
    }

    /// Draws one 3D view, records the view light level in `r_lightlevel`
    /// and returns to 2D.
    pub fn render_frame(&mut self, cvars: &mut CvarContext, fd: &RefDef) -> Result<(), RendererError> {
        self.cvars = RendererCvars::read(cvars);
        self.render_view(fd)?;
        self.set_light_level(fd);
        cvars.set_value("r_lightlevel", self.lightlevel);
        self.set_gl_2d();
        Ok(())
    }

    pub fn render_view(&mut self, fd: &RefDef) -> Result<(), RendererError> {
        if self.cvars.norefresh {
            return Ok(());
        }

        if self.world.is_none() && fd.rdflags & RDF_NOWORLDMODEL == 0 {
            tracing::error!(target: "renderer", "render_view without a world model");
            return Err(RendererError::NullWorldModel);
        }

        if self.cvars.speeds {
            self.c_brush_polys = 0;
            self.c_alias_polys = 0;
        }

        self.push_dlights(fd);
        self.setup_frame(fd);
        self.set_frustum(fd);
        self.setup_gl(fd);
        self.mark_leaves(); // done here so we know if we're in water
        self.draw_world(fd)?;
        self.draw_entities(fd)?;
        self.render_dlights(fd);
        self.draw_particles(fd);
        self.draw_alpha_surfaces();
        self.poly_blend();

        if self.cvars.speeds {
            self.console.printf(&format!(
                "{:4} wpoly {:4} epoly {} tex {} lmaps\n",
                self.c_brush_polys, self.c_alias_polys, self.c_visible_textures, self.c_visible_lightmaps
            ));
        }
        tracing::trace!(
            target: "renderer",
            brush = self.c_brush_polys,
            alias = self.c_alias_polys,
            "frame counters"
        );
        Ok(())
    }

    // ========================================================
    // View setup
    // ========================================================

    fn push_dlights(&mut self, fd: &RefDef) {
        // because the count hasn't advanced yet for this frame
        self.dlightframecount = self.framecount + 1;
        if self.cvars.flashblend {
            return;
        }
        if let Some(world) = self.world.as_mut() {
            let root = world.root();
            push_dlights(world, &fd.dlights, root, self.dlightframecount);
        }
    }

    pub(crate) fn setup_frame(&mut self, fd: &RefDef) {
        self.framecount += 1;

        // build the transformation matrix for the given view angles
        self.origin = fd.vieworg;
        let (f, r, u) = angle_vectors(&fd.viewangles);
        self.vpn = f;
        self.vright = r;
        self.vup = u;

        // current viewcluster
        if fd.rdflags & RDF_NOWORLDMODEL == 0 {
            if let Some(world) = self.world.as_ref() {
                self.oldviewcluster = self.viewcluster;
                self.oldviewcluster2 = self.viewcluster2;

                let leaf = world.point_in_leaf(&self.origin).and_then(|i| world.leafs.get(i));
                let (cluster, contents) = leaf.map_or((-1, CONTENTS_SOLID), |l| (l.cluster, l.contents));
                self.viewcluster = cluster;
                self.viewcluster2 = cluster;

                // check above and below so crossing solid water doesn't draw wrong
                let mut temp = self.origin;
                if contents == 0 {
                    temp[2] -= 16.0; // look down a bit
                } else {
                    temp[2] += 16.0; // look up a bit
                }
                if let Some(leaf) = world.point_in_leaf(&temp).and_then(|i| world.leafs.get(i)) {
                    if leaf.contents & CONTENTS_SOLID == 0 && leaf.cluster != self.viewcluster2 {
                        self.viewcluster2 = leaf.cluster;
                    }
                }
            }
        }

        self.v_blend = fd.blend;

        self.c_brush_polys = 0;
        self.c_alias_polys = 0;

        // clear out the portion of the screen that the NOWORLDMODEL defines
        if fd.rdflags & RDF_NOWORLDMODEL != 0 {
            self.backend.enable(RenderState::SCISSOR_TEST);
            self.backend.clear_color([0.3, 0.3, 0.3, 1.0]);
            self.backend
                .set_scissor(fd.x, self.vid_height - fd.height - fd.y, fd.width, fd.height);
            self.backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
            self.backend.clear_color([1.0, 0.0, 0.5, 0.5]);
            self.backend.disable(RenderState::SCISSOR_TEST);
        }
    }

    pub(crate) fn set_frustum(&mut self, fd: &RefDef) {
        let normals = [
            // rotate VPN right by FOV_X/2 degrees
            rotate_point_around_vector(&self.vup, &self.vpn, -(90.0 - fd.fov_x / 2.0)),
            // rotate VPN left by FOV_X/2 degrees
            rotate_point_around_vector(&self.vup, &self.vpn, 90.0 - fd.fov_x / 2.0),
            // rotate VPN up by FOV_Y/2 degrees
            rotate_point_around_vector(&self.vright, &self.vpn, 90.0 - fd.fov_y / 2.0),
            // rotate VPN down by FOV_Y/2 degrees
            rotate_point_around_vector(&self.vright, &self.vpn, -(90.0 - fd.fov_y / 2.0)),
        ];

        for (plane, normal) in self.frustum.iter_mut().zip(normals) {
            *plane = CPlane {
                normal,
                dist: dot_product(&self.origin, &normal),
                plane_type: PLANE_ANYZ,
                signbits: signbits_for_plane(&normal),
            };
        }
    }

    pub(crate) fn setup_gl(&mut self, fd: &RefDef) {
        // set up viewport
        let x = fd.x;
        let x2 = fd.x + fd.width;
        let y = self.vid_height - fd.y;
        let y2 = self.vid_height - (fd.y + fd.height);
        self.backend.set_viewport(x, y2, x2 - x, y - y2);

        // set up projection matrix
        let screenaspect = fd.width as f64 / fd.height.max(1) as f64;
        let zfar = if self.cvars.farsee { Z_FAR_SEE } else { Z_FAR };
        self.projection = perspective(fd.fov_y as f64, screenaspect, Z_NEAR, zfar, self.camera_separation);
        self.backend.load_projection(&self.projection);

        self.backend.cull_face(CullFace::Front);

        let m = r_matrix::rotate(&r_matrix::IDENTITY, -90.0, 1.0, 0.0, 0.0); // put Z going up
        let m = r_matrix::rotate(&m, 90.0, 0.0, 0.0, 1.0); // put Z going up
        let m = r_matrix::rotate(&m, -fd.viewangles[2], 1.0, 0.0, 0.0);
        let m = r_matrix::rotate(&m, -fd.viewangles[0], 0.0, 1.0, 0.0);
        let m = r_matrix::rotate(&m, -fd.viewangles[1], 0.0, 0.0, 1.0);
        self.world_matrix = r_matrix::translate(&m, -fd.vieworg[0], -fd.vieworg[1], -fd.vieworg[2]);
        self.backend.load_modelview(&self.world_matrix);

        // set drawing parms
        self.backend.enable(RenderState::CULL_FACE);
        self.backend.disable(RenderState::BLEND | RenderState::ALPHA_TEST);
        self.backend.enable(RenderState::DEPTH_TEST);
    }

    /// Clears depth (and colour when `gl_clear` is set). With `gl_ztrick`
    /// alternate frames use opposite halves of the depth range instead.
    pub(crate) fn clear(&mut self) {
        if self.cvars.ztrick {
            if self.cvars.clear {
                self.backend.clear(ClearFlags::COLOR);
            }

            self.trickframe += 1;
            if self.trickframe & 1 != 0 {
                self.depth_min = 0.0;
                self.depth_max = 0.49999;
                self.backend.depth_func(DepthFunc::LessEqual);
            } else {
                self.depth_min = 1.0;
                self.depth_max = 0.5;
                self.backend.depth_func(DepthFunc::GreaterEqual);
            }
        } else {
            if self.cvars.clear {
                self.backend.clear(ClearFlags::COLOR | ClearFlags::DEPTH);
            } else {
                self.backend.clear(ClearFlags::DEPTH);
            }
            self.depth_min = 0.0;
            self.depth_max = 1.0;
            self.backend.depth_func(DepthFunc::LessEqual);
        }

        self.backend.depth_range(self.depth_min, self.depth_max);

        // stencil shadows
        if self.cvars.shadows {
            self.backend.clear(ClearFlags::STENCIL);
        }
    }

    pub fn set_gl_2d(&mut self) {
        // set 2D virtual screen size
        self.backend.set_viewport(0, 0, self.vid_width, self.vid_height);
        let proj = r_matrix::ortho(0.0, self.vid_width as f32, self.vid_height as f32, 0.0, -99999.0, 99999.0);
        self.backend.load_projection(&proj);
        self.backend.load_modelview(&r_matrix::IDENTITY);
        self.backend
            .disable(RenderState::DEPTH_TEST | RenderState::CULL_FACE | RenderState::BLEND);
        self.backend.enable(RenderState::ALPHA_TEST);
    }

    fn set_light_level(&mut self, fd: &RefDef) {
        if fd.rdflags & RDF_NOWORLDMODEL != 0 {
            return;
        }
        // save off light value for server to look at
        let params = LightParams {
            dlights: &fd.dlights,
            lightstyles: &fd.lightstyles,
            modulate: self.cvars.modulate,
        };
        let c = light_point(self.world.as_ref(), &fd.vieworg, &fd.vieworg, &params, &mut self.lightspot);
        // pick the greatest component
        self.lightlevel = 150.0 * c[0].max(c[1]).max(c[2]);
    }

    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        cull_box(&self.frustum, self.cvars.nocull, mins, maxs)
    }

    // ========================================================
    // World
    // ========================================================

    /// Marks the leaves and nodes in the potentially visible set of the
    /// view clusters with the current visframe.
    pub(crate) fn mark_leaves(&mut self) {
        if self.oldviewcluster == self.viewcluster
            && self.oldviewcluster2 == self.viewcluster2
            && !self.cvars.novis
            && self.viewcluster != -1
        {
            return;
        }
        let Some(world) = self.world.as_mut() else {
            return;
        };

        self.visframecount += 1;
        self.oldviewcluster = self.viewcluster;
        self.oldviewcluster2 = self.viewcluster2;
        let visframe = self.visframecount;

        if self.cvars.novis || self.viewcluster == -1 || world.vis.is_empty() {
            // mark everything
            for leaf in &mut world.leafs {
                leaf.visframe = visframe;
            }
            for node in &mut world.nodes {
                node.visframe = visframe;
            }
            return;
        }

        // may have to combine two clusters because of solid water boundaries
        let mut fatvis = world.cluster_pvs(self.viewcluster).map(<[u8]>::to_vec).unwrap_or_default();
        if self.viewcluster2 != self.viewcluster {
            if let Some(vis) = world.cluster_pvs(self.viewcluster2) {
                for (a, b) in fatvis.iter_mut().zip(vis) {
                    *a |= b;
                }
            }
        }

        for i in 0..world.leafs.len() {
            let cluster = world.leafs[i].cluster;
            if cluster == -1 {
                continue;
            }
            let visible = fatvis
                .get((cluster >> 3) as usize)
                .is_some_and(|b| b & (1 << (cluster & 7)) != 0);
            if !visible || world.leafs[i].visframe == visframe {
                continue;
            }
            world.leafs[i].visframe = visframe;

            let mut node = world.leafs[i].parent;
            while let Some(n) = node {
                if world.nodes[n].visframe == visframe {
                    break;
                }
                world.nodes[n].visframe = visframe;
                node = world.nodes[n].parent;
            }
        }
    }

    pub(crate) fn draw_world(&mut self, fd: &RefDef) -> Result<(), RendererError> {
        if !self.cvars.drawworld || fd.rdflags & RDF_NOWORLDMODEL != 0 {
            return Ok(());
        }
        let Some(world) = self.world.as_mut() else {
            return Ok(());
        };

        self.batch.clear();
        self.alpha_surfaces.clear();
        let root = world.root();
        let mut walk = WorldWalk {
            frustum: &self.frustum,
            nocull: self.cvars.nocull,
            modelorg: fd.vieworg,
            framecount: self.framecount,
            visframecount: self.visframecount,
            batch: &mut self.batch,
            alpha_surfaces: &mut self.alpha_surfaces,
        };
        recursive_world_node(world, Some(root), &mut walk);

        let params = LightParams {
            dlights: &fd.dlights,
            lightstyles: &fd.lightstyles,
            modulate: self.cvars.modulate,
        };
        self.c_visible_lightmaps = update_lightmaps(
            &mut self.backend,
            &mut self.lightmaps,
            world,
            &self.batch.opaque,
            &params,
            self.framecount,
        )?;

        let textures: HashSet<_> = self
            .batch
            .opaque
            .iter()
            .filter_map(|&s| world.surfaces.get(s))
            .filter_map(|s| world.texinfo.get(s.texinfo).and_then(|t| t.image))
            .collect();
        self.c_visible_textures = textures.len() as i32;
        self.c_brush_polys += self.batch.opaque.len() as i32;

        self.backend.draw_world(world, &self.batch);
        Ok(())
    }

    fn draw_alpha_surfaces(&mut self) {
        let Some(world) = self.world.as_ref() else {
            return;
        };
        if self.alpha_surfaces.is_empty() {
            return;
        }
        // go back to the world matrix
        self.backend.load_modelview(&self.world_matrix);
        self.backend.enable(RenderState::BLEND);
        self.backend.draw_alpha_surfaces(world, &self.alpha_surfaces);
        self.backend.disable(RenderState::BLEND);
        self.alpha_surfaces.clear();
    }

    // ========================================================
    // Entities
    // ========================================================

    pub(crate) fn draw_entities(&mut self, fd: &RefDef) -> Result<(), RendererError> {
        if !self.cvars.drawentities {
            return Ok(());
        }
        let mut entities = fd.entities.clone();

        // draw non-transparent first
        for e in entities.iter_mut().filter(|e| e.flags & RF_TRANSLUCENT == 0) {
            self.draw_entity(e, fd)?;
        }

        // draw transparent entities
        // we could sort these if it ever becomes a problem...
        self.backend.disable(RenderState::DEPTH_WRITE);
        for e in entities.iter_mut().filter(|e| e.flags & RF_TRANSLUCENT != 0) {
            self.draw_entity(e, fd)?;
        }
        self.backend.enable(RenderState::DEPTH_WRITE); // back to writing
        Ok(())
    }

    pub(crate) fn draw_entity(&mut self, e: &mut Entity, fd: &RefDef) -> Result<(), RendererError> {
        if e.flags & RF_BEAM != 0 {
            self.draw_beam(e);
            return Ok(());
        }

        let Some(model) = e.model.and_then(|id| self.models.read().get(id)) else {
            self.draw_null_model(e, fd);
            return Ok(());
        };

        match &model.kind {
            ModelKind::Alias(alias) => self.draw_alias_model(e, &model, alias, fd),
            ModelKind::Brush(bmodel) => self.draw_brush_model(e, bmodel, fd)?,
            ModelKind::Sprite(sprite) => self.draw_sprite_model(e, &model.name, sprite),
            ModelKind::Bad => {
                tracing::error!(target: "renderer", model = %model.name, "bad model type");
                return Err(RendererError::BadModelType);
            }
        }
        Ok(())
    }

    fn draw_brush_model(&mut self, e: &Entity, bmodel: &BrushModel, fd: &RefDef) -> Result<(), RendererError> {
        if bmodel.numfaces == 0 {
            return Ok(());
        }

        let rotated = e.angles.iter().any(|&a| a != 0.0);
        let (mins, maxs) = if rotated {
            let r = bmodel.radius;
            (
                [e.origin[0] - r, e.origin[1] - r, e.origin[2] - r],
                [e.origin[0] + r, e.origin[1] + r, e.origin[2] + r],
            )
        } else {
            (vector_add(&e.origin, &bmodel.mins), vector_add(&e.origin, &bmodel.maxs))
        };
        if self.cull_box(&mins, &maxs) {
            return Ok(());
        }

        let Some(world) = self.world.as_mut() else {
            return Ok(());
        };

        let mut modelorg = vector_subtract(&fd.vieworg, &e.origin);
        if rotated {
            let temp = modelorg;
            let (forward, right, up) = angle_vectors(&e.angles);
            modelorg = [
                dot_product(&temp, &forward),
                -dot_product(&temp, &right),
                dot_product(&temp, &up),
            ];
        }

        let mut angles = e.angles;
        angles[0] = -angles[0]; // stupid quake bug
        angles[2] = -angles[2]; // stupid quake bug
        let modelview = rotate_for_entity(&self.world_matrix, &e.origin, &angles);
        self.backend.load_modelview(&modelview);

        // calculate dynamic lighting for bmodel
        if !self.cvars.flashblend {
            for (k, dl) in fd.dlights.iter().enumerate().take(MAX_DLIGHTS) {
                let local = DLight {
                    origin: vector_subtract(&dl.origin, &e.origin),
                    ..*dl
                };
                mark_lights(
                    world,
                    &local,
                    1 << k,
                    Some(NodeRef::Node(bmodel.headnode)),
                    self.dlightframecount,
                );
            }
        }

        // draw the faces that point toward the viewer
        let mut surfaces = Vec::new();
        for s in bmodel.firstface..bmodel.firstface + bmodel.numfaces {
            let Some(surf) = world.surfaces.get(s) else {
                break;
            };
            let Some(plane) = world.planes.get(surf.plane) else {
                continue;
            };
            let dot = dot_product(&modelorg, &plane.normal) - plane.dist;
            let back = surf.flags & SURF_PLANEBACK != 0;
            if (back && dot < -BACKFACE_EPSILON) || (!back && dot > BACKFACE_EPSILON) {
                let flags = world.texinfo.get(surf.texinfo).map_or(0, |t| t.flags);
                if flags & (SURF_TRANS33 | SURF_TRANS66) != 0 {
                    // add to the translucent chain
                    self.alpha_surfaces.push(s);
                } else {
                    surfaces.push(s);
                }
            }
        }

        let params = LightParams {
            dlights: &fd.dlights,
            lightstyles: &fd.lightstyles,
            modulate: self.cvars.modulate,
        };
        self.c_visible_lightmaps +=
            update_lightmaps(&mut self.backend, &mut self.lightmaps, world, &surfaces, &params, self.framecount)?;
        self.c_brush_polys += surfaces.len() as i32;

        self.backend.draw_brush_surfaces(world, e, &surfaces);
        self.backend.load_modelview(&self.world_matrix);
        Ok(())
    }

    fn draw_sprite_model(&mut self, e: &Entity, name: &str, sprite: &SpriteModel) {
        if sprite.frames.is_empty() {
            return;
        }
        let framenum = e.frame.rem_euclid(sprite.frames.len() as i32);
        let frame = &sprite.frames[framenum as usize];

        let alpha = if e.flags & RF_TRANSLUCENT != 0 { e.alpha } else { 1.0 };
        if alpha != 1.0 {
            self.backend.enable(RenderState::BLEND);
        }

        let image = match frame.image {
            Some(image) => Some(image),
            None => {
                tracing::warn!(target: "renderer", model = %name, frame = framenum, "missing sprite frame image");
                self.console
                    .dprintf(&format!("R_DrawSpriteModel: {} frame {} has no image\n", name, framenum));
                self.notexture
            }
        };
        let texnum = image.map_or(0, |i| self.images.read().texnum(i));
        self.backend.bind_texture(texnum);

        if alpha == 1.0 {
            self.backend.enable(RenderState::ALPHA_TEST);
        } else {
            self.backend.disable(RenderState::ALPHA_TEST);
        }

        let up = self.vup;
        let right = self.vright;
        let color = [1.0, 1.0, 1.0, alpha];
        let corner = |u: f32, r: f32| vector_ma(&vector_ma(&e.origin, u, &up), r, &right);

        let bottom = -(frame.origin_y as f32);
        let top = (frame.height - frame.origin_y) as f32;
        let left = -(frame.origin_x as f32);
        let rt = (frame.width - frame.origin_x) as f32;
        let quad = [
            Vertex::new(corner(bottom, left), [0.0, 1.0], color),
            Vertex::new(corner(top, left), [0.0, 0.0], color),
            Vertex::new(corner(top, rt), [1.0, 0.0], color),
            Vertex::new(corner(bottom, rt), [1.0, 1.0], color),
        ];
        self.backend.draw(Primitive::Quads, &quad);

        self.backend.disable(RenderState::ALPHA_TEST);
        if alpha != 1.0 {
            self.backend.disable(RenderState::BLEND);
        }
    }

    fn draw_null_model(&mut self, e: &Entity, fd: &RefDef) {
        let shadelight = if e.flags & RF_FULLBRIGHT != 0 {
            [1.0; 3]
        } else {
            let params = LightParams {
                dlights: &fd.dlights,
                lightstyles: &fd.lightstyles,
                modulate: self.cvars.modulate,
            };
            light_point(self.world.as_ref(), &e.origin, &e.origin, &params, &mut self.lightspot)
        };

        let modelview = rotate_for_entity(&self.world_matrix, &e.origin, &e.angles);
        self.backend.load_modelview(&modelview);
        self.backend.disable(RenderState::TEXTURE_2D);

        let color = [shadelight[0], shadelight[1], shadelight[2], 1.0];
        let rim = |i: i32| {
            let a = i as f32 * std::f32::consts::FRAC_PI_2;
            Vertex::colored([16.0 * a.cos(), 16.0 * a.sin(), 0.0], color)
        };

        let mut fan = vec![Vertex::colored([0.0, 0.0, -16.0], color)];
        fan.extend((0..=4).map(rim));
        self.backend.draw(Primitive::TriangleFan, &fan);

        let mut fan = vec![Vertex::colored([0.0, 0.0, 16.0], color)];
        fan.extend((0..=4).rev().map(rim));
        self.backend.draw(Primitive::TriangleFan, &fan);

        self.backend.load_modelview(&self.world_matrix);
        self.backend.enable(RenderState::TEXTURE_2D);
    }

    fn draw_beam(&mut self, e: &Entity) {
        let direction = vector_subtract(&e.oldorigin, &e.origin);
        let mut normalized = direction;
        if vector_normalize(&mut normalized) == 0.0 {
            return;
        }

        let mut perpvec = perpendicular_vector(&normalized);
        let half_width = (e.frame / 2) as f32;
        for c in perpvec.iter_mut() {
            *c *= half_width;
        }

        let mut start_points = [[0.0f32; 3]; NUM_BEAM_SEGS];
        let mut end_points = [[0.0f32; 3]; NUM_BEAM_SEGS];
        for i in 0..NUM_BEAM_SEGS {
            let p = rotate_point_around_vector(&normalized, &perpvec, (360.0 / NUM_BEAM_SEGS as f32) * i as f32);
            start_points[i] = vector_add(&p, &e.origin);
            end_points[i] = vector_add(&start_points[i], &direction);
        }

        self.backend.disable(RenderState::TEXTURE_2D);
        self.backend.enable(RenderState::BLEND);
        self.backend.disable(RenderState::DEPTH_WRITE);

        let rgb = palette_rgb(&self.d_8to24table, e.skinnum);
        let color = [rgb[0], rgb[1], rgb[2], e.alpha];
        let mut strip = Vec::with_capacity(NUM_BEAM_SEGS * 4);
        for i in 0..NUM_BEAM_SEGS {
            let next = (i + 1) % NUM_BEAM_SEGS;
            strip.push(Vertex::colored(start_points[i], color));
            strip.push(Vertex::colored(end_points[i], color));
            strip.push(Vertex::colored(start_points[next], color));
            strip.push(Vertex::colored(end_points[next], color));
        }
        self.backend.draw(Primitive::TriangleStrip, &strip);

        self.backend.enable(RenderState::TEXTURE_2D);
        self.backend.disable(RenderState::BLEND);
        self.backend.enable(RenderState::DEPTH_WRITE);
    }

    // ========================================================
    // Lights, particles and blends
    // ========================================================

    /// Flash-blend halos for every dynamic light.
    pub(crate) fn render_dlights(&mut self, fd: &RefDef) {
        if !self.cvars.flashblend {
            return;
        }

        // because the count hasn't advanced yet for this frame
        self.dlightframecount = self.framecount + 1;

        self.backend.disable(RenderState::DEPTH_WRITE);
        self.backend.disable(RenderState::TEXTURE_2D);
        self.backend.enable(RenderState::BLEND);
        self.backend.blend_mode(BlendMode::Additive);

        for light in &fd.dlights {
            let fan = dlight_fan(light, &self.vpn, &self.vright, &self.vup);
            self.backend.draw(Primitive::TriangleFan, &fan);
        }

        self.backend.disable(RenderState::BLEND);
        self.backend.enable(RenderState::TEXTURE_2D);
        self.backend.blend_mode(BlendMode::Alpha);
        self.backend.enable(RenderState::DEPTH_WRITE);
    }

    fn particle_color(&self, color: i32, alpha: f32) -> [f32; 4] {
        let rgb = palette_rgb(&self.d_8to24table, color);
        let a = (alpha * 255.0) as u8;
        [rgb[0], rgb[1], rgb[2], a as f32 / 255.0]
    }

    pub(crate) fn draw_particles(&mut self, fd: &RefDef) {
        if fd.particles.is_empty() {
            return;
        }

        if self.cvars.particle_point {
            self.backend.disable(RenderState::DEPTH_WRITE);
            self.backend.enable(RenderState::BLEND);
            self.backend.disable(RenderState::TEXTURE_2D);
            self.backend.point_size(self.cvars.particle_size);

            let points: Vec<Vertex> = fd
                .particles
                .iter()
                .map(|p| Vertex::colored(p.origin, self.particle_color(p.color, p.alpha)))
                .collect();
            self.backend.draw(Primitive::Points, &points);

            self.backend.disable(RenderState::BLEND);
            self.backend.enable(RenderState::DEPTH_WRITE);
            self.backend.enable(RenderState::TEXTURE_2D);
            return;
        }

        let texnum = self.particletexture.map_or(0, |i| self.images.read().texnum(i));
        self.backend.bind_texture(texnum);
        self.backend.disable(RenderState::DEPTH_WRITE); // no z buffering
        self.backend.enable(RenderState::BLEND);

        let up: Vec3 = [self.vup[0] * 1.5, self.vup[1] * 1.5, self.vup[2] * 1.5];
        let right: Vec3 = [self.vright[0] * 1.5, self.vright[1] * 1.5, self.vright[2] * 1.5];

        let mut tris = Vec::with_capacity(fd.particles.len() * 3);
        for p in &fd.particles {
            // hack a scale up to keep particles from disappearing
            let depth = dot_product(&vector_subtract(&p.origin, &self.origin), &self.vpn);
            let scale = if depth < 20.0 { 1.0 } else { 1.0 + depth * 0.004 };
            let color = self.particle_color(p.color, p.alpha);

            tris.push(Vertex::new(p.origin, [0.0625, 0.0625], color));
            tris.push(Vertex::new(vector_ma(&p.origin, scale, &up), [1.0625, 0.0625], color));
            tris.push(Vertex::new(vector_ma(&p.origin, scale, &right), [0.0625, 1.0625], color));
        }
        self.backend.draw(Primitive::Triangles, &tris);

        self.backend.disable(RenderState::BLEND);
        self.backend.enable(RenderState::DEPTH_WRITE); // back to normal Z buffering
    }

    /// Full-screen tint for damage, powerups and liquids.
    pub(crate) fn poly_blend(&mut self) {
        if !self.cvars.polyblend || self.v_blend[3] == 0.0 {
            return;
        }

        self.backend.disable(RenderState::ALPHA_TEST);
        self.backend.enable(RenderState::BLEND);
        self.backend.disable(RenderState::DEPTH_TEST);
        self.backend.disable(RenderState::TEXTURE_2D);

        let m = r_matrix::rotate(&r_matrix::IDENTITY, -90.0, 1.0, 0.0, 0.0); // put Z going up
        let m = r_matrix::rotate(&m, 90.0, 0.0, 0.0, 1.0);
        self.backend.load_modelview(&m);

        let c = self.v_blend;
        let quad = [
            Vertex::colored([10.0, 100.0, 100.0], c),
            Vertex::colored([10.0, -100.0, 100.0], c),
            Vertex::colored([10.0, -100.0, -100.0], c),
            Vertex::colored([10.0, 100.0, -100.0], c),
        ];
        self.backend.draw(Primitive::Quads, &quad);

        self.backend.disable(RenderState::BLEND);
        self.backend.enable(RenderState::TEXTURE_2D);
        self.backend.enable(RenderState::ALPHA_TEST);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::r_backend::{BackendCall, RecordingBackend};
    use crate::r_model::tests::floor_world;
    use crate::r_model::{AliasFrame, AliasModel, GlCmd, GlCmdVertex, SpriteFrame, TriVertex};
    use crate::test_util::{assert_near, init_tracing};
    use q2core_common::q_shared::{Particle, RF_WEAPONMODEL};

    /// A renderer with a 640x480 mode, an initialised command context and
    /// a grey-ramp palette.
    pub fn test_renderer() -> (Renderer<RecordingBackend>, CmdContext) {
        init_tracing();
        let con = Console::capturing();
        let mut cmd = CmdContext::with_console(con.clone());
        let mut r = Renderer::new(RecordingBackend::new(), con);
        r.set_mode(640, 480);
        let palette: Vec<u8> = (0..256).flat_map(|i| [i as u8, i as u8, i as u8]).collect();
        r.init(&mut cmd, Some(&palette)).unwrap();
        r.backend.take_calls();
        (r, cmd)
    }

    /// Looking down -z from 64 units above the floor world.
    pub fn view_over_floor() -> RefDef {
        RefDef {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            fov_x: 90.0,
            fov_y: 73.74,
            vieworg: [0.0, 0.0, 32.0],
            viewangles: [90.0, 0.0, 0.0],
            ..Default::default()
        }
    }

    fn cube_model() -> Model {
        let alias = AliasModel {
            frames: vec![AliasFrame {
                name: "frame1".to_string(),
                scale: [0.1; 3],
                translate: [-8.0; 3],
                verts: vec![TriVertex { v: [0, 0, 0], lightnormalindex: 0 }; 3],
            }],
            glcmds: vec![GlCmd::Strip(vec![
                GlCmdVertex { s: 0.0, t: 0.0, index: 0 },
                GlCmdVertex { s: 1.0, t: 0.0, index: 1 },
                GlCmdVertex { s: 0.0, t: 1.0, index: 2 },
            ])],
            num_xyz: 3,
            num_tris: 1,
            skins: vec![None],
        };
        Model::new("models/cube.md2", ModelKind::Alias(alias))
    }

    #[test]
    fn test_perspective_matches_frustum() {
        let m = perspective(90.0, 1.0, 4.0, 4096.0, 0.0);
        // 90 degree fov: ymax == znear
        assert_near(m[5], 1.0);
        assert_near(m[0], 1.0);
        assert_eq!(m[11], -1.0);
        let shifted = perspective(90.0, 1.0, 4.0, 4096.0, 2.0);
        // both edges move left by 2 * sep / znear
        assert_near(shifted[8], -0.25);
    }

    #[test]
    fn test_cull_box() {
        let (mut r, _cmd) = test_renderer();
        let fd = RefDef {
            fov_x: 90.0,
            fov_y: 90.0,
            ..Default::default()
        };
        r.setup_frame(&fd);
        r.set_frustum(&fd);

        // in front of the viewer, looking down +x
        assert!(!r.cull_box(&[90.0, -10.0, -10.0], &[110.0, 10.0, 10.0]));
        // straddling a side plane is kept
        assert!(!r.cull_box(&[90.0, 80.0, -10.0], &[110.0, 120.0, 10.0]));
        // behind
        assert!(r.cull_box(&[-110.0, -10.0, -10.0], &[-90.0, 10.0, 10.0]));

        r.cvars.nocull = true;
        assert!(!r.cull_box(&[-110.0, -10.0, -10.0], &[-90.0, 10.0, 10.0]));
    }

    #[test]
    fn test_null_world_model_is_fatal() {
        let (mut r, mut cmd) = test_renderer();
        let fd = view_over_floor();
        assert_eq!(r.render_frame(&mut cmd.cvars, &fd), Err(RendererError::NullWorldModel));

        // fine without a world when the view asks for none
        let fd = RefDef {
            rdflags: RDF_NOWORLDMODEL,
            ..view_over_floor()
        };
        assert_eq!(r.render_frame(&mut cmd.cvars, &fd), Ok(()));
        assert_eq!(r.backend.count(|c| matches!(c, BackendCall::Scissor(0, 0, 640, 480))), 1);
    }

    #[test]
    fn test_norefresh_skips_view() {
        let (mut r, mut cmd) = test_renderer();
        cmd.cvars.set("r_norefresh", "1");
        // no world, but nothing is drawn so no error either
        assert_eq!(r.render_frame(&mut cmd.cvars, &view_over_floor()), Ok(()));
        assert_eq!(r.framecount(), 0);
        assert_eq!(r.backend.count(|c| matches!(c, BackendCall::DrawWorld(_))), 0);
    }

    #[test]
    fn test_render_world_collects_surfaces_and_lightmaps() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let fd = view_over_floor();
        r.render_frame(&mut cmd.cvars, &fd).unwrap();

        let calls = r.backend.take_calls();
        let batch = calls.iter().find_map(|c| match c {
            BackendCall::DrawWorld(b) => Some(b.clone()),
            _ => None,
        });
        assert_eq!(batch.map(|b| b.opaque), Some(vec![0]));
        assert_eq!(r.c_brush_polys, 1);
        assert_eq!(r.c_visible_lightmaps, 1);
        let uploads: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::UploadLightmap { surface, smax, tmax, rgba } => Some((*surface, *smax, *tmax, rgba[0])),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec![(0, 2, 2, 100)]);

        // same styles next frame: cached, no upload
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        assert_eq!(r.c_visible_lightmaps, 0);
        assert_eq!(r.backend.count(|c| matches!(c, BackendCall::UploadLightmap { .. })), 0);
    }

    #[test]
    fn test_mark_leaves_uses_pvs() {
        let (mut r, mut cmd) = test_renderer();
        let mut world = floor_world();
        world.vis = vec![vec![0]];
        r.set_world_model(world);
        r.render_frame(&mut cmd.cvars, &view_over_floor()).unwrap();
        // cluster 0 cannot see itself, so nothing is walked
        assert_eq!(r.world().map(|w| w.leafs[0].visframe), Some(0));
        assert_eq!(r.c_brush_polys, 0);

        cmd.cvars.set("r_novis", "1");
        r.render_frame(&mut cmd.cvars, &view_over_floor()).unwrap();
        let world = r.world().unwrap();
        assert_eq!(world.leafs[0].visframe, r.visframecount);
        assert_eq!(world.nodes[0].visframe, r.visframecount);
        assert_eq!(r.c_brush_polys, 1);
    }

    #[test]
    fn test_speeds_report() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        cmd.cvars.set("r_speeds", "1");
        r.console.take_output();
        r.render_frame(&mut cmd.cvars, &view_over_floor()).unwrap();
        assert_eq!(r.console.take_output(), "   1 wpoly    0 epoly 0 tex 1 lmaps\n");
    }

    #[test]
    fn test_light_level_written_to_cvar() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let mut fd = view_over_floor();
        fd.lightstyles = vec![Default::default()];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        // grey 100 over 255 at modulate 1
        assert_near(r.lightlevel(), 150.0 * 100.0 / 255.0);
        assert_near(cmd.cvars.variable_value("r_lightlevel"), r.lightlevel());
    }

    #[test]
    fn test_translucent_entities_drawn_last_without_depth_writes() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let mut fd = view_over_floor();
        fd.entities = vec![
            Entity {
                flags: RF_TRANSLUCENT | RF_FULLBRIGHT,
                alpha: 0.5,
                origin: [0.0, 0.0, 8.0],
                ..Default::default()
            },
            Entity {
                flags: RF_FULLBRIGHT,
                origin: [0.0, 0.0, 8.0],
                ..Default::default()
            },
        ];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();

        let calls = r.backend.take_calls();
        let depth_off = calls
            .iter()
            .position(|c| *c == BackendCall::Disable(RenderState::DEPTH_WRITE))
            .unwrap();
        let depth_on = calls
            .iter()
            .rposition(|c| *c == BackendCall::Enable(RenderState::DEPTH_WRITE))
            .unwrap();
        let fans: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, BackendCall::Draw { primitive: Primitive::TriangleFan, .. }))
            .map(|(i, _)| i)
            .collect();
        // two fans per null model: opaque before the mask goes off, translucent inside
        assert_eq!(fans.len(), 4);
        assert!(fans[1] < depth_off);
        assert!(fans[2] > depth_off && fans[3] < depth_on);
    }

    #[test]
    fn test_bad_model_type_is_fatal() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let id = r.register_model(Model::new("models/junk.md2", ModelKind::Bad));
        let mut fd = view_over_floor();
        fd.entities = vec![Entity {
            model: Some(id),
            ..Default::default()
        }];
        assert_eq!(r.render_frame(&mut cmd.cvars, &fd), Err(RendererError::BadModelType));
    }

    #[test]
    fn test_alias_model_draws_and_counts() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let id = r.register_model(cube_model());
        let mut fd = view_over_floor();
        fd.entities = vec![Entity {
            model: Some(id),
            origin: [0.0, 0.0, 8.0],
            flags: RF_FULLBRIGHT,
            ..Default::default()
        }];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        assert_eq!(r.c_alias_polys, 1);
        let notexture = r.images.read().texnum(r.notexture.unwrap());
        assert!(r.backend.calls.contains(&BackendCall::BindTexture(notexture)));
        assert_eq!(
            r.backend.count(|c| matches!(c, BackendCall::Draw { primitive: Primitive::TriangleStrip, .. })),
            1
        );
    }

    #[test]
    fn test_hidden_weapon_and_lefthand_projection() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        let id = r.register_model(cube_model());
        let mut fd = view_over_floor();
        fd.entities = vec![Entity {
            model: Some(id),
            origin: [0.0, 0.0, 8.0],
            flags: RF_WEAPONMODEL | RF_FULLBRIGHT,
            ..Default::default()
        }];

        cmd.cvars.set("hand", "2");
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        assert_eq!(r.c_alias_polys, 0);

        cmd.cvars.set("hand", "1");
        r.backend.take_calls();
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        assert_eq!(r.c_alias_polys, 1);
        assert!(r.backend.calls.contains(&BackendCall::CullFace(CullFace::Back)));
        let mirrored = r.backend.calls.iter().any(|c| matches!(c, BackendCall::Projection(m) if m[0] < 0.0));
        assert!(mirrored);
    }

    #[test]
    fn test_flashblend_halos() {
        let (mut r, mut cmd) = test_renderer();
        r.set_world_model(floor_world());
        cmd.cvars.set("gl_flashblend", "1");
        let mut fd = view_over_floor();
        fd.dlights = vec![DLight {
            origin: [0.0, 0.0, 16.0],
            color: [1.0, 0.5, 0.0],
            intensity: 200.0,
        }];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let fans: Vec<usize> = r
            .backend
            .draws()
            .iter()
            .filter(|(p, _)| *p == Primitive::TriangleFan)
            .map(|(_, v)| v.len())
            .collect();
        assert_eq!(fans, vec![18]);
        assert!(r.backend.calls.contains(&BackendCall::Blend(BlendMode::Additive)));
        // flashblend lights never touch the surfaces
        assert_eq!(r.world().map(|w| w.surfaces[0].dlightbits), Some(0));
    }

    #[test]
    fn test_particles_point_and_triangle_paths() {
        let (mut r, mut cmd) = test_renderer();
        let mut fd = RefDef {
            rdflags: RDF_NOWORLDMODEL,
            ..view_over_floor()
        };
        fd.particles = vec![
            Particle {
                origin: [0.0, 0.0, 0.0],
                color: 0x100 | 200,
                alpha: 0.5,
            };
            2
        ];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let draws = r.backend.draws();
        let (prim, verts) = draws[0];
        assert_eq!(prim, Primitive::Points);
        assert_eq!(verts.len(), 2);
        assert_near(verts[0].rgba[0], 200.0 / 255.0);
        assert_near(verts[0].rgba[3], 127.0 / 255.0);

        cmd.cvars.set("gl_particle_point", "0");
        r.backend.take_calls();
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let draws = r.backend.draws();
        assert_eq!(draws[0].0, Primitive::Triangles);
        assert_eq!(draws[0].1.len(), 6);
    }

    #[test]
    fn test_poly_blend() {
        let (mut r, mut cmd) = test_renderer();
        let mut fd = RefDef {
            rdflags: RDF_NOWORLDMODEL,
            ..view_over_floor()
        };
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        assert!(r.backend.draws().is_empty());

        fd.blend = [1.0, 0.0, 0.0, 0.3];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let draws = r.backend.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].0, Primitive::Quads);
        assert_eq!(draws[0].1[0].rgba, [1.0, 0.0, 0.0, 0.3]);
    }

    #[test]
    fn test_sprite_frame_wraps() {
        let (mut r, mut cmd) = test_renderer();
        let sprite = SpriteModel {
            frames: vec![
                SpriteFrame {
                    width: 10,
                    height: 10,
                    origin_x: 5,
                    origin_y: 5,
                    image: None,
                },
                SpriteFrame {
                    width: 20,
                    height: 20,
                    origin_x: 10,
                    origin_y: 10,
                    image: None,
                },
            ],
        };
        let id = r.register_model(Model::new("sprites/s.sp2", ModelKind::Sprite(sprite)));
        let mut fd = RefDef {
            rdflags: RDF_NOWORLDMODEL,
            fov_x: 90.0,
            fov_y: 90.0,
            width: 640,
            height: 480,
            ..Default::default()
        };
        fd.entities = vec![Entity {
            model: Some(id),
            frame: 3,
            origin: [100.0, 0.0, 0.0],
            ..Default::default()
        }];
        r.console.set_developer(true);
        r.console.take_output();
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let draws = r.backend.draws();
        let (prim, quad) = draws[0];
        assert_eq!(prim, Primitive::Quads);
        // frame 1: 10 units below the origin
        assert_near(quad[0].xyz[2], -10.0);
        assert_eq!(quad[0].st, [0.0, 1.0]);

        // no image: drawn with the placeholder, and reported
        let notexture = r.notexture.map(|i| r.images.read().texnum(i));
        assert!(r.backend.calls.contains(&BackendCall::BindTexture(notexture.unwrap())));
        assert!(r
            .console
            .take_output()
            .contains("R_DrawSpriteModel: sprites/s.sp2 frame 1 has no image\n"));
    }

    #[test]
    fn test_beam_strip() {
        let (mut r, mut cmd) = test_renderer();
        let mut fd = RefDef {
            rdflags: RDF_NOWORLDMODEL,
            ..view_over_floor()
        };
        fd.entities = vec![Entity {
            flags: RF_BEAM,
            origin: [0.0, 0.0, 0.0],
            oldorigin: [100.0, 0.0, 0.0],
            frame: 8,
            skinnum: 64,
            alpha: 0.3,
            ..Default::default()
        }];
        r.render_frame(&mut cmd.cvars, &fd).unwrap();
        let draws = r.backend.draws();
        let (prim, strip) = draws[0];
        assert_eq!(prim, Primitive::TriangleStrip);
        assert_eq!(strip.len(), NUM_BEAM_SEGS * 4);
        // radius frame / 2 around the beam axis
        let v = strip[0].xyz;
        assert_near((v[1] * v[1] + v[2] * v[2]).sqrt(), 4.0);
        assert_near(strip[1].xyz[0] - strip[0].xyz[0], 100.0);
        assert_near(strip[0].rgba[0], 64.0 / 255.0);
        assert_eq!(strip[0].rgba[3], 0.3);
    }

    #[test]
    fn test_ztrick_alternates_depth_range() {
        let (mut r, mut cmd) = test_renderer();
        cmd.cvars.set("gl_ztrick", "1");
        r.begin_frame(&mut cmd.cvars, 0.0);
        assert_eq!((r.depth_min, r.depth_max), (0.0, 0.49999));
        r.begin_frame(&mut cmd.cvars, 0.0);
        assert_eq!((r.depth_min, r.depth_max), (1.0, 0.5));
        assert!(r.backend.calls.contains(&BackendCall::DepthFunc(DepthFunc::GreaterEqual)));
    }

    #[test]
    fn test_begin_frame_applies_modified_cvars() {
        let (mut r, mut cmd) = test_renderer();
        cmd.cvars.set("vid_gamma", "0.8");
        cmd.cvars.set("gl_drawbuffer", "gl_front");
        cmd.cvars.set("gl_texturemode", "GL_NEAREST");
        r.begin_frame(&mut cmd.cvars, 0.0);
        let calls = r.backend.take_calls();
        assert!(calls.contains(&BackendCall::Gamma(0.8)));
        assert!(calls.contains(&BackendCall::DrawBuffer(DrawBuffer::Front)));
        assert!(calls.contains(&BackendCall::TextureMode(TextureMode::Nearest)));

        // applied once
        r.begin_frame(&mut cmd.cvars, 0.0);
        assert!(!r.backend.calls.iter().any(|c| matches!(c, BackendCall::Gamma(_))));

        cmd.cvars.set("gl_texturemode", "GL_BOGUS");
        r.console.take_output();
        r.begin_frame(&mut cmd.cvars, 0.0);
        assert_eq!(r.console.take_output(), "bad filter name\n");
    }

    #[test]
    fn test_init_and_shutdown_commands() {
        let (mut r, mut cmd) = test_renderer();
        for name in ["imagelist", "modellist", "gl_strings"] {
            assert!(cmd.exists(name), "{}", name);
        }
        r.set_world_model(floor_world());

        cmd.console.take_output();
        cmd.execute_string("gl_strings");
        assert!(cmd.console.take_output().starts_with("GL_VENDOR: q2core\nGL_RENDERER: recording\n"));

        cmd.execute_string("modellist");
        let out = cmd.console.take_output();
        assert!(out.starts_with("Loaded models:\n"));
        assert!(out.contains(" : maps/test.bsp\n"));

        cmd.execute_string("imagelist");
        assert!(cmd.console.take_output().contains("***particle***"));

        r.shutdown(&mut cmd);
        for name in ["imagelist", "modellist", "gl_strings"] {
            assert!(!cmd.exists(name), "{}", name);
        }
        assert!(r.world().is_none());
        assert!(r.images.read().is_empty());
    }

    #[test]
    fn test_find_image_uses_loader_once() {
        let (mut r, _cmd) = test_renderer();
        assert_eq!(r.find_image("pics/missing.pcx", ImageType::Pic), None);

        r.set_image_loader(Box::new(|name: &str| {
            (name == "pics/a.pcx").then(|| crate::r_image::LoadedImage {
                width: 4,
                height: 2,
                rgba: vec![255; 32],
            })
        }));
        let id = r.find_image("pics/a.pcx", ImageType::Pic).unwrap();
        assert_eq!(r.find_image("pics/a.pcx", ImageType::Pic), Some(id));
        assert_eq!(
            r.backend.count(|c| matches!(c, BackendCall::UploadImage { width: 4, height: 2, .. })),
            1
        );
    }
}
