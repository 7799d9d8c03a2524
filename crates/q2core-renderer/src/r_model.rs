// r_model.rs: in-memory map and model data
//
// Loaders (BSP, MD2, SP2) are external; they hand the renderer these flat
// arrays. Tree links are indices into the owning arrays, never pointers.

use q2core_common::common::Console;
use q2core_common::q_shared::{CPlane, Vec3};

use crate::r_image::ImageId;

pub const MAXLIGHTMAPS: usize = 4;
pub const MAX_MD2SKINS: usize = 32;

pub const SIDE_FRONT: i32 = 0;
pub const SIDE_BACK: i32 = 1;

pub const SURF_PLANEBACK: i32 = 2;
pub const SURF_DRAWSKY: i32 = 4;
pub const SURF_DRAWTURB: i32 = 0x10;
pub const SURF_DRAWBACKGROUND: i32 = 0x40;
pub const SURF_UNDERWATER: i32 = 0x80;

/// Internal nodes carry this in place of leaf contents.
pub const CONTENTS_NODE: i32 = -1;

pub type ModelId = usize;

// ============================================================
// BRUSH MODELS
// ============================================================

/// Child link of a BSP node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Node(usize),
    Leaf(usize),
}

#[derive(Debug, Clone, Default)]
pub struct MNode {
    pub plane: usize,
    pub children: [Option<NodeRef>; 2],
    /// for bounding box culling
    pub minmaxs: [f32; 6],
    pub parent: Option<usize>,
    pub visframe: i32,
    pub firstsurface: usize,
    pub numsurfaces: usize,
}

impl MNode {
    pub fn child(&self, side: usize) -> Option<NodeRef> {
        self.children[side]
    }
}

#[derive(Debug, Clone, Default)]
pub struct MLeaf {
    pub contents: i32,
    pub cluster: i32,
    pub area: i32,
    pub minmaxs: [f32; 6],
    pub parent: Option<usize>,
    pub visframe: i32,
    /// Range into `WorldModel::marksurfaces`.
    pub firstmarksurface: usize,
    pub nummarksurfaces: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub flags: i32,
    pub image: Option<ImageId>,
}

#[derive(Debug, Clone)]
pub struct MSurface {
    pub plane: usize,
    pub flags: i32,
    pub texinfo: usize,

    pub texturemins: [i32; 2],
    pub extents: [i32; 2],

    pub visframe: i32,

    pub dlightframe: i32,
    pub dlightbits: u32,

    pub styles: [u8; MAXLIGHTMAPS],
    /// values currently used in lightmap
    pub cached_light: [f32; MAXLIGHTMAPS],
    /// Byte offset into `WorldModel::lightdata`; `None` for unlit surfaces.
    pub samples: Option<usize>,
}

impl Default for MSurface {
    fn default() -> Self {
        Self {
            plane: 0,
            flags: 0,
            texinfo: 0,
            texturemins: [0; 2],
            extents: [0; 2],
            visframe: 0,
            dlightframe: 0,
            dlightbits: 0,
            styles: [255; MAXLIGHTMAPS],
            cached_light: [0.0; MAXLIGHTMAPS],
            samples: None,
        }
    }
}

impl MSurface {
    /// Lightmap dimensions in luxels.
    pub fn lightmap_size(&self) -> (usize, usize) {
        (
            ((self.extents[0] >> 4) + 1).max(0) as usize,
            ((self.extents[1] >> 4) + 1).max(0) as usize,
        )
    }

    /// Number of light styles in use, up to the first 255 terminator.
    pub fn num_maps(&self) -> usize {
        self.styles.iter().take_while(|&&s| s != 255).count()
    }
}

/// A loaded BSP map. Node 0 is the root.
#[derive(Debug, Clone, Default)]
pub struct WorldModel {
    pub name: String,
    pub planes: Vec<CPlane>,
    pub nodes: Vec<MNode>,
    pub leafs: Vec<MLeaf>,
    pub surfaces: Vec<MSurface>,
    pub marksurfaces: Vec<usize>,
    pub texinfo: Vec<MTexInfo>,
    pub lightdata: Vec<u8>,
    /// Decompressed PVS rows, one per cluster. Empty means no vis data.
    pub vis: Vec<Vec<u8>>,
    pub submodels: Vec<BrushModel>,
}

impl WorldModel {
    pub fn root(&self) -> NodeRef {
        if self.nodes.is_empty() {
            NodeRef::Leaf(0)
        } else {
            NodeRef::Node(0)
        }
    }

    pub fn has_lightdata(&self) -> bool {
        !self.lightdata.is_empty()
    }

    /// Mod_PointInLeaf
    pub fn point_in_leaf(&self, p: &Vec3) -> Option<usize> {
        let mut node = self.root();
        loop {
            match node {
                NodeRef::Leaf(i) => return (i < self.leafs.len()).then_some(i),
                NodeRef::Node(i) => {
                    let n = self.nodes.get(i)?;
                    let plane = self.planes.get(n.plane)?;
                    let side = if plane.distance(p) > 0.0 { 0 } else { 1 };
                    node = n.children[side]?;
                }
            }
        }
    }

    /// The visibility row for `cluster`, or `None` when everything is visible.
    pub fn cluster_pvs(&self, cluster: i32) -> Option<&[u8]> {
        if cluster < 0 {
            return None;
        }
        self.vis.get(cluster as usize).map(Vec::as_slice)
    }

    /// Light samples for a surface, starting at its first style.
    pub fn samples(&self, surf: &MSurface) -> Option<&[u8]> {
        surf.samples.and_then(|ofs| self.lightdata.get(ofs..))
    }

    /// Fills the `parent` links from the child links.
    pub fn set_parents(&mut self) {
        for leaf in &mut self.leafs {
            leaf.parent = None;
        }
        for i in 0..self.nodes.len() {
            for child in self.nodes[i].children.into_iter().flatten() {
                match child {
                    NodeRef::Node(c) => {
                        if let Some(n) = self.nodes.get_mut(c) {
                            n.parent = Some(i);
                        }
                    }
                    NodeRef::Leaf(c) => {
                        if let Some(l) = self.leafs.get_mut(c) {
                            l.parent = Some(i);
                        }
                    }
                }
            }
        }
        if let Some(root) = self.nodes.first_mut() {
            root.parent = None;
        }
    }

    /// Rough resident size, as reported by `modellist`.
    pub fn size_bytes(&self) -> usize {
        use std::mem::size_of;
        self.planes.len() * size_of::<CPlane>()
            + self.nodes.len() * size_of::<MNode>()
            + self.leafs.len() * size_of::<MLeaf>()
            + self.surfaces.len() * size_of::<MSurface>()
            + self.marksurfaces.len() * size_of::<usize>()
            + self.texinfo.len() * size_of::<MTexInfo>()
            + self.lightdata.len()
            + self.vis.iter().map(Vec::len).sum::<usize>()
    }
}

/// An inline brush model: a range of the world's surfaces under its own
/// head node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BrushModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub headnode: usize,
    pub firstface: usize,
    pub numfaces: usize,
}

// ============================================================
// ALIAS MODELS
// ============================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriVertex {
    pub v: [u8; 3],
    pub lightnormalindex: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AliasFrame {
    pub name: String,
    pub scale: Vec3,
    pub translate: Vec3,
    pub verts: Vec<TriVertex>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlCmdVertex {
    pub s: f32,
    pub t: f32,
    pub index: usize,
}

/// One run of the precomputed strip/fan command list.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCmd {
    Strip(Vec<GlCmdVertex>),
    Fan(Vec<GlCmdVertex>),
}

#[derive(Debug, Clone, Default)]
pub struct AliasModel {
    pub frames: Vec<AliasFrame>,
    pub glcmds: Vec<GlCmd>,
    pub num_xyz: usize,
    pub num_tris: usize,
    pub skins: Vec<Option<ImageId>>,
}

// ============================================================
// SPRITE MODELS
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpriteFrame {
    pub width: i32,
    pub height: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub image: Option<ImageId>,
}

#[derive(Debug, Clone, Default)]
pub struct SpriteModel {
    pub frames: Vec<SpriteFrame>,
}

// ============================================================
// Whole models
// ============================================================

#[derive(Debug, Clone)]
pub enum ModelKind {
    Brush(BrushModel),
    Alias(AliasModel),
    Sprite(SpriteModel),
    /// The loader could not identify the data.
    Bad,
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub kind: ModelKind,
    pub extradatasize: usize,
}

impl Model {
    pub fn new(name: &str, kind: ModelKind) -> Self {
        let extradatasize = match &kind {
            ModelKind::Brush(_) => std::mem::size_of::<BrushModel>(),
            ModelKind::Alias(a) => {
                a.frames
                    .iter()
                    .map(|f| f.verts.len() * std::mem::size_of::<TriVertex>() + std::mem::size_of::<AliasFrame>())
                    .sum::<usize>()
                    + a.glcmds
                        .iter()
                        .map(|c| match c {
                            GlCmd::Strip(v) | GlCmd::Fan(v) => v.len() * std::mem::size_of::<GlCmdVertex>(),
                        })
                        .sum::<usize>()
            }
            ModelKind::Sprite(s) => s.frames.len() * std::mem::size_of::<SpriteFrame>(),
            ModelKind::Bad => 0,
        };
        Self {
            name: name.to_string(),
            kind,
            extradatasize,
        }
    }
}

/// Every model the renderer knows about, listed by `modellist`.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: Vec<std::sync::Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model, replacing any previous model of the same name.
    pub fn register(&mut self, model: Model) -> ModelId {
        if let Some(i) = self.models.iter().position(|m| m.name == model.name) {
            self.models[i] = std::sync::Arc::new(model);
            return i;
        }
        self.models.push(std::sync::Arc::new(model));
        self.models.len() - 1
    }

    pub fn get(&self, id: ModelId) -> Option<std::sync::Arc<Model>> {
        self.models.get(id).cloned()
    }

    pub fn find(&self, name: &str) -> Option<ModelId> {
        self.models.iter().position(|m| m.name == name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter().map(|m| m.as_ref())
    }

    pub fn clear(&mut self) {
        self.models.clear();
    }

    /// The `modellist` command.
    pub fn list(&self, con: &Console) {
        let mut total = 0;
        con.printf("Loaded models:\n");
        for m in self.iter().filter(|m| !m.name.is_empty()) {
            con.printf(&format!("{:8} : {}\n", m.extradatasize, m.name));
            total += m.extradatasize;
        }
        con.printf(&format!("Total resident: {}\n", total));
    }
}
