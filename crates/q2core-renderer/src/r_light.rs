// r_light.rs: point light sampling, dynamic light marking and lightmap building

use q2core_common::q_shared::{
    dot_product, vector_length, vector_ma, vector_scale, vector_subtract, DLight, LightStyle, Vec3,
    SURF_SKY, SURF_TRANS33, SURF_TRANS66, SURF_WARP,
};

use crate::r_backend::Vertex;
use crate::r_model::{
    MSurface, NodeRef, WorldModel, MAXLIGHTMAPS, SURF_DRAWSKY, SURF_DRAWTURB, SURF_PLANEBACK,
};
use crate::RendererError;

pub const DLIGHT_CUTOFF: f32 = 64.0;

/// Largest lightmap, in luxels, a single surface may have.
pub const BLOCKLIGHTS_MAX: usize = 34 * 34;

/// Dynamic lights are tracked in a 32-bit mask per surface.
pub const MAX_DLIGHTS: usize = 32;

/// The per-frame inputs every light query needs.
#[derive(Debug, Clone, Copy)]
pub struct LightParams<'a> {
    pub dlights: &'a [DLight],
    pub lightstyles: &'a [LightStyle],
    pub modulate: f32,
}

impl LightParams<'_> {
    fn style(&self, style: u8) -> LightStyle {
        self.lightstyles.get(style as usize).copied().unwrap_or_default()
    }
}

/// Outcome of a light trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightHit {
    /// The trace never crossed a lit surface.
    Miss,
    /// Hit a surface without light samples.
    Unlit,
    Lit(Vec3),
}

// ============================================================
// Point sampling
// ============================================================

/// Traces `start` to `end` through the tree and samples the first surface
/// crossed. The front half of a split segment is searched before the back.
/// `lightspot` receives the impact point of the deepest crossing checked.
pub fn recursive_light_point(
    world: &WorldModel,
    node: Option<NodeRef>,
    start: &Vec3,
    end: &Vec3,
    params: &LightParams,
    lightspot: &mut Vec3,
) -> LightHit {
    let Some(NodeRef::Node(index)) = node else {
        return LightHit::Miss; // didn't hit anything
    };
    let Some(n) = world.nodes.get(index) else {
        return LightHit::Miss;
    };
    let Some(plane) = world.planes.get(n.plane) else {
        return LightHit::Miss;
    };

    // calculate mid point
    let front = dot_product(start, &plane.normal) - plane.dist;
    let back = dot_product(end, &plane.normal) - plane.dist;
    let side = (front < 0.0) as usize;

    if (back < 0.0) == (side == 1) {
        return recursive_light_point(world, n.child(side), start, end, params, lightspot);
    }

    let frac = front / (front - back);
    let mid = [
        start[0] + (end[0] - start[0]) * frac,
        start[1] + (end[1] - start[1]) * frac,
        start[2] + (end[2] - start[2]) * frac,
    ];

    // go down front side
    let r = recursive_light_point(world, n.child(side), start, &mid, params, lightspot);
    if r != LightHit::Miss {
        return r;
    }

    // check for impact on this node
    *lightspot = mid;

    for surf in world.surfaces.iter().skip(n.firstsurface).take(n.numsurfaces) {
        if surf.flags & (SURF_DRAWTURB | SURF_DRAWSKY) != 0 {
            continue; // no lightmaps
        }
        let Some(tex) = world.texinfo.get(surf.texinfo) else {
            continue;
        };

        let s = (dot_product(&mid, &texvec(&tex.vecs[0])) + tex.vecs[0][3]) as i32;
        let t = (dot_product(&mid, &texvec(&tex.vecs[1])) + tex.vecs[1][3]) as i32;

        if s < surf.texturemins[0] || t < surf.texturemins[1] {
            continue;
        }

        let ds = s - surf.texturemins[0];
        let dt = t - surf.texturemins[1];

        if ds > surf.extents[0] || dt > surf.extents[1] {
            continue;
        }

        let Some(lightmap) = world.samples(surf) else {
            return LightHit::Unlit;
        };

        let (smax, tmax) = surf.lightmap_size();
        let mut ofs = 3 * ((dt >> 4) as usize * smax + (ds >> 4) as usize);
        let mut color = [0.0f32; 3];

        for &style in surf.styles.iter().take_while(|&&s| s != 255) {
            let Some(texel) = lightmap.get(ofs..ofs + 3) else {
                break;
            };
            let rgb = params.style(style).rgb;
            for i in 0..3 {
                color[i] += texel[i] as f32 * params.modulate * rgb[i] * (1.0 / 255.0);
            }
            ofs += 3 * smax * tmax;
        }
        return LightHit::Lit(color);
    }

    // go down back side
    recursive_light_point(world, n.child(side ^ 1), &mid, end, params, lightspot)
}

/// Light arriving at `p`, plus every dynamic light within reach of
/// `ent_origin`, scaled by `gl_modulate`. Maps without light data are
/// fully lit and ignore dynamic lights.
pub fn light_point(
    world: Option<&WorldModel>,
    ent_origin: &Vec3,
    p: &Vec3,
    params: &LightParams,
    lightspot: &mut Vec3,
) -> Vec3 {
    let Some(world) = world.filter(|w| w.has_lightdata()) else {
        return [1.0, 1.0, 1.0];
    };

    let end = [p[0], p[1], p[2] - 2048.0];

    let mut color = match recursive_light_point(world, Some(world.root()), p, &end, params, lightspot) {
        LightHit::Lit(c) => c,
        LightHit::Unlit | LightHit::Miss => [0.0; 3],
    };

    // add dynamic lights
    for dl in params.dlights {
        let dist = vector_subtract(ent_origin, &dl.origin);
        let add = (dl.intensity - vector_length(&dist)) * (1.0 / 256.0);
        if add > 0.0 {
            color = vector_ma(&color, add, &dl.color);
        }
    }

    vector_scale(&color, params.modulate)
}

fn texvec(v: &[f32; 4]) -> Vec3 {
    [v[0], v[1], v[2]]
}

// ============================================================
// Dynamic light marking
// ============================================================

/// Flags every surface within reach of `light` with `bit`, stamping
/// surfaces first touched this frame with `dlightframecount`.
pub fn mark_lights(world: &mut WorldModel, light: &DLight, bit: u32, node: Option<NodeRef>, dlightframecount: i32) {
    let Some(NodeRef::Node(index)) = node else {
        return;
    };
    let Some(n) = world.nodes.get(index) else {
        return;
    };
    let (children, first, num) = (n.children, n.firstsurface, n.numsurfaces);
    let Some(splitplane) = world.planes.get(n.plane) else {
        return;
    };

    let dist = dot_product(&light.origin, &splitplane.normal) - splitplane.dist;

    if dist > light.intensity - DLIGHT_CUTOFF {
        mark_lights(world, light, bit, children[0], dlightframecount);
        return;
    }
    if dist < -light.intensity + DLIGHT_CUTOFF {
        mark_lights(world, light, bit, children[1], dlightframecount);
        return;
    }

    // mark the polygons
    let planes = &world.planes;
    for surf in world.surfaces.iter_mut().skip(first).take(num) {
        let Some(plane) = planes.get(surf.plane) else {
            continue;
        };
        let dist = dot_product(&light.origin, &plane.normal) - plane.dist;
        let sidebit = if dist >= 0.0 { 0 } else { SURF_PLANEBACK };

        if surf.flags & SURF_PLANEBACK != sidebit {
            continue;
        }

        if surf.dlightframe != dlightframecount {
            surf.dlightbits = 0;
            surf.dlightframe = dlightframecount;
        }
        surf.dlightbits |= bit;
    }

    mark_lights(world, light, bit, children[0], dlightframecount);
    mark_lights(world, light, bit, children[1], dlightframecount);
}

/// Marks light `i` with bit `1 << i` from `headnode`. Lights past the
/// mask width are ignored.
pub fn push_dlights(world: &mut WorldModel, dlights: &[DLight], headnode: NodeRef, dlightframecount: i32) {
    for (i, light) in dlights.iter().enumerate().take(MAX_DLIGHTS) {
        mark_lights(world, light, 1 << i, Some(headnode), dlightframecount);
    }
}

// ============================================================
// Lightmaps
// ============================================================

pub fn set_cache_state(surf: &mut MSurface, lightstyles: &[LightStyle]) {
    for maps in 0..surf.num_maps().min(MAXLIGHTMAPS) {
        let style = lightstyles
            .get(surf.styles[maps] as usize)
            .copied()
            .unwrap_or_default();
        surf.cached_light[maps] = style.white;
    }
}

/// True when any style feeding `surf` changed since its lightmap was built.
pub fn lightstyles_changed(surf: &MSurface, lightstyles: &[LightStyle]) -> bool {
    (0..surf.num_maps().min(MAXLIGHTMAPS)).any(|maps| {
        let white = lightstyles
            .get(surf.styles[maps] as usize)
            .copied()
            .unwrap_or_default()
            .white;
        white != surf.cached_light[maps]
    })
}

/// Combines and scales a surface's lightmaps in floating point before
/// writing RGBA texels.
pub struct LightmapBuilder {
    blocklights: Vec<f32>,
}

impl Default for LightmapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LightmapBuilder {
    pub fn new() -> Self {
        Self {
            blocklights: vec![0.0; BLOCKLIGHTS_MAX * 3],
        }
    }

    /// Writes `smax * tmax` RGBA texels for `surf_index` into `dest`, one
    /// row every `stride` bytes. Dynamic lights are added when the surface
    /// was marked for `framecount`.
    pub fn build(
        &mut self,
        world: &WorldModel,
        surf_index: usize,
        dest: &mut [u8],
        stride: usize,
        params: &LightParams,
        framecount: i32,
    ) -> Result<(), RendererError> {
        let Some(surf) = world.surfaces.get(surf_index) else {
            return Ok(());
        };
        let texflags = world.texinfo.get(surf.texinfo).map_or(0, |t| t.flags);

        if texflags & (SURF_SKY | SURF_TRANS33 | SURF_TRANS66 | SURF_WARP) != 0 {
            return Err(RendererError::NonLitSurface);
        }

        let (smax, tmax) = surf.lightmap_size();
        let size = smax * tmax;
        if size > BLOCKLIGHTS_MAX {
            return Err(RendererError::BadBlocklightsSize);
        }

        let bl = &mut self.blocklights[..size * 3];

        match world.samples(surf) {
            // set to full bright if no light data
            None => bl.fill(255.0),
            Some(lightmap) => {
                let nummaps = surf.num_maps();
                if nummaps != 1 {
                    bl.fill(0.0);
                }

                // add all the lightmaps
                for (m, &style) in surf.styles.iter().take(nummaps).enumerate() {
                    let Some(map) = lightmap.get(m * size * 3..(m + 1) * size * 3) else {
                        if nummaps == 1 {
                            bl.fill(0.0);
                        }
                        break;
                    };
                    let rgb = params.style(style).rgb;
                    let scale = [params.modulate * rgb[0], params.modulate * rgb[1], params.modulate * rgb[2]];
                    let unit = scale == [1.0; 3];

                    for (dst, src) in bl.chunks_exact_mut(3).zip(map.chunks_exact(3)) {
                        for i in 0..3 {
                            let v = if unit { src[i] as f32 } else { src[i] as f32 * scale[i] };
                            if nummaps == 1 {
                                dst[i] = v;
                            } else {
                                dst[i] += v;
                            }
                        }
                    }
                }

                // add all the dynamic lights
                if surf.dlightframe == framecount {
                    add_dynamic_lights(world, surf, params.dlights, bl);
                }
            }
        }

        store_blocklights(bl, smax, tmax, dest, stride);
        Ok(())
    }
}

fn add_dynamic_lights(world: &WorldModel, surf: &MSurface, dlights: &[DLight], bl: &mut [f32]) {
    let (smax, tmax) = surf.lightmap_size();
    let (Some(tex), Some(plane)) = (world.texinfo.get(surf.texinfo), world.planes.get(surf.plane)) else {
        return;
    };

    for (i, dl) in dlights.iter().enumerate().take(MAX_DLIGHTS) {
        if surf.dlightbits & (1 << i) == 0 {
            continue; // not lit by this light
        }

        let fdist = dot_product(&dl.origin, &plane.normal) - plane.dist;
        // rad is now the highest intensity on the plane
        let frad = dl.intensity - fdist.abs();
        if frad < DLIGHT_CUTOFF {
            continue;
        }
        let fminlight = frad - DLIGHT_CUTOFF;

        let impact = vector_ma(&dl.origin, -fdist, &plane.normal);
        let local = [
            dot_product(&impact, &texvec(&tex.vecs[0])) + tex.vecs[0][3] - surf.texturemins[0] as f32,
            dot_product(&impact, &texvec(&tex.vecs[1])) + tex.vecs[1][3] - surf.texturemins[1] as f32,
        ];

        for t in 0..tmax {
            let td = ((local[1] - (t * 16) as f32) as i32).abs();
            for s in 0..smax {
                let sd = ((local[0] - (s * 16) as f32) as i32).abs();
                let dist = (if sd > td { sd + (td >> 1) } else { td + (sd >> 1) }) as f32;
                if dist < fminlight {
                    let texel = &mut bl[(t * smax + s) * 3..(t * smax + s) * 3 + 3];
                    for c in 0..3 {
                        texel[c] += (frad - dist) * dl.color[c];
                    }
                }
            }
        }
    }
}

/// Clamps negatives, then rescales any texel whose brightest channel
/// exceeds 255 so the hue survives. Alpha carries the brightest channel.
fn store_blocklights(bl: &[f32], smax: usize, tmax: usize, dest: &mut [u8], stride: usize) {
    let row_bytes = smax * 4;
    let stride = stride.max(row_bytes);

    for (t, row) in dest.chunks_mut(stride).take(tmax).enumerate() {
        for (s, px) in row.chunks_exact_mut(4).take(smax).enumerate() {
            let src = &bl[(t * smax + s) * 3..(t * smax + s) * 3 + 3];
            let mut r = (src[0] as i32).max(0);
            let mut g = (src[1] as i32).max(0);
            let mut b = (src[2] as i32).max(0);

            let max = r.max(g).max(b);
            let mut a = max;

            if max > 255 {
                let t = 255.0 / max as f32;
                r = (r as f32 * t) as i32;
                g = (g as f32 * t) as i32;
                b = (b as f32 * t) as i32;
                a = (a as f32 * t) as i32;
            }

            px[0] = r as u8;
            px[1] = g as u8;
            px[2] = b as u8;
            px[3] = a as u8;
        }
    }
}

/// Flash-blend halo for one light: a centre vertex pulled toward the
/// viewer, then a black rim of 17 points closing the fan.
pub fn dlight_fan(light: &DLight, vpn: &Vec3, vright: &Vec3, vup: &Vec3) -> Vec<Vertex> {
    let rad = light.intensity * 0.35;
    let mut verts = Vec::with_capacity(18);

    let centre = vector_ma(&light.origin, -rad, vpn);
    verts.push(Vertex::colored(
        centre,
        [light.color[0] * 0.2, light.color[1] * 0.2, light.color[2] * 0.2, 1.0],
    ));

    for i in (0..=16).rev() {
        let a = i as f32 / 16.0 * std::f32::consts::PI * 2.0;
        let mut v = [0.0f32; 3];
        for j in 0..3 {
            v[j] = light.origin[j] + vright[j] * a.cos() * rad + vup[j] * a.sin() * rad;
        }
        verts.push(Vertex::colored(v, [0.0, 0.0, 0.0, 1.0]));
    }
    verts
}
