// q_shared.rs: foundational types and math shared by the interpreter, renderer and client

// ============================================================
// Basic types
// ============================================================

pub type Vec3 = [f32; 3];

/// A dynamic light supplied per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DLight {
    pub origin: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// One integrated particle handed to the renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Particle {
    pub origin: Vec3,
    pub color: i32,
    pub alpha: f32,
}

/// lightstyle_t
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightStyle {
    pub rgb: [f32; 3], // 0.0 - 2.0
    pub white: f32,    // highest of rgb
}

impl Default for LightStyle {
    fn default() -> Self {
        Self {
            rgb: [1.0; 3],
            white: 3.0,
        }
    }
}

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// Angle indexes
pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

// ============================================================
// Limits
// ============================================================

pub const MAX_STRING_CHARS: usize = 1024;
pub const MAX_STRING_TOKENS: usize = 80;
pub const MAX_TOKEN_CHARS: usize = 128;

pub const MAX_QPATH: usize = 64;
pub const MAX_LIGHTSTYLES: usize = 256;
pub const MAX_ITEMS: usize = 256;

// ============================================================
// Print levels / error codes
// ============================================================

pub const PRINT_ALL: i32 = 0;
pub const PRINT_DEVELOPER: i32 = 1;
pub const PRINT_ALERT: i32 = 2;

// ============================================================
// Cvar flags
// ============================================================

pub const CVAR_ZERO: i32 = 0;
pub const CVAR_ARCHIVE: i32 = 1;
pub const CVAR_USERINFO: i32 = 2;
pub const CVAR_SERVERINFO: i32 = 4;
pub const CVAR_NOSET: i32 = 8;
pub const CVAR_LATCH: i32 = 16;

// ============================================================
// Contents / surface flags
// ============================================================

pub const CONTENTS_SOLID: i32 = 1;
pub const CONTENTS_WINDOW: i32 = 2;
pub const CONTENTS_WATER: i32 = 32;

pub const SURF_LIGHT: i32 = 0x1;
pub const SURF_SLICK: i32 = 0x2;
pub const SURF_SKY: i32 = 0x4;
pub const SURF_WARP: i32 = 0x8;
pub const SURF_TRANS33: i32 = 0x10;
pub const SURF_TRANS66: i32 = 0x20;
pub const SURF_FLOWING: i32 = 0x40;
pub const SURF_NODRAW: i32 = 0x80;

// ============================================================
// Entity render flags
// ============================================================

pub const RF_MINLIGHT: i32 = 1;
pub const RF_VIEWERMODEL: i32 = 2;
pub const RF_WEAPONMODEL: i32 = 4;
pub const RF_FULLBRIGHT: i32 = 8;
pub const RF_DEPTHHACK: i32 = 16;
pub const RF_TRANSLUCENT: i32 = 32;
pub const RF_FRAMELERP: i32 = 64;
pub const RF_BEAM: i32 = 128;
pub const RF_CUSTOMSKIN: i32 = 256;
pub const RF_GLOW: i32 = 512;
pub const RF_SHELL_RED: i32 = 1024;
pub const RF_SHELL_GREEN: i32 = 2048;
pub const RF_SHELL_BLUE: i32 = 4096;
pub const RF_NOSHADOW: i32 = 0x2000;
pub const RF_IR_VISIBLE: i32 = 0x00008000;
pub const RF_SHELL_DOUBLE: i32 = 0x00010000;
pub const RF_SHELL_HALF_DAM: i32 = 0x00020000;

// refdef flags
pub const RDF_UNDERWATER: i32 = 1;
pub const RDF_NOWORLDMODEL: i32 = 2;
pub const RDF_IRGOGGLES: i32 = 4;

// player_state stats
pub const STAT_SELECTED_ITEM: usize = 12;
pub const MAX_STATS: usize = 32;

// ============================================================
// Plane
// ============================================================

// 0-2 are axial planes
pub const PLANE_X: u8 = 0;
pub const PLANE_Y: u8 = 1;
pub const PLANE_Z: u8 = 2;
// 3-5 are non-axial planes snapped to the nearest
pub const PLANE_ANYX: u8 = 3;
pub const PLANE_ANYY: u8 = 4;
pub const PLANE_ANYZ: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CPlane {
    pub normal: Vec3,
    pub dist: f32,
    pub plane_type: u8, // for fast side tests
    pub signbits: u8,   // signx + (signy<<1) + (signz<<2)
}

impl CPlane {
    /// Builds a plane and fills in `plane_type` and `signbits` from the normal.
    pub fn new(normal: Vec3, dist: f32) -> Self {
        let plane_type = if normal[0] == 1.0 {
            PLANE_X
        } else if normal[1] == 1.0 {
            PLANE_Y
        } else if normal[2] == 1.0 {
            PLANE_Z
        } else {
            PLANE_ANYZ
        };
        Self {
            normal,
            dist,
            plane_type,
            signbits: signbits_for_plane(&normal),
        }
    }

    /// Signed distance from `p` to the plane. Axial planes skip the dot product.
    #[inline]
    pub fn distance(&self, p: &Vec3) -> f32 {
        match self.plane_type {
            PLANE_X | PLANE_Y | PLANE_Z => p[self.plane_type as usize] - self.dist,
            _ => dot_product(p, &self.normal) - self.dist,
        }
    }
}

pub fn signbits_for_plane(normal: &Vec3) -> u8 {
    let mut bits = 0u8;
    for (j, n) in normal.iter().enumerate() {
        if *n < 0.0 {
            bits |= 1 << j;
        }
    }
    bits
}

// ============================================================
// MATHLIB: vector operations
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Normalize in place, returns original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length != 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

// ============================================================
// Matrix / angle functions
// ============================================================

pub fn r_concat_rotations(in1: &[[f32; 3]; 3], in2: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = in1[i][0] * in2[0][j] + in1[i][1] * in2[1][j] + in1[i][2] * in2[2][j];
        }
    }
    out
}

/// Returns (forward, right, up) for the given pitch/yaw/roll angles in degrees.
pub fn angle_vectors(angles: &Vec3) -> (Vec3, Vec3, Vec3) {
    let (sy, cy) = angles[YAW].to_radians().sin_cos();
    let (sp, cp) = angles[PITCH].to_radians().sin_cos();
    let (sr, cr) = angles[ROLL].to_radians().sin_cos();

    let forward = [cp * cy, cp * sy, -sp];
    let right = [
        -sr * sp * cy + -cr * -sy,
        -sr * sp * sy + -cr * cy,
        -sr * cp,
    ];
    let up = [
        cr * sp * cy + -sr * -sy,
        cr * sp * sy + -sr * cy,
        cr * cp,
    ];
    (forward, right, up)
}

/// Returns 1 (front), 2 (back), or 3 (crossing) for a box vs. plane test.
pub fn box_on_plane_side(emins: &Vec3, emaxs: &Vec3, p: &CPlane) -> i32 {
    // fast axial cases
    if p.plane_type < 3 {
        let t = p.plane_type as usize;
        if p.dist <= emins[t] {
            return 1;
        }
        if p.dist >= emaxs[t] {
            return 2;
        }
        return 3;
    }

    // general case: signbits pick the nearest and farthest corners
    let mut near = [0.0f32; 3];
    let mut far = [0.0f32; 3];
    for j in 0..3 {
        if p.signbits & (1 << j) != 0 {
            far[j] = emins[j];
            near[j] = emaxs[j];
        } else {
            far[j] = emaxs[j];
            near[j] = emins[j];
        }
    }
    let dist1 = dot_product(&p.normal, &far);
    let dist2 = dot_product(&p.normal, &near);

    let mut sides = 0;
    if dist1 >= p.dist {
        sides = 1;
    }
    if dist2 < p.dist {
        sides |= 2;
    }
    sides
}

pub fn project_point_on_plane(p: &Vec3, normal: &Vec3) -> Vec3 {
    let inv_denom = 1.0 / dot_product(normal, normal);
    let d = dot_product(normal, p) * inv_denom;
    let n = vector_scale(normal, inv_denom);
    vector_ma(p, -d, &n)
}

/// Find a vector perpendicular to `src` (assumed normalized).
pub fn perpendicular_vector(src: &Vec3) -> Vec3 {
    let mut min_elem: f32 = 1.0;
    let mut pos = 0;
    for (i, c) in src.iter().enumerate() {
        if c.abs() < min_elem {
            pos = i;
            min_elem = c.abs();
        }
    }
    let mut tempvec = [0.0f32; 3];
    tempvec[pos] = 1.0;

    let mut dst = project_point_on_plane(&tempvec, src);
    vector_normalize(&mut dst);
    dst
}

pub fn rotate_point_around_vector(dir: &Vec3, point: &Vec3, degrees: f32) -> Vec3 {
    let vf = *dir;
    let vr = perpendicular_vector(dir);
    let vup = cross_product(&vr, &vf);

    let m = [
        [vr[0], vup[0], vf[0]],
        [vr[1], vup[1], vf[1]],
        [vr[2], vup[2], vf[2]],
    ];
    let im = [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ];

    let (s, c) = degrees.to_radians().sin_cos();
    let zrot = [[c, s, 0.0], [-s, c, 0.0], [0.0, 0.0, 1.0]];

    let rot = r_concat_rotations(&r_concat_rotations(&m, &zrot), &im);

    let mut dst = [0.0f32; 3];
    for i in 0..3 {
        dst[i] = rot[i][0] * point[0] + rot[i][1] * point[1] + rot[i][2] * point[2];
    }
    dst
}

// ============================================================
// String comparison (case-insensitive)
// ============================================================

pub fn q_stricmp(s1: &str, s2: &str) -> std::cmp::Ordering {
    s1.bytes()
        .map(|b| b.to_ascii_lowercase())
        .cmp(s2.bytes().map(|b| b.to_ascii_lowercase()))
}

// ============================================================
// Token parser (COM_Parse equivalent)
// ============================================================

/// Parse one whitespace-delimited token from `data`, handling // comments
/// and "quoted strings".
///
/// Returns `(token, Some(rest))` when a token was read, where `rest` starts
/// right after it, and `(String::new(), None)` when the data ran out first.
/// A word of `MAX_TOKEN_CHARS` or more comes back empty.
pub fn com_parse(data: &str) -> (String, Option<&str>) {
    let bytes = data.as_bytes();
    let mut pos = 0;

    // skip whitespace and comments
    loop {
        while pos < bytes.len() && bytes[pos] <= b' ' {
            pos += 1;
        }
        if pos >= bytes.len() {
            return (String::new(), None);
        }
        if bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'/') {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        break;
    }

    let mut token: Vec<u8> = Vec::new();

    // handle quoted strings specially
    if bytes[pos] == b'"' {
        pos += 1;
        while pos < bytes.len() && bytes[pos] != b'"' {
            if token.len() < MAX_TOKEN_CHARS {
                token.push(bytes[pos]);
            }
            pos += 1;
        }
        if pos < bytes.len() {
            pos += 1;
        }
        return (String::from_utf8_lossy(&token).into_owned(), Some(&data[pos..]));
    }

    // parse a regular word
    while pos < bytes.len() && bytes[pos] > b' ' {
        if token.len() < MAX_TOKEN_CHARS {
            token.push(bytes[pos]);
        }
        pos += 1;
    }
    if token.len() == MAX_TOKEN_CHARS {
        token.clear();
    }

    (String::from_utf8_lossy(&token).into_owned(), Some(&data[pos..]))
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_near(a: &Vec3, b: &Vec3) {
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_dot_and_cross() {
        assert_eq!(dot_product(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
        assert_eq!(cross_product(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_vector_normalize() {
        let mut v = [3.0, 0.0, 4.0];
        let len = vector_normalize(&mut v);
        assert_eq!(len, 5.0);
        assert_vec_near(&v, &[0.6, 0.0, 0.8]);

        let mut zero = [0.0; 3];
        assert_eq!(vector_normalize(&mut zero), 0.0);
        assert_eq!(zero, [0.0; 3]);
    }

    #[test]
    fn test_plane_new_classifies_axial() {
        let p = CPlane::new([0.0, 0.0, 1.0], 8.0);
        assert_eq!(p.plane_type, PLANE_Z);
        assert_eq!(p.distance(&[5.0, 5.0, 10.0]), 2.0);

        let q = CPlane::new([-0.6, 0.8, 0.0], 0.0);
        assert_eq!(q.plane_type, PLANE_ANYZ);
        assert_eq!(q.signbits, 1);
    }

    #[test]
    fn test_box_on_plane_side_axial() {
        let plane = CPlane::new([1.0, 0.0, 0.0], 5.0);
        assert_eq!(box_on_plane_side(&[-1.0; 3], &[1.0; 3], &plane), 2);
        assert_eq!(box_on_plane_side(&[10.0; 3], &[20.0; 3], &plane), 1);
        assert_eq!(box_on_plane_side(&[-10.0; 3], &[10.0; 3], &plane), 3);
    }

    #[test]
    fn test_box_on_plane_side_general_signbits() {
        let mut n = [-1.0, -1.0, 1.0];
        vector_normalize(&mut n);
        let plane = CPlane::new(n, 0.0);
        assert_eq!(plane.signbits, 3);

        // far along the normal
        let c = vector_scale(&n, 100.0);
        let mins = vector_subtract(&c, &[1.0; 3]);
        let maxs = vector_add(&c, &[1.0; 3]);
        assert_eq!(box_on_plane_side(&mins, &maxs, &plane), 1);

        let c = vector_scale(&n, -100.0);
        let mins = vector_subtract(&c, &[1.0; 3]);
        let maxs = vector_add(&c, &[1.0; 3]);
        assert_eq!(box_on_plane_side(&mins, &maxs, &plane), 2);

        assert_eq!(box_on_plane_side(&[-1.0; 3], &[1.0; 3], &plane), 3);
    }

    #[test]
    fn test_angle_vectors_identity() {
        let (f, r, u) = angle_vectors(&[0.0, 0.0, 0.0]);
        assert_vec_near(&f, &[1.0, 0.0, 0.0]);
        assert_vec_near(&r, &[0.0, -1.0, 0.0]);
        assert_vec_near(&u, &[0.0, 0.0, 1.0]);

        let (f, _, _) = angle_vectors(&[0.0, 90.0, 0.0]);
        assert_vec_near(&f, &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_rotate_point_around_vector() {
        // a quarter turn about +z moves +x onto +y
        let out = rotate_point_around_vector(&[0.0, 0.0, 1.0], &[1.0, 0.0, 0.0], 90.0);
        assert_vec_near(&out, &[0.0, 1.0, 0.0]);

        let back = rotate_point_around_vector(&[0.0, 0.0, 1.0], &out, -90.0);
        assert_vec_near(&back, &[1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_perpendicular_vector() {
        let src = [0.0, 0.0, 1.0];
        let p = perpendicular_vector(&src);
        assert!(dot_product(&p, &src).abs() < 1e-6);
        assert!((vector_length(&p) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_com_parse() {
        let (tok, rest) = com_parse("  hello world");
        assert_eq!(tok, "hello");
        assert_eq!(rest, Some(" world"));

        let (tok, rest) = com_parse("\"quoted string\" tail");
        assert_eq!(tok, "quoted string");
        assert_eq!(rest, Some(" tail"));

        // last token still reports the (empty) remainder
        let (tok, rest) = com_parse("last");
        assert_eq!(tok, "last");
        assert_eq!(rest, Some(""));

        let (tok, rest) = com_parse("   ");
        assert_eq!(tok, "");
        assert_eq!(rest, None);

        let (tok, rest) = com_parse("// comment only\nnext");
        assert_eq!(tok, "next");
        assert_eq!(rest, Some(""));
    }

    #[test]
    fn test_com_parse_long_word_is_dropped() {
        let long = "x".repeat(MAX_TOKEN_CHARS + 10);
        let (tok, rest) = com_parse(&long);
        assert_eq!(tok, "");
        assert_eq!(rest, Some(""));
    }

    #[test]
    fn test_q_stricmp() {
        assert_eq!(q_stricmp("Echo", "echo"), std::cmp::Ordering::Equal);
        assert_eq!(q_stricmp("a", "B"), std::cmp::Ordering::Less);
    }
}
