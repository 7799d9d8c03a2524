// r_matrix.rs: column-major 4x4 matrices for the fixed-function style transforms

pub type Mat4 = [f32; 16];

pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// `a * b`, so `b` is applied to vertices first.
pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0f32; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = sum;
        }
    }
    out
}

pub fn translate(m: &Mat4, x: f32, y: f32, z: f32) -> Mat4 {
    let mut t = IDENTITY;
    t[12] = x;
    t[13] = y;
    t[14] = z;
    multiply(m, &t)
}

pub fn scale(m: &Mat4, x: f32, y: f32, z: f32) -> Mat4 {
    let mut s = IDENTITY;
    s[0] = x;
    s[5] = y;
    s[10] = z;
    multiply(m, &s)
}

/// Rotation by `degrees` about the axis (x, y, z), as glRotatef.
pub fn rotate(m: &Mat4, degrees: f32, x: f32, y: f32, z: f32) -> Mat4 {
    let len = (x * x + y * y + z * z).sqrt();
    if len == 0.0 {
        return *m;
    }
    let (x, y, z) = (x / len, y / len, z / len);
    let (s, c) = degrees.to_radians().sin_cos();
    let ic = 1.0 - c;

    let r = [
        x * x * ic + c,
        y * x * ic + z * s,
        x * z * ic - y * s,
        0.0,
        x * y * ic - z * s,
        y * y * ic + c,
        y * z * ic + x * s,
        0.0,
        x * z * ic + y * s,
        y * z * ic - x * s,
        z * z * ic + c,
        0.0,
        0.0,
        0.0,
        0.0,
        1.0,
    ];
    multiply(m, &r)
}

pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, znear: f64, zfar: f64) -> Mat4 {
    let mut m = [0.0f32; 16];
    m[0] = (2.0 * znear / (right - left)) as f32;
    m[5] = (2.0 * znear / (top - bottom)) as f32;
    m[8] = ((right + left) / (right - left)) as f32;
    m[9] = ((top + bottom) / (top - bottom)) as f32;
    m[10] = (-(zfar + znear) / (zfar - znear)) as f32;
    m[11] = -1.0;
    m[14] = (-(2.0 * zfar * znear) / (zfar - znear)) as f32;
    m
}

pub fn ortho(left: f32, right: f32, bottom: f32, top: f32, znear: f32, zfar: f32) -> Mat4 {
    let mut m = IDENTITY;
    m[0] = 2.0 / (right - left);
    m[5] = 2.0 / (top - bottom);
    m[10] = -2.0 / (zfar - znear);
    m[12] = -(right + left) / (right - left);
    m[13] = -(top + bottom) / (top - bottom);
    m[14] = -(zfar + znear) / (zfar - znear);
    m
}

pub fn transform_point(m: &Mat4, p: &[f32; 3]) -> [f32; 3] {
    [
        m[0] * p[0] + m[4] * p[1] + m[8] * p[2] + m[12],
        m[1] * p[0] + m[5] * p[1] + m[9] * p[2] + m[13],
        m[2] * p[0] + m[6] * p[1] + m[10] * p[2] + m[14],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::assert_vec_near;

    #[test]
    fn test_rotate_z_quarter_turn() {
        let m = rotate(&IDENTITY, 90.0, 0.0, 0.0, 1.0);
        assert_vec_near(transform_point(&m, &[1.0, 0.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_translate_then_scale_order() {
        let m = scale(&translate(&IDENTITY, 10.0, 0.0, 0.0), 2.0, 2.0, 2.0);
        // scale applies first
        assert_vec_near(transform_point(&m, &[1.0, 1.0, 1.0]), [12.0, 2.0, 2.0]);
    }

    #[test]
    fn test_ortho_maps_corners() {
        let m = ortho(0.0, 640.0, 480.0, 0.0, -99999.0, 99999.0);
        assert_vec_near(transform_point(&m, &[0.0, 0.0, 0.0]), [-1.0, 1.0, 0.0]);
        assert_vec_near(transform_point(&m, &[640.0, 480.0, 0.0]), [1.0, -1.0, 0.0]);
    }
}
