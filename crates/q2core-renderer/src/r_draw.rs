// r_draw.rs: the 2D layer (console characters, pics, fills and cinematic frames)

use q2core_common::cvar::CvarContext;

use crate::r_backend::{Primitive, RenderBackend, RenderState, Vertex};
use crate::r_image::{ImageId, ImageType};
use crate::r_main::Renderer;
use crate::RendererError;

const WHITE: [f32; 4] = [1.0; 4];

fn textured_quad(x: f32, y: f32, w: f32, h: f32, s1: f32, t1: f32, s2: f32, t2: f32) -> [Vertex; 4] {
    [
        Vertex::new([x, y, 0.0], [s1, t1], WHITE),
        Vertex::new([x + w, y, 0.0], [s2, t1], WHITE),
        Vertex::new([x + w, y + h, 0.0], [s2, t2], WHITE),
        Vertex::new([x, y + h, 0.0], [s1, t2], WHITE),
    ]
}

/// Maps a pic name to its image path: bare names live under `pics/`, a
/// leading slash means the rest is already a full path.
pub fn pic_path(name: &str) -> String {
    match name.strip_prefix(['/', '\\']) {
        Some(rest) => rest.to_string(),
        None => format!("pics/{}.pcx", name),
    }
}

impl<B: RenderBackend> Renderer<B> {
    pub(crate) fn draw_init_local(&mut self, cvars: &mut CvarContext) {
        // don't bilerp characters and crosshairs
        cvars.get(
            "gl_nolerp_list",
            Some("pics/conchars.pcx pics/ch1.pcx pics/ch2.pcx pics/ch3.pcx"),
            0,
        );
        // load console characters
        self.draw_chars = self.find_image("pics/conchars.pcx", ImageType::Pic);
    }

    /// Builds the 8-bit to 24-bit table from a 768 byte rgb palette.
    /// Entry 255 is transparent.
    pub fn draw_get_palette(&mut self, palette: Option<&[u8]>) -> Result<(), RendererError> {
        let Some(pal) = palette.filter(|p| p.len() >= 256 * 3) else {
            tracing::error!(target: "renderer", "no palette");
            return Err(RendererError::MissingPalette);
        };

        for (entry, rgb) in self.d_8to24table.iter_mut().zip(pal.chunks_exact(3)) {
            let (r, g, b) = (rgb[0] as u32, rgb[1] as u32, rgb[2] as u32);
            *entry = (255 << 24) | r | (g << 8) | (b << 16);
        }
        self.d_8to24table[255] &= 0x00ff_ffff; // 255 is transparent
        Ok(())
    }

    fn bind_image(&mut self, image: ImageId) {
        let texnum = self.images.read().texnum(image);
        self.backend.bind_texture(texnum);
    }

    pub fn draw_char(&mut self, x: i32, y: i32, num: i32) {
        self.draw_char_scaled(x, y, num, 1.0);
    }

    /// Draws one 8*8 graphics character with 0 being transparent. It can
    /// be clipped to the top of the screen to allow the console to be
    /// smoothly scrolled off.
    pub fn draw_char_scaled(&mut self, x: i32, y: i32, num: i32, scale: f32) {
        let num = num & 255;

        if num & 127 == 32 {
            return; // space
        }
        if y <= -8 {
            return; // totally off screen
        }
        let Some(chars) = self.draw_chars.or(self.notexture) else {
            return;
        };

        let frow = (num >> 4) as f32 * 0.0625;
        let fcol = (num & 15) as f32 * 0.0625;
        let size = 0.0625;
        let scaled = 8.0 * scale;

        self.bind_image(chars);
        let quad = textured_quad(x as f32, y as f32, scaled, scaled, fcol, frow, fcol + size, frow + size);
        self.backend.draw(Primitive::Quads, &quad);
    }

    pub fn draw_string_scaled(&mut self, x: i32, y: i32, s: &str, scale: f32) {
        self.draw_bytes_scaled(x, y, s.as_bytes(), scale);
    }

    /// Like `draw_string_scaled` for raw font indices, so the alternate
    /// colour half of the atlas (high bit set) can be reached.
    pub fn draw_bytes_scaled(&mut self, x: i32, y: i32, s: &[u8], scale: f32) {
        let step = (8.0 * scale) as i32;
        for (i, &c) in s.iter().enumerate() {
            self.draw_char_scaled(x + i as i32 * step, y, c as i32, scale);
        }
    }

    pub fn draw_find_pic(&mut self, name: &str) -> Option<ImageId> {
        self.find_image(&pic_path(name), ImageType::Pic)
    }

    /// Width and height of a pic, or `(-1, -1)` when it can't be found.
    pub fn draw_get_pic_size(&mut self, name: &str) -> (i32, i32) {
        match self.draw_find_pic(name) {
            Some(id) => self
                .images
                .read()
                .get(id)
                .map_or((-1, -1), |image| (image.width, image.height)),
            None => (-1, -1),
        }
    }

    fn pic_or_warn(&mut self, name: &str) -> Option<ImageId> {
        let id = self.draw_find_pic(name);
        if id.is_none() {
            self.console.printf(&format!("Can't find pic: {}\n", name));
        }
        id
    }

    /// Draws a whole pic stretched over `w` by `h` pixels.
    pub fn draw_stretch_pic(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) {
        let Some(id) = self.pic_or_warn(name) else {
            return;
        };
        let Some((sl, tl, sh, th)) = self.images.read().get(id).map(|i| (i.sl, i.tl, i.sh, i.th)) else {
            return;
        };
        self.bind_image(id);
        let quad = textured_quad(x as f32, y as f32, w as f32, h as f32, sl, tl, sh, th);
        self.backend.draw(Primitive::Quads, &quad);
    }

    pub fn draw_pic(&mut self, x: i32, y: i32, name: &str) {
        self.draw_pic_scaled(x, y, name, 1.0);
    }

    pub fn draw_pic_scaled(&mut self, x: i32, y: i32, name: &str, factor: f32) {
        let Some(id) = self.pic_or_warn(name) else {
            return;
        };
        let Some((w, h, sl, tl, sh, th)) = self
            .images
            .read()
            .get(id)
            .map(|i| (i.width as f32 * factor, i.height as f32 * factor, i.sl, i.tl, i.sh, i.th))
        else {
            return;
        };
        self.bind_image(id);
        let quad = textured_quad(x as f32, y as f32, w, h, sl, tl, sh, th);
        self.backend.draw(Primitive::Quads, &quad);
    }

    /// Repeats a 64*64 tile graphic to fill the screen around a sized
    /// down refresh window.
    pub fn draw_tile_clear(&mut self, x: i32, y: i32, w: i32, h: i32, name: &str) {
        let Some(id) = self.pic_or_warn(name) else {
            return;
        };
        self.bind_image(id);
        let quad = textured_quad(
            x as f32,
            y as f32,
            w as f32,
            h as f32,
            x as f32 / 64.0,
            y as f32 / 64.0,
            (x + w) as f32 / 64.0,
            (y + h) as f32 / 64.0,
        );
        self.backend.draw(Primitive::Quads, &quad);
    }

    fn colored_quad(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, color: [f32; 4]) {
        self.backend.disable(RenderState::TEXTURE_2D);
        let (x1, y1, x2, y2) = (x1 as f32, y1 as f32, x2 as f32, y2 as f32);
        let quad = [
            Vertex::colored([x1, y1, 0.0], color),
            Vertex::colored([x2, y1, 0.0], color),
            Vertex::colored([x2, y2, 0.0], color),
            Vertex::colored([x1, y2, 0.0], color),
        ];
        self.backend.draw(Primitive::Quads, &quad);
        self.backend.enable(RenderState::TEXTURE_2D);
    }

    /// Fills a box of pixels with a single palette colour.
    pub fn draw_fill(&mut self, x: i32, y: i32, w: i32, h: i32, c: i32) -> Result<(), RendererError> {
        let Some(&rgb) = usize::try_from(c).ok().and_then(|c| self.d_8to24table.get(c)) else {
            tracing::error!(target: "renderer", color = c, "fill with a bad color");
            return Err(RendererError::BadFillColor);
        };
        let color = [
            (rgb & 0xff) as f32 / 255.0,
            ((rgb >> 8) & 0xff) as f32 / 255.0,
            ((rgb >> 16) & 0xff) as f32 / 255.0,
            1.0,
        ];
        self.colored_quad(x, y, x + w, y + h, color);
        Ok(())
    }

    pub fn draw_fade_screen(&mut self) {
        self.backend.enable(RenderState::BLEND);
        let (w, h) = (self.vid_width, self.vid_height);
        self.colored_quad(0, 0, w, h, [0.0, 0.0, 0.0, 0.8]);
        self.backend.disable(RenderState::BLEND);
    }

    /// Draws an 8-bit cinematic frame of `cols` by `rows` through the raw
    /// palette. The frame is resampled to 256 texels wide and at most 256
    /// rows tall, then stretched over the target rectangle.
    pub fn draw_stretch_raw(&mut self, x: i32, y: i32, w: i32, h: i32, cols: i32, rows: i32, data: &[u8]) {
        if cols <= 0 || rows <= 0 {
            return;
        }
        self.backend.bind_texture(0);

        let hscale = if rows <= 256 { 1.0 } else { rows as f32 / 256.0 };
        let trows = rows.clamp(0, 256);
        let t = rows as f32 * hscale / 256.0 - 1.0 / 512.0;

        let mut image32 = vec![0u8; 256 * 256 * 4];
        let fracstep = (cols.max(0) as usize * 0x10000) / 256;
        for i in 0..trows as usize {
            let row = (i as f32 * hscale) as usize;
            if row >= rows as usize {
                break;
            }
            let source = data.get(cols as usize * row..).unwrap_or(&[]);
            let mut frac = fracstep >> 1;
            for texel in image32[i * 256 * 4..(i + 1) * 256 * 4].chunks_exact_mut(4) {
                let index = source.get(frac >> 16).copied().unwrap_or(0);
                texel.copy_from_slice(&self.raw_palette[index as usize].to_le_bytes());
                frac += fracstep;
            }
        }
        self.backend.upload_image(0, 256, 256, &image32);

        let (lo, hi) = (1.0 / 512.0, 511.0 / 512.0);
        let (x, y, w, h) = (x as f32, y as f32, w as f32, h as f32);
        let quad = [
            Vertex::new([x, y, 0.0], [lo, lo], WHITE),
            Vertex::new([x + w, y, 0.0], [hi, lo], WHITE),
            Vertex::new([x + w, y + h, 0.0], [hi, t], WHITE),
            Vertex::new([x, y + h, 0.0], [lo, t], WHITE),
        ];
        self.backend.draw(Primitive::Quads, &quad);
    }
}
