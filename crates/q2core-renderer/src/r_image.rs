// r_image.rs: image registry, built-in textures and the imagelist command

use q2core_common::common::Console;

pub type ImageId = usize;

/// Texture numbers below this are reserved for the backend (raw cinematic
/// frames use 0).
pub const TEXNUM_IMAGES: i32 = 1153;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Skin,
    Sprite,
    Wall,
    Pic,
    Sky,
}

impl ImageType {
    fn list_char(self) -> char {
        match self {
            ImageType::Skin => 'M',
            ImageType::Sprite => 'S',
            ImageType::Wall => 'W',
            ImageType::Pic => 'P',
            ImageType::Sky => ' ',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub name: String,
    pub image_type: ImageType,
    pub width: i32,
    pub height: i32,
    pub texnum: i32,
    /// 0,0 - 1,1 unless part of an atlas
    pub sl: f32,
    pub tl: f32,
    pub sh: f32,
    pub th: f32,
}

/// Decoded RGBA pixels from the external image loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub type ImageLoaderFn = Box<dyn Fn(&str) -> Option<LoadedImage> + Send + Sync>;

#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: Vec<Image>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, name: &str) -> Option<ImageId> {
        self.images.iter().position(|i| i.name == name)
    }

    pub fn get(&self, id: ImageId) -> Option<&Image> {
        self.images.get(id)
    }

    pub fn texnum(&self, id: ImageId) -> i32 {
        self.images.get(id).map_or(0, |i| i.texnum)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Adds an image and assigns the next texture number.
    pub fn register(&mut self, name: &str, image_type: ImageType, width: i32, height: i32) -> ImageId {
        if let Some(id) = self.find(name) {
            let img = &mut self.images[id];
            img.image_type = image_type;
            img.width = width;
            img.height = height;
            return id;
        }
        let texnum = TEXNUM_IMAGES + self.images.len() as i32;
        self.images.push(Image {
            name: name.to_string(),
            image_type,
            width,
            height,
            texnum,
            sl: 0.0,
            tl: 0.0,
            sh: 1.0,
            th: 1.0,
        });
        self.images.len() - 1
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }

    /// The `imagelist` command.
    pub fn list(&self, con: &Console) {
        con.printf("------------------\n");
        let mut texels = 0i64;
        for image in &self.images {
            texels += image.width as i64 * image.height as i64;
            con.printf(&format!(
                "{} {:3} {:3}: {}\n",
                image.image_type.list_char(),
                image.width,
                image.height,
                image.name
            ));
        }
        con.printf(&format!("Total texel count (not counting mipmaps): {}\n", texels));
    }
}

const DOTTEXTURE: [[u8; 8]; 8] = [
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 1, 1, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [0, 0, 1, 1, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0],
];

/// 8x8 white dot with alpha, used for the triangle particle path.
pub fn particle_texture_rgba() -> Vec<u8> {
    let mut data = Vec::with_capacity(8 * 8 * 4);
    for row in DOTTEXTURE.iter() {
        for &d in row {
            data.extend_from_slice(&[255, 255, 255, d * 255]);
        }
    }
    data
}

/// 8x8 checker with the dot pattern, used for missing images.
pub fn notexture_rgba() -> Vec<u8> {
    let mut data = Vec::with_capacity(8 * 8 * 4);
    for row in DOTTEXTURE.iter() {
        for &d in row {
            let c = d * 255;
            data.extend_from_slice(&[c, c, c, 255]);
        }
    }
    data
}
