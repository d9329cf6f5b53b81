//! RGBA8 pixel storage for offscreen canvases

/// Immutable copy of a rendered frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Width in device pixels
    pub width: u32,
    /// Height in device pixels
    pub height: u32,
    /// Row-major RGBA8 pixels
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Colour at `(x, y)`, `None` outside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        pixel_at(&self.pixels, self.width, self.height, x, y)
    }
}

/// Mutable render target of offscreen canvases
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    /// Transparent black buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; buffer_len(width, height)],
        }
    }

    /// Size in device pixels
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Reallocate for a new size; contents are cleared when the size changes
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; buffer_len(width, height)];
    }

    /// Fill the whole buffer with one colour
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Fill a rectangle, clipped to the buffer
    pub fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y.min(y_end)..y_end {
            for column in x.min(x_end)..x_end {
                let offset = self.offset(column, row);
                self.pixels[offset..offset + 4].copy_from_slice(&rgba);
            }
        }
    }

    /// Colour at `(x, y)`, `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        pixel_at(&self.pixels, self.width, self.height, x, y)
    }

    /// Copy the current contents
    pub fn snapshot(&self) -> Frame {
        Frame {
            width: self.width,
            height: self.height,
            pixels: self.pixels.clone(),
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

fn buffer_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

fn pixel_at(pixels: &[u8], width: u32, height: u32, x: u32, y: u32) -> Option<[u8; 4]> {
    if x >= width || y >= height {
        return None;
    }
    let offset = (y as usize * width as usize + x as usize) * 4;
    let mut rgba = [0; 4];
    rgba.copy_from_slice(pixels.get(offset..offset + 4)?);
    Some(rgba)
}
