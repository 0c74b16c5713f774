use ndarray::ArrayView3;

/// One captured image: tightly-packed RGB bytes in row-major order.
///
/// The display loop owns a frame for exactly one iteration. Every stage
/// (resize, detection, overlay, display) sees the same buffer, and the
/// overlay mutates it in place.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// A black RGB frame.
    pub fn blank(width: u32, height: u32, index: usize) -> Self {
        Self::new(
            vec![0; (width as usize) * (height as usize) * 3],
            width,
            height,
            3,
            index,
        )
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Position of the frame in its source's decode order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let offset = self.offset(x, y);
        &self.data[offset..offset + self.channels as usize]
    }

    /// Writes `color` at (x, y); coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if !self.contains(x, y) {
            return;
        }
        let offset = self.offset(x as u32, y as u32);
        let n = (self.channels as usize).min(3);
        self.data[offset..offset + n].copy_from_slice(&color[..n]);
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + x as usize) * self.channels as usize
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
