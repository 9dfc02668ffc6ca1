use super::error::VideoError;
use std::time::Duration;

/// 帧数据结构（解码后的单帧）
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// 从 BGR 排列的字节缓冲构建（解码器常见输出），重排为 RGBA
    pub fn from_bgr(
        width: u32,
        height: u32,
        bgr: &[u8],
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Result<Self, VideoError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3));
        if expected != Some(bgr.len()) {
            return Err(VideoError::InvalidFrame(format!(
                "BGR buffer has {} bytes, expected {:?} for {}x{}",
                bgr.len(),
                expected,
                width,
                height
            )));
        }

        let data = bgr
            .chunks_exact(3)
            .flat_map(|bgr| [bgr[2], bgr[1], bgr[0], 255])
            .collect();

        Ok(Self::new(width, height, data, timestamp_ms, frame_number))
    }

    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Result<Frame, VideoError> {
        if self.width == target_width && self.height == target_height {
            return Ok(self.clone());
        }

        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| {
                VideoError::InvalidFrame(format!(
                    "frame {} has {} bytes, expected {}",
                    self.frame_number,
                    self.data.len(),
                    self.pixel_count() * 4
                ))
            })?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            timestamp: self.timestamp,
            frame_number: self.frame_number,
        })
    }

    /// 缩放到目标尺寸，按 RGB 顺序线性归一化到 [0, 1] 并追加到 `out`
    pub fn normalize_into(
        &self,
        target_width: u32,
        target_height: u32,
        out: &mut Vec<f32>,
    ) -> Result<(), VideoError> {
        let resized = self.resize_to(target_width, target_height)?;
        out.reserve(resized.pixel_count() * 3);
        for rgba in resized.data.chunks_exact(4) {
            out.push(rgba[0] as f32 / 255.0);
            out.push(rgba[1] as f32 / 255.0);
            out.push(rgba[2] as f32 / 255.0);
        }
        Ok(())
    }
}

/// 从原生层传递的原始帧数据（YUV420 平面）
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl RawFrame {
    /// YUV420 (I420) -> RGBA，色度按 2x2 块共享
    pub fn to_rgba(&self) -> Result<Frame, VideoError> {
        let width = self.width as usize;
        let height = self.height as usize;
        let chroma_width = width.div_ceil(2);
        let chroma_len = chroma_width * height.div_ceil(2);
        let luma_len = width.checked_mul(height).unwrap_or(usize::MAX);
        if self.y_plane.len() < luma_len
            || self.u_plane.len() < chroma_len
            || self.v_plane.len() < chroma_len
        {
            return Err(VideoError::InvalidFrame(format!(
                "YUV planes too small for {}x{} (frame {})",
                self.width, self.height, self.frame_number
            )));
        }

        let mut data = vec![255u8; luma_len * 4];
        for (row, (luma_row, out_row)) in self
            .y_plane
            .chunks_exact(width.max(1))
            .zip(data.chunks_exact_mut(width.max(1) * 4))
            .take(height)
            .enumerate()
        {
            let chroma_row = (row / 2) * chroma_width;
            for (col, (&luma, px)) in luma_row.iter().zip(out_row.chunks_exact_mut(4)).enumerate() {
                let c = chroma_row + col / 2;
                px[..3].copy_from_slice(&yuv_to_rgb(luma, self.u_plane[c], self.v_plane[c]));
            }
        }

        Ok(Frame::new(
            self.width,
            self.height,
            data,
            self.timestamp_ms,
            self.frame_number,
        ))
    }
}

/// BT.601 全范围
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}
