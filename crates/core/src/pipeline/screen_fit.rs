use crate::shared::frame::Frame;

/// Largest size with the frame's aspect ratio that fits inside the screen.
///
/// `scale = min(screen_w / frame_w, screen_h / frame_h)`, applied to both
/// sides and rounded to the nearest pixel within the screen, never below
/// one pixel. Small frames are scaled
/// up to fill the screen.
pub fn fit_to_screen(frame_size: (u32, u32), screen_size: (u32, u32)) -> (u32, u32) {
    let (fw, fh) = frame_size;
    let (sw, sh) = screen_size;
    if fw == 0 || fh == 0 || sw == 0 || sh == 0 {
        return frame_size;
    }
    let scale = (sw as f64 / fw as f64).min(sh as f64 / fh as f64);
    let w = ((fw as f64 * scale).round() as u32).clamp(1, sw);
    let h = ((fh as f64 * scale).round() as u32).clamp(1, sh);
    (w, h)
}

/// Resizes the frame to fit the screen. Returns the frame unchanged when
/// it already has the target size.
pub fn resize_to_screen(frame: Frame, screen_size: (u32, u32)) -> Frame {
    let (w, h) = fit_to_screen((frame.width(), frame.height()), screen_size);
    if (w, h) == (frame.width(), frame.height()) || frame.channels() != 3 {
        return frame;
    }
    let index = frame.index();
    let (fw, fh) = (frame.width(), frame.height());
    let Some(buffer) = image::RgbImage::from_raw(fw, fh, frame.into_data()) else {
        return Frame::blank(w, h, index);
    };
    let resized = image::imageops::resize(&buffer, w, h, image::imageops::FilterType::Triangle);
    Frame::new(resized.into_raw(), w, h, 3, index)
}
