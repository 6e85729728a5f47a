pub mod image_dir;

pub use image_dir::{ImageDirectoryProvider, ImageDirectorySource};

use image::{imageops, RgbImage};

use crate::error::MonitorResult;
use crate::settings::JigStation;

pub type Frame = RgbImage;

/// A live frame feed for one jig camera. `grab` may block on I/O.
pub trait FrameSource: Send + 'static {
    fn grab(&mut self) -> MonitorResult<Frame>;

    /// Give the underlying device back. Safe to call more than once.
    fn release(&mut self);
}

/// Opens frame sources for configured jig stations.
pub trait FrameSourceProvider: Send + Sync + 'static {
    type Source: FrameSource;

    fn open(&self, station: &JigStation) -> MonitorResult<Self::Source>;
}

/// Split a frame at `width / 2` into (left, right) regions.
/// Odd widths give the extra column to the right region.
pub fn split_regions(frame: &Frame) -> (Frame, Frame) {
    let (width, height) = frame.dimensions();
    let mid = width / 2;

    let left = imageops::crop_imm(frame, 0, 0, mid, height).to_image();
    let right = imageops::crop_imm(frame, mid, 0, width - mid, height).to_image();
    (left, right)
}
