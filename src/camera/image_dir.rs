use std::{
    fs,
    path::{Path, PathBuf},
};

use log::warn;

use crate::error::{MonitorError, MonitorResult};
use crate::settings::{CameraConfig, JigStation};

use super::{Frame, FrameSource, FrameSourceProvider};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays a directory of stills as a looping camera feed.
pub struct ImageDirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    released: bool,
}

impl ImageDirectorySource {
    pub fn open(dir: impl AsRef<Path>) -> MonitorResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let entries = fs::read_dir(&dir).map_err(|err| {
            MonitorError::Acquisition(format!("cannot read {}: {err}", dir.display()))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(MonitorError::Acquisition(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        Ok(Self {
            dir,
            files,
            cursor: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirectorySource {
    fn grab(&mut self) -> MonitorResult<Frame> {
        if self.released {
            return Err(MonitorError::Acquisition(format!(
                "source for {} was released",
                self.dir.display()
            )));
        }

        // Unreadable stills are skipped; only a directory with nothing
        // decodable counts as a lost feed.
        for _ in 0..self.files.len() {
            let path = &self.files[self.cursor];
            self.cursor = (self.cursor + 1) % self.files.len();

            match image::open(path) {
                Ok(image) => return Ok(image.to_rgb8()),
                Err(err) => warn!("skipping unreadable frame {}: {err}", path.display()),
            }
        }

        Err(MonitorError::Acquisition(format!(
            "no decodable images left in {}",
            self.dir.display()
        )))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Opens an [`ImageDirectorySource`] from a station's camera config.
#[derive(Debug, Default, Clone)]
pub struct ImageDirectoryProvider;

impl FrameSourceProvider for ImageDirectoryProvider {
    type Source = ImageDirectorySource;

    fn open(&self, station: &JigStation) -> MonitorResult<Self::Source> {
        match &station.camera {
            CameraConfig::ImageDirectory { path } => ImageDirectorySource::open(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_still(dir: &Path, name: &str, shade: u8) {
        RgbImage::from_pixel(4, 2, Rgb([shade, shade, shade]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn replays_in_name_order_and_loops() {
        let dir = tempfile::tempdir().unwrap();
        write_still(dir.path(), "b.png", 20);
        write_still(dir.path(), "a.png", 10);
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut source = ImageDirectorySource::open(dir.path()).unwrap();
        assert_eq!(source.len(), 2);

        let shades: Vec<u8> = (0..3)
            .map(|_| source.grab().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 10]);
    }

    #[test]
    fn corrupt_still_is_skipped_without_stalling_replay() {
        let dir = tempfile::tempdir().unwrap();
        write_still(dir.path(), "a.png", 10);
        fs::write(dir.path().join("b.png"), b"not a png").unwrap();
        write_still(dir.path(), "c.png", 30);

        let mut source = ImageDirectorySource::open(dir.path()).unwrap();
        let shades: Vec<u8> = (0..4)
            .map(|_| source.grab().unwrap().get_pixel(0, 0)[0])
            .collect();
        assert_eq!(shades, vec![10, 30, 10, 30]);
    }

    #[test]
    fn all_stills_unreadable_is_an_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.jpg"), b"garbage").unwrap();
        fs::write(dir.path().join("b.png"), b"garbage").unwrap();

        let mut source = ImageDirectorySource::open(dir.path()).unwrap();
        assert!(!source.is_empty());
        assert!(matches!(source.grab(), Err(MonitorError::Acquisition(_))));
    }

    #[test]
    fn empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageDirectorySource::open(dir.path()),
            Err(MonitorError::Acquisition(_))
        ));
    }

    #[test]
    fn grab_after_release_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_still(dir.path(), "frame.png", 0);

        let station = JigStation {
            number: 1,
            camera: CameraConfig::ImageDirectory {
                path: dir.path().to_path_buf(),
            },
        };
        let mut source = ImageDirectoryProvider.open(&station).unwrap();
        assert!(source.grab().is_ok());
        source.release();
        assert!(source.grab().is_err());
    }
}
