use crate::io::par_file::ImageGeometry;
use crate::types::{CorrectionError, CorrectionResult, LabelRaster, RealRaster};
use ndarray::Array2;
use std::fs;
use std::io;
use std::path::Path;

/// Sample types stored in flat little-endian raster files
pub trait RasterSample: Copy {
    const SIZE: usize;

    fn from_le_slice(bytes: &[u8]) -> Self;
}

impl RasterSample for f32 {
    const SIZE: usize = 4;

    fn from_le_slice(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

impl RasterSample for i8 {
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0] as i8
    }
}

/// Reads and writes fixed-size flat rasters (row-major, length x width)
#[derive(Debug, Clone, Copy)]
pub struct RasterStore {
    length: usize,
    width: usize,
}

impl RasterStore {
    pub fn new(length: usize, width: usize) -> Self {
        Self { length, width }
    }

    pub fn from_geometry(geometry: &ImageGeometry) -> Self {
        Self::new(geometry.length, geometry.width)
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.length, self.width)
    }

    pub fn read<T: RasterSample, P: AsRef<Path>>(&self, path: P) -> CorrectionResult<Array2<T>> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| file_error(path, e))?;
        let expected = self.length * self.width * T::SIZE;
        if bytes.len() != expected {
            return Err(CorrectionError::InvalidFormat(format!(
                "{} has {} bytes, expected {} for {}x{} samples of {} bytes",
                path.display(),
                bytes.len(),
                expected,
                self.length,
                self.width,
                T::SIZE
            )));
        }

        let samples: Vec<T> = bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect();
        Array2::from_shape_vec((self.length, self.width), samples).map_err(|e| {
            CorrectionError::InvalidFormat(format!("Failed to reshape {}: {}", path.display(), e))
        })
    }

    /// 32-bit float raster (residual mm, unwrapped phase rad)
    pub fn read_real<P: AsRef<Path>>(&self, path: P) -> CorrectionResult<RealRaster> {
        self.read::<f32, _>(path)
    }

    /// 8-bit connected-component labels
    pub fn read_labels<P: AsRef<Path>>(&self, path: P) -> CorrectionResult<LabelRaster> {
        self.read::<i8, _>(path)
    }

    pub fn write_real<P: AsRef<Path>>(&self, path: P, raster: &RealRaster) -> CorrectionResult<()> {
        let path = path.as_ref();
        if raster.dim() != self.dim() {
            return Err(CorrectionError::Processing(format!(
                "Refusing to write {}x{} raster to {} (expected {}x{})",
                raster.dim().0,
                raster.dim().1,
                path.display(),
                self.length,
                self.width
            )));
        }
        let mut bytes = Vec::with_capacity(self.length * self.width * 4);
        for value in raster.iter() {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        fs::write(path, bytes).map_err(|e| file_error(path, e))?;
        Ok(())
    }
}

/// I/O error of the same kind that names the offending file
fn file_error(path: &Path, e: io::Error) -> CorrectionError {
    CorrectionError::Io(io::Error::new(e.kind(), format!("{}: {}", path.display(), e)))
}

/// Hard link `src` to `dst`, copying when linking is not possible.
///
/// An existing `dst` is replaced.
pub fn link_or_copy<P: AsRef<Path>, Q: AsRef<Path>>(src: P, dst: Q) -> CorrectionResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    if let Err(e) = fs::hard_link(src, dst) {
        log::warn!(
            "Hard link {} -> {} failed ({}), copying instead",
            src.display(),
            dst.display(),
            e
        );
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_real_raster_write_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.unw");
        let store = RasterStore::new(2, 3);
        let raster = array![[1.0f32, -2.5, f32::NAN], [0.0, 3.25, 1e-3]];
        store.write_real(&path, &raster).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 24);

        let back = store.read_real(&path).unwrap();
        assert_eq!(back[[0, 1]], -2.5);
        assert!(back[[0, 2]].is_nan());
        assert_eq!(back[[1, 2]], 1e-3);
    }

    #[test]
    fn test_label_raster_is_signed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.conncomp");
        fs::write(&path, [0u8, 1, 2, 255]).unwrap();
        let labels = RasterStore::new(2, 2).read_labels(&path).unwrap();
        assert_eq!(labels, array![[0i8, 1], [2, -1]]);
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.res");
        fs::write(&path, [0u8; 10]).unwrap();
        let err = RasterStore::new(2, 2).read_real(&path).unwrap_err();
        assert!(matches!(err, CorrectionError::InvalidFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RasterStore::new(2, 2).read_real("/nonexistent/x.res").unwrap_err();
        match &err {
            CorrectionError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("/nonexistent/x.res"));
    }

    #[test]
    fn test_write_into_missing_directory_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("b.unw");
        let err = RasterStore::new(1, 1)
            .write_real(&path, &array![[1.0f32]])
            .unwrap_err();
        assert!(err.to_string().contains("b.unw"));
    }

    #[test]
    fn test_link_or_copy_replaces_target() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.unw");
        let dst = dir.path().join("dst.unw");
        fs::write(&src, b"abcd").unwrap();
        fs::write(&dst, b"old").unwrap();
        link_or_copy(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"abcd");
    }
}
