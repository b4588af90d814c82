//! Stack file IO: multipage TIFF via the `tiff` crate, everything else as a
//! single plane via `image`.
//!
//! Encoders render into memory first so an output file either appears whole
//! or not at all.

use std::fs;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use driftmark_core::{ColorStack, GrayStack, PipelineError, RawPlane, StackSource};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

/// One input file, decoded on demand during stack assembly.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl StackSource for FileSource {
    fn id(&self) -> String {
        self.path.display().to_string()
    }

    fn read_planes(&mut self) -> Result<Vec<RawPlane>, PipelineError> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("tif" | "tiff" | "stk") => read_tiff_planes(&self.path),
            _ => read_single_plane(&self.path),
        }
    }
}

fn read_tiff_planes(path: &Path) -> Result<Vec<RawPlane>, PipelineError> {
    let file = fs::File::open(path)
        .map_err(|e| PipelineError::Input(format!("cannot open {}: {e}", path.display())))?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(|e| PipelineError::Input(format!("cannot decode {}: {e}", path.display())))?;

    let mut planes = Vec::new();
    loop {
        planes.push(decode_current_plane(&mut decoder, path)?);
        if !decoder.more_images() {
            break;
        }
        decoder
            .next_image()
            .map_err(|e| PipelineError::Input(format!("cannot decode {}: {e}", path.display())))?;
    }
    Ok(planes)
}

fn decode_current_plane<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<RawPlane, PipelineError> {
    let input_err = |msg: String| PipelineError::Input(format!("{}: {msg}", path.display()));

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| input_err(e.to_string()))?;
    let color = decoder.colortype().map_err(|e| input_err(e.to_string()))?;
    let data = decoder.read_image().map_err(|e| input_err(e.to_string()))?;

    let samples = match (color, data) {
        (tiff::ColorType::Gray(8), DecodingResult::U8(v)) => {
            v.into_iter().map(u16::from).collect()
        }
        (tiff::ColorType::Gray(16), DecodingResult::U16(v)) => v,
        (tiff::ColorType::RGB(8), DecodingResult::U8(v)) => {
            let rgb = image::RgbImage::from_raw(width, height, v)
                .ok_or_else(|| input_err("truncated RGB plane".into()))?;
            return RawPlane::from_raw(
                width,
                height,
                image::DynamicImage::ImageRgb8(rgb).to_luma16().into_raw(),
            )
            .ok_or_else(|| input_err("truncated plane".into()));
        }
        (color, _) => {
            return Err(input_err(format!(
                "unsupported TIFF layout {color:?} (expected 8/16-bit gray or 8-bit RGB)"
            )))
        }
    };

    RawPlane::from_raw(width, height, samples).ok_or_else(|| input_err("truncated plane".into()))
}

fn read_single_plane(path: &Path) -> Result<Vec<RawPlane>, PipelineError> {
    let img = image::open(path)
        .map_err(|e| PipelineError::Input(format!("cannot decode {}: {e}", path.display())))?;
    Ok(vec![img.to_luma16()])
}

/// Write an 8-bit grayscale stack as a multipage TIFF.
pub fn write_gray_stack(path: &Path, stack: &GrayStack) -> Result<(), PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut buf).map_err(encode_err)?;
    for plane in stack.planes() {
        encoder
            .write_image::<colortype::Gray8>(stack.width(), stack.height(), plane.as_raw())
            .map_err(encode_err)?;
    }
    drop(encoder);
    write_whole_file(path, buf.into_inner())
}

/// Write an RGB stack as a multipage TIFF.
pub fn write_color_stack(path: &Path, stack: &ColorStack) -> Result<(), PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    let mut encoder = TiffEncoder::new(&mut buf).map_err(encode_err)?;
    for plane in stack.planes() {
        encoder
            .write_image::<colortype::RGB8>(stack.width(), stack.height(), plane.as_raw())
            .map_err(encode_err)?;
    }
    drop(encoder);
    write_whole_file(path, buf.into_inner())
}

fn write_whole_file(path: &Path, bytes: Vec<u8>) -> Result<(), PipelineError> {
    fs::write(path, bytes).map_err(|e| {
        let _ = fs::remove_file(path);
        PipelineError::Io(e)
    })
}

fn encode_err(e: tiff::TiffError) -> PipelineError {
    PipelineError::Io(std::io::Error::other(e))
}
