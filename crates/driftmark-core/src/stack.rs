//! Ordered image-plane stacks and their assembly from decoded sources.
//!
//! A [`Stack`] is the unit both pipelines operate on: an ordered sequence of
//! equally sized planes. Stages never mutate their input stack; each stage
//! produces a fresh one.

use std::fmt;

use image::{ImageBuffer, Luma, Pixel, Rgb};

use crate::error::PipelineError;

/// One plane at native acquisition depth (8-bit sources are widened).
pub type RawPlane = ImageBuffer<Luma<u16>, Vec<u16>>;
/// One normalized 8-bit grayscale plane.
pub type GrayPlane = ImageBuffer<Luma<u8>, Vec<u8>>;
/// One 8-bit RGB plane.
pub type ColorPlane = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Stack of planes as read from the acquisition files.
pub type RawStack = Stack<Luma<u16>>;
/// Stack of normalized 8-bit grayscale planes.
pub type GrayStack = Stack<Luma<u8>>;
/// Stack of 8-bit RGB planes.
pub type ColorStack = Stack<Rgb<u8>>;

/// An ordered, non-empty sequence of planes sharing one width/height.
pub struct Stack<P: Pixel> {
    planes: Vec<ImageBuffer<P, Vec<P::Subpixel>>>,
    width: u32,
    height: u32,
}

impl<P: Pixel> Stack<P> {
    /// Build a stack from already decoded planes.
    ///
    /// Fails with [`PipelineError::Input`] when the plane list is empty or
    /// the planes disagree on width/height.
    pub fn from_planes(
        planes: Vec<ImageBuffer<P, Vec<P::Subpixel>>>,
    ) -> Result<Self, PipelineError> {
        let Some(first) = planes.first() else {
            return Err(PipelineError::Input("stack contains no planes".into()));
        };
        let (width, height) = first.dimensions();
        for (i, plane) in planes.iter().enumerate() {
            if plane.dimensions() != (width, height) {
                return Err(PipelineError::Input(format!(
                    "plane {i} is {}x{}, expected {width}x{height}",
                    plane.width(),
                    plane.height()
                )));
            }
        }
        Ok(Self {
            planes,
            width,
            height,
        })
    }

    /// Rewrap planes produced by a shape-preserving transform.
    pub(crate) fn from_planes_unchecked(
        planes: Vec<ImageBuffer<P, Vec<P::Subpixel>>>,
        width: u32,
        height: u32,
    ) -> Self {
        debug_assert!(planes.iter().all(|p| p.dimensions() == (width, height)));
        Self {
            planes,
            width,
            height,
        }
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn plane(&self, index: usize) -> &ImageBuffer<P, Vec<P::Subpixel>> {
        &self.planes[index]
    }

    pub fn planes(&self) -> &[ImageBuffer<P, Vec<P::Subpixel>>] {
        &self.planes
    }
}

impl<P: Pixel> Clone for Stack<P> {
    fn clone(&self) -> Self {
        Self {
            planes: self.planes.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

impl<P: Pixel + PartialEq> PartialEq for Stack<P> {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.height == other.height && self.planes == other.planes
    }
}

impl<P: Pixel> fmt::Debug for Stack<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stack")
            .field("planes", &self.planes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// A decoded image source: the file-format seam between the stack model and
/// whatever reads bytes off disk.
///
/// A 2D source yields exactly one plane; a multi-plane source yields all of
/// its planes in stored order.
pub trait StackSource {
    /// Identity used in diagnostics, typically the file path.
    fn id(&self) -> String;

    /// Decode every plane of this source at native bit depth.
    fn read_planes(&mut self) -> Result<Vec<RawPlane>, PipelineError>;
}

impl RawStack {
    /// Concatenate the planes of `sources`, in input order, into one stack.
    ///
    /// Fails with [`PipelineError::Input`] when a source cannot be decoded
    /// or disagrees with the first source on width/height.
    pub fn assemble<S, I>(sources: I) -> Result<RawStack, PipelineError>
    where
        S: StackSource,
        I: IntoIterator<Item = S>,
    {
        let mut planes: Vec<RawPlane> = Vec::new();
        let mut dims: Option<(u32, u32)> = None;

        for mut source in sources {
            let decoded = source.read_planes()?;
            for plane in decoded {
                match dims {
                    None => dims = Some(plane.dimensions()),
                    Some((w, h)) => {
                        if plane.dimensions() != (w, h) {
                            return Err(PipelineError::Input(format!(
                                "source {} is {}x{}, expected {w}x{h}",
                                source.id(),
                                plane.width(),
                                plane.height()
                            )));
                        }
                    }
                }
                planes.push(plane);
            }
        }

        Stack::from_planes(planes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        name: &'static str,
        planes: Vec<RawPlane>,
    }

    impl StackSource for FixedSource {
        fn id(&self) -> String {
            self.name.to_string()
        }

        fn read_planes(&mut self) -> Result<Vec<RawPlane>, PipelineError> {
            Ok(std::mem::take(&mut self.planes))
        }
    }

    fn flat_plane(w: u32, h: u32, v: u16) -> RawPlane {
        RawPlane::from_pixel(w, h, Luma([v]))
    }

    #[test]
    fn assemble_concatenates_in_input_order() {
        let sources = vec![
            FixedSource {
                name: "a",
                planes: vec![flat_plane(4, 3, 10), flat_plane(4, 3, 20)],
            },
            FixedSource {
                name: "b",
                planes: vec![flat_plane(4, 3, 30)],
            },
        ];

        let stack = RawStack::assemble(sources).expect("assemble");
        assert_eq!(stack.len(), 3);
        assert_eq!((stack.width(), stack.height()), (4, 3));
        assert_eq!(stack.plane(0).get_pixel(0, 0)[0], 10);
        assert_eq!(stack.plane(1).get_pixel(0, 0)[0], 20);
        assert_eq!(stack.plane(2).get_pixel(0, 0)[0], 30);
    }

    #[test]
    fn assemble_rejects_dimension_mismatch() {
        let sources = vec![
            FixedSource {
                name: "a",
                planes: vec![flat_plane(4, 3, 1)],
            },
            FixedSource {
                name: "b",
                planes: vec![flat_plane(5, 3, 2)],
            },
        ];

        let err = RawStack::assemble(sources).expect_err("mismatched dims");
        let msg = err.to_string();
        assert!(msg.contains("source b"), "{msg}");
        assert!(msg.contains("expected 4x3"), "{msg}");
    }

    #[test]
    fn assemble_rejects_empty_input() {
        let err = RawStack::assemble(Vec::<FixedSource>::new()).expect_err("no planes");
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn from_planes_rejects_mismatched_planes() {
        let err = Stack::from_planes(vec![flat_plane(2, 2, 0), flat_plane(2, 3, 0)])
            .expect_err("mismatch");
        assert!(err.to_string().contains("plane 1"));
    }
}
