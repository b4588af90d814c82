use driftmark_core::{apply_alignment, AlignmentRecord, GrayPlane, Stack};
use image::Luma;
use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    // A 3-plane synthetic stack with one bright pixel per plane.
    let planes = (0..3)
        .map(|_| {
            let mut plane = GrayPlane::new(64, 64);
            plane.put_pixel(32, 32, Luma([255]));
            plane
        })
        .collect();
    let stack = Stack::from_planes(planes)?;

    let records = vec![
        AlignmentRecord::new(0, 0.0, 0.0),
        AlignmentRecord::new(1, 5.0, -3.0),
        AlignmentRecord::new(2, -2.0, 2.0),
    ];

    let (corrected, warnings) = apply_alignment(&stack, &records);
    println!(
        "Corrected {} planes ({} skipped).",
        corrected.len(),
        warnings.len()
    );

    for (i, plane) in corrected.planes().iter().enumerate() {
        let bright = plane
            .enumerate_pixels()
            .find(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y));
        println!("plane {i}: bright pixel at {bright:?}");
    }
    Ok(())
}
