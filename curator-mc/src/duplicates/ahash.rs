//! 64-bit average hash
//!
//! The image is shrunk to 8x8 grayscale; each pixel maps to one bit of
//! the hash depending on whether it is brighter than the mean. Hashes
//! are stored as 64-character bitstrings so they survive JSON and
//! SQLite round-trips without endianness concerns.

use image::imageops::FilterType;
use image::DynamicImage;

/// Hash side length; the hash carries SIDE*SIDE bits
const SIDE: u32 = 8;
/// Bits in a hash
pub const HASH_BITS: u32 = SIDE * SIDE;

/// Compute the average hash of an image as a 64-char bitstring
pub fn average_hash(image: &DynamicImage) -> String {
    let small = image
        .resize_exact(SIDE, SIDE, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<u64> = small.pixels().map(|p| p.0[0] as u64).collect();
    let mean = pixels.iter().sum::<u64>() / pixels.len() as u64;

    pixels
        .iter()
        .map(|&lum| if lum > mean { '1' } else { '0' })
        .collect()
}

/// Hamming distance between two bitstring hashes
///
/// None when the hashes have different lengths (foreign or corrupt data).
pub fn hamming(a: &str, b: &str) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(
        a.bytes()
            .zip(b.bytes())
            .filter(|(x, y)| x != y)
            .count() as u32,
    )
}

/// Similarity percentage for a Hamming distance, 100 = identical
pub fn similarity_score(distance: u32) -> u8 {
    let matching = HASH_BITS.saturating_sub(distance);
    ((matching as f64 / HASH_BITS as f64) * 100.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn flat_image(lum: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([lum, lum, lum])))
    }

    fn half_image() -> DynamicImage {
        let mut img = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        for y in 0..16 {
            for x in 0..32 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_hash_is_64_bits() {
        let hash = average_hash(&flat_image(128));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_identical_images_have_zero_distance() {
        let a = average_hash(&half_image());
        let b = average_hash(&half_image());
        assert_eq!(hamming(&a, &b), Some(0));
    }

    #[test]
    fn test_half_split_image_hash() {
        // Top half bright, bottom half dark: 32 bits set
        let hash = average_hash(&half_image());
        assert_eq!(hash.chars().filter(|&c| c == '1').count(), 32);
    }

    #[test]
    fn test_hamming_rejects_length_mismatch() {
        assert_eq!(hamming("0101", "01010"), None);
    }

    #[test]
    fn test_similarity_score() {
        assert_eq!(similarity_score(0), 100);
        assert_eq!(similarity_score(64), 0);
        // 6 differing bits: 58/64 = 90.6 -> 91
        assert_eq!(similarity_score(6), 91);
    }
}
