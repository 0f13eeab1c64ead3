//! Thumbnail reconciliation
//!
//! The scraped thumbnail replaces the current one only when its pixel
//! area is larger by a hysteresis margin, so near-equal sizes never
//! churn. Dimension fetch failures keep the current thumbnail.

use image::GenericImageView;
use tracing::debug;

/// Scraped thumbnail must be at least this much larger by area
const AREA_IMPROVEMENT_FACTOR: f64 = 1.2;

/// Whether the scraped thumbnail should replace the current one
///
/// Missing current dimensions count as area 0, so any scraped image
/// wins; missing scraped dimensions never win.
pub fn should_update(current: Option<(u32, u32)>, scraped: Option<(u32, u32)>) -> bool {
    let Some((sw, sh)) = scraped else {
        return false;
    };
    let scraped_area = sw as u64 * sh as u64;
    if scraped_area == 0 {
        return false;
    }
    let current_area = current.map(|(w, h)| w as u64 * h as u64).unwrap_or(0);
    scraped_area as f64 >= current_area as f64 * AREA_IMPROVEMENT_FACTOR
}

/// Fetch an image and read its pixel dimensions
///
/// Any failure (network, decode) yields None; the caller keeps the
/// current thumbnail in that case.
pub async fn fetch_dimensions(http: &reqwest::Client, url: &str) -> Option<(u32, u32)> {
    let response = match http.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(url = url, "Thumbnail fetch failed: {}", e);
            return None;
        }
    };
    if !response.status().is_success() {
        debug!(url = url, status = %response.status(), "Thumbnail fetch rejected");
        return None;
    }
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(url = url, "Thumbnail body read failed: {}", e);
            return None;
        }
    };
    match image::load_from_memory(&bytes) {
        Ok(img) => Some(img.dimensions()),
        Err(e) => {
            debug!(url = url, "Thumbnail decode failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_twenty_percent_area_improvement() {
        // 100x100 = 10000; threshold is 12000
        assert!(!should_update(Some((100, 100)), Some((109, 109))));
        assert!(should_update(Some((100, 100)), Some((110, 110))));
    }

    #[test]
    fn test_equal_or_smaller_is_kept() {
        assert!(!should_update(Some((100, 100)), Some((100, 100))));
        assert!(!should_update(Some((100, 100)), Some((50, 50))));
    }

    #[test]
    fn test_missing_dimensions() {
        // Unknown current: any scraped image wins
        assert!(should_update(None, Some((10, 10))));
        // Unknown scraped: never update
        assert!(!should_update(Some((100, 100)), None));
        assert!(!should_update(None, None));
        // Zero-area scraped never wins
        assert!(!should_update(None, Some((0, 10))));
    }
}
