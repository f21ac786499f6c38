//! Result overlays: a box per face and a filled label bar with the identity
//! and score, drawn with `imageproc`.

use crate::pipeline::FaceResult;
use crate::types::{MatchResult, Region};
use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::sync::OnceLock;

pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OTHER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const BOX_THICKNESS: u32 = 2;
const LABEL_BAR_HEIGHT: i32 = 40;
/// Bar height used when there is no room above the box.
const LABEL_BAR_FALLBACK: i32 = 10;
const TEXT_INSET: i32 = 6;
const LABEL_TEXT_SCALE: f32 = 16.0;
const FALLBACK_TEXT_SCALE: f32 = 10.0;
const FPS_TEXT_SCALE: f32 = 24.0;

static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

fn label_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_BYTES) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "label font failed to parse; drawing boxes without text");
            None
        }
    })
    .as_ref()
}

/// Draw every result onto `image`. Faces without a clamped region are skipped.
pub fn draw_results(image: &mut RgbImage, results: &[FaceResult]) {
    for face in results {
        let Some(region) = &face.region else {
            continue;
        };
        let color = if face.result.identity.is_known() {
            KNOWN_COLOR
        } else {
            OTHER_COLOR
        };
        draw_box(image, region, color);
        draw_label(image, region, &face.result, color);
    }
}

/// Frame rate in the top-left corner of a live frame.
pub fn draw_fps(image: &mut RgbImage, fps: f64) {
    draw_text(image, OTHER_COLOR, 10, 10, FPS_TEXT_SCALE, &format!("FPS: {fps:.0}"));
}

fn draw_box(image: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        if region.width <= 2 * inset || region.height <= 2 * inset {
            break;
        }
        let rect = Rect::at((region.x + inset) as i32, (region.y + inset) as i32)
            .of_size(region.width - 2 * inset, region.height - 2 * inset);
        draw_hollow_rect_mut(image, rect, color);
    }
}

/// Filled bar above the box holding the identity and score, or a thin bar
/// just inside the top edge when the box touches the top of the frame.
fn draw_label(image: &mut RgbImage, region: &Region, result: &MatchResult, color: Rgb<u8>) {
    let x = region.x as i32;
    let top = region.y as i32;
    let name = result.identity.as_str();

    let bar_top = top - LABEL_BAR_HEIGHT;
    if bar_top > 0 {
        let bar = Rect::at(x, bar_top).of_size(region.width, LABEL_BAR_HEIGHT as u32);
        draw_filled_rect_mut(image, bar, color);
        draw_text(image, TEXT_COLOR, x + TEXT_INSET, bar_top + 2, LABEL_TEXT_SCALE, name);
        let score = format!("Match: {:.2}", result.score);
        draw_text(
            image,
            TEXT_COLOR,
            x + TEXT_INSET,
            bar_top + LABEL_BAR_HEIGHT / 2 + 1,
            LABEL_TEXT_SCALE,
            &score,
        );
    } else {
        let bar = Rect::at(x, top).of_size(region.width, LABEL_BAR_FALLBACK as u32);
        draw_filled_rect_mut(image, bar, color);
        let text = format!("{name} {:.2}", result.score);
        draw_text(image, TEXT_COLOR, x + TEXT_INSET, top, FALLBACK_TEXT_SCALE, &text);
    }
}

fn draw_text(image: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: f32, text: &str) {
    if let Some(font) = label_font() {
        draw_text_mut(image, color, x, y, PxScale::from(scale), font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn face(x: u32, y: u32, w: u32, h: u32, result: MatchResult) -> FaceResult {
        FaceResult {
            bbox: BoundingBox {
                x: x as i32,
                y: y as i32,
                width: w as i32,
                height: h as i32,
                confidence: 0.9,
            },
            region: Some(Region {
                x,
                y,
                width: w,
                height: h,
            }),
            result,
        }
    }

    /// Pixels in the given rows and columns whose red channel is lit, which
    /// on a green bar can only be text.
    fn text_pixels(image: &RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| image.get_pixel(x, y)[0] > 128)
            .count()
    }

    #[test]
    fn test_bundled_font_parses() {
        assert!(label_font().is_some());
    }

    #[test]
    fn test_known_face_is_green() {
        let mut image = RgbImage::new(200, 200);
        draw_results(&mut image, &[face(50, 60, 40, 40, MatchResult::known("Ann", 12.0))]);
        assert_eq!(image.get_pixel(50, 80), &KNOWN_COLOR); // left edge
        assert_eq!(image.get_pixel(51, 80), &KNOWN_COLOR); // second pixel of the outline
        assert_eq!(image.get_pixel(70, 99), &KNOWN_COLOR); // bottom edge
        assert_eq!(image.get_pixel(70, 80), &BLACK); // interior untouched
    }

    #[test]
    fn test_unknown_and_errors_are_red() {
        let mut image = RgbImage::new(200, 200);
        draw_results(
            &mut image,
            &[
                face(10, 60, 30, 30, MatchResult::unknown(150.0)),
                face(100, 60, 30, 30, MatchResult::failed()),
            ],
        );
        assert_eq!(image.get_pixel(10, 70), &OTHER_COLOR);
        assert_eq!(image.get_pixel(100, 70), &OTHER_COLOR);
    }

    #[test]
    fn test_label_bar_above_box() {
        let mut image = RgbImage::new(200, 200);
        draw_results(&mut image, &[face(50, 100, 40, 40, MatchResult::known("Ann", 1.0))]);
        assert_eq!(image.get_pixel(52, 61), &KNOWN_COLOR);
        assert_eq!(image.get_pixel(52, 59), &BLACK);
    }

    #[test]
    fn test_label_bar_carries_name_and_score_text() {
        let mut image = RgbImage::new(240, 200);
        draw_results(&mut image, &[face(50, 100, 120, 40, MatchResult::known("Ann", 12.5))]);
        // Name line in the upper half of the bar, score line in the lower half.
        assert!(text_pixels(&image, 50..170, 60..80) > 0, "no name text on the label bar");
        assert!(text_pixels(&image, 50..170, 80..100) > 0, "no score text on the label bar");
    }

    #[test]
    fn test_label_bar_below_top_edge_without_room() {
        let mut image = RgbImage::new(200, 200);
        draw_results(&mut image, &[face(50, 20, 40, 40, MatchResult::known("Ann", 1.0))]);
        assert_eq!(image.get_pixel(52, 25), &KNOWN_COLOR);
        assert_eq!(image.get_pixel(52, 19), &BLACK);
        assert_eq!(image.get_pixel(70, 35), &BLACK);
        assert!(text_pixels(&image, 56..90, 20..30) > 0);
    }

    #[test]
    fn test_missing_region_draws_nothing() {
        let mut image = RgbImage::new(50, 50);
        let mut result = face(10, 10, 10, 10, MatchResult::invalid_region());
        result.region = None;
        draw_results(&mut image, &[result]);
        assert!(image.pixels().all(|p| *p == BLACK));
    }

    #[test]
    fn test_box_at_frame_edge_is_clipped() {
        let mut image = RgbImage::new(50, 50);
        draw_results(&mut image, &[face(0, 0, 50, 50, MatchResult::unknown(0.0))]);
        assert_eq!(image.get_pixel(49, 49), &OTHER_COLOR);
    }

    #[test]
    fn test_tiny_region_draws_without_panicking() {
        let mut image = RgbImage::new(20, 20);
        draw_results(&mut image, &[face(5, 5, 1, 1, MatchResult::unknown(0.0))]);
        assert_eq!(image.get_pixel(5, 5), &OTHER_COLOR);
    }

    #[test]
    fn test_fps_text_drawn() {
        let mut image = RgbImage::new(160, 60);
        draw_fps(&mut image, 29.7);
        assert!(image.pixels().any(|p| *p != BLACK));
    }
}
