//! Real-time filter operators
//!
//! Each real-time filter kind maps to one scalar-parameterized operator
//! using the CSS filter-function definitions. Operators are applied left
//! to right in chain order; baked kinds are skipped.

use image::{imageops, RgbaImage};
use rayon::prelude::*;

use crate::layers::{Filter, FilterChain, FilterKind};

/// A filter resolved into the pixel operation it performs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    /// Gaussian blur with the given standard deviation in pixels
    Blur(f32),
    /// `c' = c·slope + intercept` per color channel
    Linear { slope: f32, intercept: f32 },
    /// 3x3 color matrix over RGB
    Matrix([[f32; 3]; 3]),
    /// Mix between the color and its inverse
    Invert(f32),
}

impl FilterOp {
    /// Resolve a filter entry; baked kinds resolve to nothing
    pub fn from_filter(filter: &Filter) -> Option<Self> {
        let value = filter.value();
        let amount = value / 100.0;
        let op = match filter.kind {
            FilterKind::Blur => FilterOp::Blur(value),
            FilterKind::Brightness => FilterOp::Linear {
                slope: amount,
                intercept: 0.0,
            },
            FilterKind::Contrast => FilterOp::Linear {
                slope: amount,
                intercept: 0.5 - 0.5 * amount,
            },
            FilterKind::Grayscale => FilterOp::Matrix(grayscale_matrix(amount)),
            FilterKind::Sepia => FilterOp::Matrix(sepia_matrix(amount)),
            FilterKind::Saturate => FilterOp::Matrix(saturate_matrix(amount)),
            FilterKind::HueRotate => FilterOp::Matrix(hue_rotate_matrix(value)),
            FilterKind::Invert => FilterOp::Invert(amount.min(1.0)),
            FilterKind::AiStyle | FilterKind::AiMaterial => return None,
        };
        Some(op)
    }

    /// Apply in place
    pub fn apply(&self, image: &mut RgbaImage) {
        match *self {
            FilterOp::Blur(sigma) => {
                if sigma > 0.0 {
                    *image = imageops::blur(image, sigma);
                }
            }
            FilterOp::Linear { slope, intercept } => {
                map_rgb(image, |c| c.map(|v| v * slope + intercept));
            }
            FilterOp::Matrix(m) => {
                map_rgb(image, |c| {
                    [
                        m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
                        m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
                        m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
                    ]
                });
            }
            FilterOp::Invert(amount) => {
                map_rgb(image, |c| c.map(|v| amount * (1.0 - v) + (1.0 - amount) * v));
            }
        }
    }
}

/// Apply every real-time filter of a chain, in order
pub fn apply_chain(image: &mut RgbaImage, chain: &FilterChain) {
    for op in chain.realtime().filter_map(FilterOp::from_filter) {
        op.apply(image);
    }
}

fn map_rgb(image: &mut RgbaImage, f: impl Fn([f32; 3]) -> [f32; 3] + Sync) {
    let raw: &mut [u8] = image;
    raw.par_chunks_mut(4).for_each(|px| {
        let c = [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        ];
        let out = f(c);
        for i in 0..3 {
            px[i] = (out[i] * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    });
}

fn grayscale_matrix(amount: f32) -> [[f32; 3]; 3] {
    let a = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

fn sepia_matrix(amount: f32) -> [[f32; 3]; 3] {
    let a = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(degrees: f32) -> [[f32; 3]; 3] {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}
