//! Blend operators
//!
//! Separable and non-separable blend modes, composited source-over with
//! the layer's global alpha: `Cs' = (1 - ab)·Cs + ab·B(Cb, Cs)`, then
//! `co = as·Cs' + ab·Cb·(1 - as)`.

use image::Rgba;

use crate::layers::BlendMode;

/// Blend `top` onto `base` with the given mode and global alpha (0..=1)
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    let opacity = opacity.clamp(0.0, 1.0);

    // Fast path: nothing to paint
    if top[3] == 0 || opacity == 0.0 {
        return base;
    }

    // Fast path: opaque source-over
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let cb = [unit(base[0]), unit(base[1]), unit(base[2])];
    let ab = unit(base[3]);
    let cs = [unit(top[0]), unit(top[1]), unit(top[2])];
    let a_s = unit(top[3]) * opacity;

    let blended = blend_color(cb, cs, mode);

    let out_a = a_s + ab * (1.0 - a_s);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let mixed = (1.0 - ab) * cs[c] + ab * blended[c];
        let co = a_s * mixed + ab * cb[c] * (1.0 - a_s);
        out[c] = to_byte(co / out_a);
    }
    out[3] = to_byte(out_a);
    Rgba(out)
}

/// B(Cb, Cs) for one pixel, all channels in 0..=1
pub fn blend_color(cb: [f32; 3], cs: [f32; 3], mode: BlendMode) -> [f32; 3] {
    match mode {
        BlendMode::Normal => cs,
        BlendMode::Multiply => per_channel(cb, cs, |b, s| b * s),
        BlendMode::Screen => per_channel(cb, cs, screen),
        BlendMode::Overlay => per_channel(cb, cs, |b, s| hard_light(s, b)),
        BlendMode::Darken => per_channel(cb, cs, f32::min),
        BlendMode::Lighten => per_channel(cb, cs, f32::max),
        BlendMode::ColorDodge => per_channel(cb, cs, color_dodge),
        BlendMode::ColorBurn => per_channel(cb, cs, color_burn),
        BlendMode::HardLight => per_channel(cb, cs, hard_light),
        BlendMode::SoftLight => per_channel(cb, cs, soft_light),
        BlendMode::Difference => per_channel(cb, cs, |b, s| (b - s).abs()),
        BlendMode::Exclusion => per_channel(cb, cs, |b, s| b + s - 2.0 * b * s),
        BlendMode::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        BlendMode::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        BlendMode::Color => set_lum(cs, lum(cb)),
        BlendMode::Luminosity => set_lum(cb, lum(cs)),
    }
}

fn per_channel(cb: [f32; 3], cs: [f32; 3], f: impl Fn(f32, f32) -> f32) -> [f32; 3] {
    [f(cb[0], cs[0]), f(cb[1], cs[1]), f(cb[2], cs[2])]
}

fn screen(b: f32, s: f32) -> f32 {
    b + s - b * s
}

fn hard_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b * 2.0 * s
    } else {
        screen(b, 2.0 * s - 1.0)
    }
}

fn color_dodge(b: f32, s: f32) -> f32 {
    if b == 0.0 {
        0.0
    } else if s >= 1.0 {
        1.0
    } else {
        (b / (1.0 - s)).min(1.0)
    }
}

fn color_burn(b: f32, s: f32) -> f32 {
    if b >= 1.0 {
        1.0
    } else if s <= 0.0 {
        0.0
    } else {
        1.0 - ((1.0 - b) / s).min(1.0)
    }
}

fn soft_light(b: f32, s: f32) -> f32 {
    if s <= 0.5 {
        b - (1.0 - 2.0 * s) * b * (1.0 - b)
    } else {
        let d = if b <= 0.25 {
            ((16.0 * b - 12.0) * b + 4.0) * b
        } else {
            b.sqrt()
        };
        b + (2.0 * s - 1.0) * (d - b)
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let (min, mid, max) = (order[0], order[1], order[2]);

    let mut out = [0.0f32; 3];
    if c[max] > c[min] {
        out[mid] = (c[mid] - c[min]) * s / (c[max] - c[min]);
        out[max] = s;
    }
    out
}

fn unit(v: u8) -> f32 {
    v as f32 / 255.0
}

fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}
