//! Integration Tests
//!
//! End-to-end tests for the layer store and compositing pipeline.

use diffusion_studio::compositor::blend::blend_pixel;
use diffusion_studio::compositor::{raster_digest, CanvasSize, Compositor, DEFAULT_BACKGROUND};
use diffusion_studio::layers::{
    BlendMode, EncodedImage, Filter, FilterKind, LayerId, LayerPatch, LayerStore, MoveDirection,
};
use image::{Rgba, RgbaImage};
use test_case::test_case;

/// Helper to create a solid-colour layer payload
fn solid(color: [u8; 4]) -> EncodedImage {
    EncodedImage::from_raster(&RgbaImage::from_pixel(8, 8, Rgba(color))).unwrap()
}

fn small_compositor() -> Compositor {
    Compositor::new(CanvasSize::square(8), DEFAULT_BACKGROUND)
}

fn three_layer_store() -> (LayerStore, Vec<LayerId>) {
    let mut store = LayerStore::new();
    let ids = vec![
        store.add_layer(solid([200, 40, 40, 255]), "bottom", BlendMode::Normal, ""),
        store.add_layer(solid([40, 200, 40, 255]), "middle", BlendMode::Screen, ""),
        store.add_layer(solid([40, 40, 200, 255]), "top", BlendMode::Overlay, ""),
    ];
    (store, ids)
}

// === Rendering ===

#[test]
fn test_render_is_deterministic() {
    let (mut store, ids) = three_layer_store();
    store.update_layer(&ids[1], LayerPatch::new().opacity(35));
    store.add_filter(&ids[2], Filter::new(FilterKind::Blur, 2.0));
    store.add_filter(&ids[0], Filter::new(FilterKind::HueRotate, 120.0));
    let compositor = small_compositor();

    let first = compositor.render(store.layers());
    let second = compositor.render(store.layers());

    assert_eq!(raster_digest(&first), raster_digest(&second));
    assert_eq!(first, second);
}

#[test]
fn test_normal_then_multiply_stack() {
    let a = [255, 0, 0, 255];
    let b = [128, 128, 128, 255];
    let mut store = LayerStore::new();
    let a_id = store.add_layer(solid(a), "A", BlendMode::Normal, "");
    store.update_layer(&a_id, LayerPatch::new().opacity(50));
    let b_id = store.add_layer(solid(b), "B", BlendMode::Multiply, "");
    let compositor = small_compositor();

    let plan = compositor.plan(store.layers());
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0].operation, "source-over");
    assert_eq!(plan[0].alpha, 0.5);
    assert_eq!(plan[1].operation, "multiply");
    assert_eq!(plan[1].alpha, 1.0);

    let with_a = blend_pixel(DEFAULT_BACKGROUND, Rgba(a), BlendMode::Normal, 0.5);
    let with_b = blend_pixel(with_a, Rgba(b), BlendMode::Multiply, 1.0);
    let frame = compositor.render(store.layers());
    assert_eq!(frame.get_pixel(4, 4), &with_b);

    store.update_layer(&b_id, LayerPatch::new().visible(false));
    let frame = compositor.render(store.layers());
    assert_eq!(frame.get_pixel(4, 4), &with_a);
    assert_eq!(compositor.plan(store.layers()).len(), 1);
}

#[test]
fn test_undecodable_layer_paints_nothing() {
    let mut store = LayerStore::new();
    store.add_layer(
        EncodedImage::with_mime(b"broken".to_vec(), "image/png"),
        "broken",
        BlendMode::Normal,
        "",
    );
    let frame = small_compositor().render(store.layers());
    assert!(frame.pixels().all(|p| *p == DEFAULT_BACKGROUND));
}

#[test]
fn test_baked_filter_never_reaches_render_string() {
    let (mut store, ids) = three_layer_store();
    store.add_filter(&ids[0], Filter::new(FilterKind::Sepia, 40.0));
    store.add_filter(&ids[0], Filter::ai_style(0.8, "oil paint..."));
    store.add_filter(&ids[0], Filter::new(FilterKind::AiMaterial, 100.0));

    let layer = store.get(&ids[0]).unwrap();
    assert_eq!(layer.filters.len(), 3);
    assert_eq!(layer.filters.css_string(), "sepia(40%)");
    let plan = small_compositor().plan(store.layers());
    assert_eq!(plan[0].filter, "sepia(40%)");
}

// === Store invariants ===

#[test_case(-20, 0 ; "negative clamps to zero")]
#[test_case(0, 0 ; "zero")]
#[test_case(64, 64 ; "in range")]
#[test_case(100, 100 ; "full")]
#[test_case(250, 100 ; "above range clamps to full")]
fn test_opacity_clamped(input: i64, expected: u8) {
    let (mut store, ids) = three_layer_store();
    store.update_layer(&ids[1], LayerPatch::new().opacity(input));
    assert_eq!(store.get(&ids[1]).unwrap().opacity().percent(), expected);
}

#[test]
fn test_move_past_the_ends_is_noop() {
    let (mut store, ids) = three_layer_store();
    let revision = store.revision();

    assert!(!store.move_layer(&ids[2], MoveDirection::Up));
    assert!(!store.move_layer(&ids[0], MoveDirection::Down));

    let order: Vec<_> = store.layers().iter().map(|l| l.id().clone()).collect();
    assert_eq!(order, ids);
    assert_eq!(store.revision(), revision);

    assert!(store.move_layer(&ids[0], MoveDirection::Up));
    assert_eq!(store.layers()[1].id(), &ids[0]);
}

#[test]
fn test_delete_and_selection() {
    let (mut store, ids) = three_layer_store();
    assert_eq!(store.selected_id(), Some(&ids[2]));

    store.delete_layer(&ids[0]);
    assert_eq!(store.selected_id(), Some(&ids[2]));

    store.delete_layer(&ids[2]);
    assert_eq!(store.selected_id(), None);
    assert_eq!(store.len(), 1);
}

#[test]
fn test_merge_visible_adds_flattened_top_layer() {
    let (mut store, ids) = three_layer_store();
    store.update_layer(&ids[1], LayerPatch::new().visible(false));
    let compositor = small_compositor();
    let expected = compositor.render(store.layers());

    let merged = store.merge_visible(&compositor).unwrap();

    assert_eq!(store.len(), 4);
    assert_eq!(store.selected_id(), Some(&merged));
    let layer = store.get(&merged).unwrap();
    assert_eq!(layer.name, "Merged Composition");
    let pixels = layer.image.as_ref().unwrap().decode().unwrap().to_rgba8();
    assert_eq!(pixels, expected);
}

#[test]
fn test_filter_editing_round() {
    let (mut store, ids) = three_layer_store();
    let blur = store.add_filter(&ids[1], Filter::new(FilterKind::Blur, 3.0)).unwrap();
    store.add_filter(&ids[1], Filter::new(FilterKind::Contrast, 150.0));

    assert!(store.set_filter_value(&ids[1], &blur, 99.0));
    assert_eq!(
        store.get(&ids[1]).unwrap().filters.css_string(),
        "blur(20px) contrast(150%)"
    );

    assert!(store.remove_filter(&ids[1], &blur).is_some());
    assert_eq!(store.get(&ids[1]).unwrap().filters.css_string(), "contrast(150%)");
}

#[test]
fn test_clear_resets_document() {
    let (mut store, _) = three_layer_store();
    store.clear();
    assert!(store.is_empty());
    assert_eq!(store.selected_id(), None);
    let frame = small_compositor().render(store.layers());
    assert!(frame.pixels().all(|p| *p == DEFAULT_BACKGROUND));
}
