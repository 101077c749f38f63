/// An ImagePreset is one complete edit recipe: an ordered list of filter
/// representations applied, in order, to a source image.
///
/// The order is the contract. Rendering the same preset over the same
/// source is deterministic, and swapping two non-commuting filters
/// changes the result. Presets are plain values: the editing session owns
/// its live preset, and every hand-off (history snapshot, render request)
/// clones it so background work never sees a concurrent edit.
use serde_json::Value;

use crate::error::PipelineError;
use crate::filters::apply::apply_filter;
use crate::filters::geometry::Rect;
use crate::filters::representation::{FilterParams, FilterRepresentation};
use crate::Bitmap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImagePreset {
    name: String,
    filters: Vec<FilterRepresentation>,
}

impl ImagePreset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[FilterRepresentation] {
        &self.filters
    }

    /// Append a filter to the recipe.
    ///
    /// Two adjustments keep the recipe canonical:
    /// - an adjacent geometry step absorbs the new one when the
    ///   composition is exact (crop/rotate/straighten chains stay one
    ///   pipeline step); an inexact composition stays a separate step,
    ///   never an in-place replacement, so rendering is always the
    ///   literal sequence of edits;
    /// - other singleton filters update the existing instance of their
    ///   kind in place instead of appearing twice.
    pub fn add_filter(&mut self, rep: FilterRepresentation) {
        if let FilterParams::Geometry(later) = *rep.params() {
            if let Some(last) = self.filters.last_mut() {
                if last.can_merge_with(&rep) {
                    if let FilterParams::Geometry(earlier) = *last.params() {
                        let mut merged = earlier;
                        merged.merge(&later);
                        last.set_geometry_data(merged);
                        return;
                    }
                }
            }
            self.filters.push(rep);
            return;
        }
        if rep.allows_single_instance_only() {
            if let Some(existing) = self.filters.iter_mut().find(|f| f.same(&rep)) {
                existing.use_parameters_from(&rep);
                return;
            }
        }
        self.filters.push(rep);
    }

    /// Remove the first filter of the same kind. Identity here is
    /// `same()`, not `==`: the caller means "drop the sharpen step",
    /// whatever its current value.
    pub fn remove_filter(&mut self, rep: &FilterRepresentation) -> bool {
        if let Some(index) = self.filters.iter().position(|f| f.same(rep)) {
            self.filters.remove(index);
            return true;
        }
        false
    }

    pub fn contains(&self, rep: &FilterRepresentation) -> bool {
        self.filters.iter().any(|f| f.same(rep))
    }

    pub fn get_representation(&self, rep: &FilterRepresentation) -> Option<&FilterRepresentation> {
        self.filters.iter().find(|f| f.same(rep))
    }

    /// Push edited parameter values into the existing step of the same
    /// kind. Returns false when no such step exists.
    pub fn update_filter_representation(&mut self, rep: &FilterRepresentation) -> bool {
        if let Some(existing) = self.filters.iter_mut().find(|f| f.same(rep)) {
            existing.use_parameters_from(rep);
            return true;
        }
        false
    }

    /// True when every step tolerates rendering on a reduced working
    /// buffer. One spatial filter in the chain forces full resolution.
    pub fn supports_partial_rendering(&self) -> bool {
        self.filters.iter().all(|f| f.supports_partial_rendering())
    }

    /// Index of the first step that forbids partial rendering; preview
    /// buffers must be full-size from this point onward.
    pub fn partial_render_limit(&self) -> Option<usize> {
        self.filters.iter().position(|f| !f.supports_partial_rendering())
    }

    /// Final pixel bounds after every geometry step, computed by
    /// simulating the sequential composition the renderer applies, not by
    /// inspecting only the last geometry filter.
    ///
    /// `width`/`height` are authoritative. The `x`/`y` origin is the
    /// accumulated crop offset and is only meaningful while every step so
    /// far keeps the source orientation; past a rotation or mirror the
    /// offsets of later steps live in a rotated frame and the sum is
    /// approximate.
    pub fn final_geometry_rect(&self, width: u32, height: u32) -> Rect {
        let mut x: u32 = 0;
        let mut y: u32 = 0;
        let mut w = width;
        let mut h = height;
        for rep in &self.filters {
            if let FilterParams::Geometry(data) = rep.params() {
                let bounds = data.apply_to_bounds(w, h);
                x = x.saturating_add(bounds.x);
                y = y.saturating_add(bounds.y);
                w = bounds.width;
                h = bounds.height;
                if bounds.is_empty() {
                    break;
                }
            }
        }
        Rect::new(x, y, w, h)
    }

    /// Render the full recipe against a source buffer: an ordered fold,
    /// each step consuming the previous step's output. Any failing step
    /// aborts the whole render; no partial result escapes.
    pub fn apply_to(&self, source: &Bitmap) -> Result<Bitmap, PipelineError> {
        let mut working = source.clone();
        for rep in &self.filters {
            working = apply_filter(rep, &working).map_err(|err| {
                log::warn!("filter '{}' aborted the render: {}", rep.name(), err);
                err
            })?;
        }
        Ok(working)
    }

    // ========== Persistence ==========

    /// JSON form: an array of per-filter key/value objects.
    pub fn to_json_value(&self) -> Value {
        Value::Array(self.filters.iter().map(|f| f.to_json()).collect())
    }

    pub fn to_json(&self) -> Result<String, PipelineError> {
        Ok(serde_json::to_string(&self.to_json_value())?)
    }

    /// Load a preset. Entries with an unknown or missing `"Name"` tag
    /// are skipped with a log line; only unparseable JSON is an error.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_str(json)?;
        let mut preset = ImagePreset::new();
        let entries = match value {
            Value::Array(entries) => entries,
            _ => return Ok(preset),
        };
        for entry in &entries {
            match FilterRepresentation::from_json(entry) {
                Some(rep) => preset.filters.push(rep),
                None => log::warn!("skipping unrecognized filter entry in preset"),
            }
        }
        Ok(preset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::geometry::{GeometryData, Mirror, Rotation};

    fn test_image(w: u32, h: u32) -> Bitmap {
        let mut img = Bitmap::new(w, h);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = image::Rgba([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8, 255]);
        }
        img
    }

    fn sharpen_at(value: i32) -> FilterRepresentation {
        let mut rep = FilterRepresentation::sharpen();
        rep.set_value(value);
        rep
    }

    #[test]
    fn remove_and_update_work_on_kind_not_value() {
        let mut preset = ImagePreset::new();
        preset.add_filter(sharpen_at(30));
        preset.add_filter(FilterRepresentation::contrast());

        assert!(preset.contains(&FilterRepresentation::sharpen()));
        assert!(preset.update_filter_representation(&sharpen_at(80)));
        assert_eq!(
            preset
                .get_representation(&FilterRepresentation::sharpen())
                .unwrap()
                .value(),
            80
        );

        assert!(preset.remove_filter(&FilterRepresentation::sharpen()));
        assert!(!preset.contains(&FilterRepresentation::sharpen()));
        assert_eq!(preset.len(), 1);
    }

    #[test]
    fn singleton_filters_never_duplicate() {
        let mut preset = ImagePreset::new();
        let wb = FilterRepresentation::white_balance();
        preset.add_filter(wb.clone());
        preset.add_filter(FilterRepresentation::sharpen());
        let mut warmer = FilterRepresentation::white_balance();
        warmer.deserialize_representation(&[("Temperature".to_string(), "40".to_string())]);
        preset.add_filter(warmer.clone());

        assert_eq!(preset.len(), 2);
        assert_eq!(
            preset.get_representation(&wb).unwrap().params(),
            warmer.params()
        );
    }

    #[test]
    fn adjacent_geometry_collapses_to_one_step() {
        let mut preset = ImagePreset::new();
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_rotation(
            Rotation::Ninety,
        )));
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_rotation(
            Rotation::Ninety,
        )));
        assert_eq!(preset.len(), 1);
        let data = preset.filters()[0].geometry_data().unwrap();
        assert_eq!(data.rotation, Rotation::OneEighty);
    }

    #[test]
    fn flip_after_straighten_stays_a_separate_step() {
        // A single flip reverses the sense of a fine rotation, so the
        // two edits cannot collapse; rendering must apply them in order.
        let straighten = GeometryData::with_straighten(10.0);
        let flip = GeometryData::with_mirror(Mirror::Horizontal);

        let mut preset = ImagePreset::new();
        preset.add_filter(FilterRepresentation::geometry(straighten));
        preset.add_filter(FilterRepresentation::geometry(flip));
        assert_eq!(preset.len(), 2);

        let src = test_image(60, 40);
        let sequential = {
            let first = apply_filter(&FilterRepresentation::geometry(straighten), &src).unwrap();
            apply_filter(&FilterRepresentation::geometry(flip), &first).unwrap()
        };
        assert_eq!(preset.apply_to(&src).unwrap(), sequential);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut preset = ImagePreset::new();
        preset.add_filter(sharpen_at(40));
        let mut sat = FilterRepresentation::saturation();
        sat.set_value(-20);
        preset.add_filter(sat);

        let src = test_image(32, 32);
        let first = preset.apply_to(&src).unwrap();
        let second = preset.apply_to(&src).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn filter_order_matters() {
        let crop = FilterRepresentation::geometry(GeometryData::with_crop(Rect::new(4, 4, 16, 16)));
        let sharpen = sharpen_at(90);
        let src = test_image(32, 32);

        let mut crop_first = ImagePreset::new();
        crop_first.add_filter(crop.clone());
        crop_first.add_filter(sharpen.clone());

        let mut sharpen_first = ImagePreset::new();
        sharpen_first.add_filter(sharpen);
        sharpen_first.add_filter(crop);

        // Cropping changes the convolution's edge neighborhoods.
        let a = crop_first.apply_to(&src).unwrap();
        let b = sharpen_first.apply_to(&src).unwrap();
        assert_eq!(a.dimensions(), b.dimensions());
        assert_ne!(a, b);
    }

    #[test]
    fn empty_preset_is_identity() {
        let src = test_image(8, 8);
        let out = ImagePreset::new().apply_to(&src).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn json_round_trip_is_equal() {
        let mut preset = ImagePreset::new();
        preset.add_filter(sharpen_at(25));
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_crop(
            Rect::new(0, 0, 50, 50),
        )));
        let mut wb = FilterRepresentation::white_balance();
        wb.deserialize_representation(&[
            ("Temperature".to_string(), "-15".to_string()),
            ("Tint".to_string(), "5".to_string()),
        ]);
        preset.add_filter(wb);

        let json = preset.to_json().unwrap();
        let restored = ImagePreset::from_json(&json).unwrap();
        assert_eq!(preset, restored);
    }

    #[test]
    fn unknown_filters_are_skipped_on_load() {
        let json = r#"[
            {"Name": "SHARPEN", "Value": "10"},
            {"Name": "TIME_TRAVEL", "Value": "88"},
            {"Value": "no name tag"}
        ]"#;
        let preset = ImagePreset::from_json(json).unwrap();
        assert_eq!(preset.len(), 1);
        assert_eq!(preset.filters()[0].serialization_name(), "SHARPEN");
    }

    #[test]
    fn final_geometry_rect_single_crop() {
        let mut preset = ImagePreset::new();
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_crop(
            Rect::new(0, 0, 50, 50),
        )));
        assert_eq!(preset.final_geometry_rect(100, 100), Rect::new(0, 0, 50, 50));

        let rendered = preset.apply_to(&test_image(100, 100)).unwrap();
        assert_eq!(rendered.dimensions(), (50, 50));
    }

    #[test]
    fn final_geometry_rect_walks_every_geometry_step() {
        // Geometry steps separated by a color filter stay separate, and
        // the simulation still walks all of them in order.
        let mut preset = ImagePreset::new();
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_crop(
            Rect::new(10, 10, 60, 40),
        )));
        preset.add_filter(FilterRepresentation::contrast());
        preset.add_filter(FilterRepresentation::geometry(GeometryData::with_rotation(
            Rotation::Ninety,
        )));

        let rect = preset.final_geometry_rect(100, 100);
        assert_eq!((rect.width, rect.height), (40, 60));

        let rendered = preset.apply_to(&test_image(100, 100)).unwrap();
        assert_eq!(rendered.dimensions(), (rect.width, rect.height));
    }

    #[test]
    fn partial_rendering_policy_walks_to_first_blocker() {
        let mut preset = ImagePreset::new();
        preset.add_filter(sharpen_at(10));
        assert!(preset.supports_partial_rendering());
        assert_eq!(preset.partial_render_limit(), None);

        let mut vig = FilterRepresentation::vignette();
        vig.set_value(50);
        preset.add_filter(vig);
        assert!(!preset.supports_partial_rendering());
        assert_eq!(preset.partial_render_limit(), Some(1));
    }
}
