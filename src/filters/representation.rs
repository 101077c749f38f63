/// Description of one filter: identity, display flags, and parameters.
///
/// A representation is a pure value. The editing UI owns one per active
/// filter, presets store copies of them, and history snapshots copy them
/// again, so nothing here is ever shared mutable state.
///
/// Two different notions of equality matter:
/// - `==` (derived): structural, every field including parameter values.
/// - `same()`: type identity only. "Replace the sharpen filter" works on
///   `same()`, because the caller means "this kind of filter", not "this
///   exact value".
use serde::{Deserialize, Serialize};

use crate::filters::geometry::{GeometryData, Mirror, Rect, Rotation, MAX_STRAIGHTEN};

/// Closed set of filter categories. The category drives ordering and
/// merge rules, not execution: execution dispatches on the parameter
/// payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    Border,
    ColorFx,
    WhiteBalance,
    Vignette,
    Normal,
    TinyPlanet,
    Geometry,
    Makeup,
    DualCam,
    TruePortrait,
    PresetFilter,
    Watermark,
    WatermarkCategory,
}

/// Editor screen associated with a representation.
pub const BASIC_EDITOR_ID: i32 = 1;
pub const GEOMETRY_EDITOR_ID: i32 = 2;
pub const WBALANCE_EDITOR_ID: i32 = 3;

const NAME_TAG: &str = "Name";

/// Type-specific parameter payload. One closed enum instead of a
/// subclass per filter; `apply_filter` matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterParams {
    /// No parameters (no-op / overlay-only filters).
    None,
    /// Single slider with an inclusive range.
    Basic { value: i32, minimum: i32, maximum: i32 },
    /// Temperature/tint pair, both in [-100, 100].
    WhiteBalance { temperature: i32, tint: i32 },
    /// Combined crop/rotate/mirror/straighten state.
    Geometry(GeometryData),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRepresentation {
    name: String,
    serialization_name: String,
    filter_type: FilterType,
    params: FilterParams,
    editor_id: i32,
    supports_partial_rendering: bool,
    overlay_only: bool,
    is_boolean_filter: bool,
    show_parameter_value: bool,
}

impl FilterRepresentation {
    fn new(name: &str, serialization_name: &str, filter_type: FilterType) -> Self {
        Self {
            name: name.to_string(),
            serialization_name: serialization_name.to_string(),
            filter_type,
            params: FilterParams::None,
            editor_id: BASIC_EDITOR_ID,
            supports_partial_rendering: false,
            overlay_only: false,
            is_boolean_filter: false,
            show_parameter_value: true,
        }
    }

    fn basic(
        name: &str,
        serialization_name: &str,
        minimum: i32,
        value: i32,
        maximum: i32,
    ) -> Self {
        let mut rep = Self::new(name, serialization_name, FilterType::Normal);
        rep.params = FilterParams::Basic {
            value,
            minimum,
            maximum,
        };
        rep.supports_partial_rendering = true;
        rep
    }

    // ========== Stock filters ==========

    /// Identity filter; renders as a plain copy.
    pub fn none() -> Self {
        let mut rep = Self::new("None", "NONE", FilterType::Normal);
        rep.is_boolean_filter = true;
        rep.show_parameter_value = false;
        rep.supports_partial_rendering = true;
        rep
    }

    /// 3x3 convolution sharpen, strength in [-100, 100].
    pub fn sharpen() -> Self {
        Self::basic("Sharpen", "SHARPEN", -100, 0, 100)
    }

    pub fn exposure() -> Self {
        Self::basic("Exposure", "EXPOSURE", -100, 0, 100)
    }

    pub fn contrast() -> Self {
        Self::basic("Contrast", "CONTRAST", -100, 0, 100)
    }

    pub fn saturation() -> Self {
        Self::basic("Saturation", "SATURATION", -100, 0, 100)
    }

    /// Radial darkening toward the corners. Spatial, so no partial
    /// rendering: a cropped working buffer would move the center.
    pub fn vignette() -> Self {
        let mut rep = Self::basic("Vignette", "VIGNETTE", 0, 0, 100);
        rep.filter_type = FilterType::Vignette;
        rep.supports_partial_rendering = false;
        rep
    }

    pub fn white_balance() -> Self {
        let mut rep = Self::new("White Balance", "WBALANCE", FilterType::WhiteBalance);
        rep.params = FilterParams::WhiteBalance {
            temperature: 0,
            tint: 0,
        };
        rep.editor_id = WBALANCE_EDITOR_ID;
        rep.supports_partial_rendering = true;
        rep
    }

    pub fn geometry(data: GeometryData) -> Self {
        let mut rep = Self::new("Geometry", "GEOMETRY", FilterType::Geometry);
        rep.params = FilterParams::Geometry(data);
        rep.editor_id = GEOMETRY_EDITOR_ID;
        rep.show_parameter_value = false;
        rep
    }

    /// Default instance for a serialization name, the registry used when
    /// loading presets. Unknown names yield `None` (and the loader skips
    /// the entry instead of failing).
    pub fn from_serialization_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "NONE" => Some(Self::none()),
            "SHARPEN" => Some(Self::sharpen()),
            "EXPOSURE" => Some(Self::exposure()),
            "CONTRAST" => Some(Self::contrast()),
            "SATURATION" => Some(Self::saturation()),
            "VIGNETTE" => Some(Self::vignette()),
            "WBALANCE" => Some(Self::white_balance()),
            "GEOMETRY" => Some(Self::geometry(GeometryData::default())),
            _ => None,
        }
    }

    // ========== Identity & flags ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serialization_name(&self) -> &str {
        &self.serialization_name
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn editor_id(&self) -> i32 {
        self.editor_id
    }

    pub fn supports_partial_rendering(&self) -> bool {
        self.supports_partial_rendering
    }

    pub fn is_overlay_only(&self) -> bool {
        self.overlay_only
    }

    pub fn is_boolean_filter(&self) -> bool {
        self.is_boolean_filter
    }

    pub fn show_parameter_value(&self) -> bool {
        self.show_parameter_value
    }

    /// Type-only equality: do these describe the same kind of filter,
    /// whatever their current parameter values?
    pub fn same(&self, other: &FilterRepresentation) -> bool {
        self.serialization_name == other.serialization_name
    }

    /// Filters that may appear at most once in a preset.
    pub fn allows_single_instance_only(&self) -> bool {
        matches!(
            self.filter_type,
            FilterType::Geometry | FilterType::WhiteBalance | FilterType::Vignette | FilterType::Border
        )
    }

    /// Whether this representation and the next one can collapse into a
    /// single pipeline step.
    pub fn can_merge_with(&self, later: &FilterRepresentation) -> bool {
        match (&self.params, &later.params) {
            (FilterParams::Geometry(a), FilterParams::Geometry(b)) => a.can_merge_with(b),
            _ => false,
        }
    }

    // ========== Parameters ==========

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Slider value for `Basic` payloads, clamped into the declared range.
    pub fn value(&self) -> i32 {
        match self.params {
            FilterParams::Basic { value, minimum, maximum } => value.clamp(minimum, maximum),
            _ => 0,
        }
    }

    pub fn set_value(&mut self, new_value: i32) {
        if let FilterParams::Basic {
            ref mut value,
            minimum,
            maximum,
        } = self.params
        {
            *value = new_value.clamp(minimum, maximum);
        }
    }

    pub fn geometry_data(&self) -> Option<&GeometryData> {
        match &self.params {
            FilterParams::Geometry(data) => Some(data),
            _ => None,
        }
    }

    pub fn set_geometry_data(&mut self, data: GeometryData) {
        if let FilterParams::Geometry(ref mut current) = self.params {
            *current = data;
        }
    }

    /// Copy only the parameter values from a same-typed representation,
    /// leaving identity and display metadata untouched. Used when the
    /// user edits an existing step rather than inserting a new one.
    pub fn use_parameters_from(&mut self, other: &FilterRepresentation) {
        if self.same(other) {
            self.params = other.params;
        }
    }

    // ========== Persistence ==========

    /// Ordered key/value external form. The first pair is always the
    /// `"Name"` tag identifying the filter kind.
    pub fn serialize_representation(&self) -> Vec<(String, String)> {
        let mut kv = vec![(NAME_TAG.to_string(), self.serialization_name.clone())];
        match &self.params {
            FilterParams::None => {}
            FilterParams::Basic { value, minimum, maximum } => {
                kv.push(("Value".to_string(), value.to_string()));
                kv.push(("Min".to_string(), minimum.to_string()));
                kv.push(("Max".to_string(), maximum.to_string()));
            }
            FilterParams::WhiteBalance { temperature, tint } => {
                kv.push(("Temperature".to_string(), temperature.to_string()));
                kv.push(("Tint".to_string(), tint.to_string()));
            }
            FilterParams::Geometry(data) => {
                kv.push(("Rotation".to_string(), data.rotation.degrees().to_string()));
                kv.push(("Straighten".to_string(), data.straighten.to_string()));
                kv.push(("Mirror".to_string(), mirror_tag(data.mirror).to_string()));
                if let Some(crop) = data.crop {
                    kv.push(("CropLeft".to_string(), crop.x.to_string()));
                    kv.push(("CropTop".to_string(), crop.y.to_string()));
                    kv.push(("CropWidth".to_string(), crop.width.to_string()));
                    kv.push(("CropHeight".to_string(), crop.height.to_string()));
                }
            }
        }
        kv
    }

    /// Apply an external key/value list onto this representation.
    /// Unknown keys are ignored, malformed values are ignored, missing
    /// keys leave the defaults in place. This never fails.
    pub fn deserialize_representation(&mut self, kv: &[(String, String)]) {
        let mut crop_left = None;
        let mut crop_top = None;
        let mut crop_width = None;
        let mut crop_height = None;

        for (key, raw) in kv {
            match key.as_str() {
                NAME_TAG => {}
                "Value" => {
                    if let Ok(v) = raw.parse() {
                        self.set_value(v);
                    }
                }
                "Min" | "Max" => {
                    // Range is part of the filter's identity, not state;
                    // stored for readability, never read back.
                }
                "Temperature" => {
                    if let (FilterParams::WhiteBalance { temperature, .. }, Ok(v)) =
                        (&mut self.params, raw.parse::<i32>())
                    {
                        *temperature = v.clamp(-100, 100);
                    }
                }
                "Tint" => {
                    if let (FilterParams::WhiteBalance { tint, .. }, Ok(v)) =
                        (&mut self.params, raw.parse::<i32>())
                    {
                        *tint = v.clamp(-100, 100);
                    }
                }
                "Rotation" => {
                    if let (FilterParams::Geometry(data), Ok(deg)) =
                        (&mut self.params, raw.parse::<i32>())
                    {
                        data.rotation = Rotation::from_degrees(deg);
                    }
                }
                "Straighten" => {
                    if let (FilterParams::Geometry(data), Ok(deg)) =
                        (&mut self.params, raw.parse::<f32>())
                    {
                        data.straighten = deg.clamp(-MAX_STRAIGHTEN, MAX_STRAIGHTEN);
                    }
                }
                "Mirror" => {
                    if let FilterParams::Geometry(data) = &mut self.params {
                        if let Some(mirror) = mirror_from_tag(raw) {
                            data.mirror = mirror;
                        }
                    }
                }
                "CropLeft" => crop_left = raw.parse::<u32>().ok(),
                "CropTop" => crop_top = raw.parse::<u32>().ok(),
                "CropWidth" => crop_width = raw.parse::<u32>().ok(),
                "CropHeight" => crop_height = raw.parse::<u32>().ok(),
                other => {
                    log::debug!("ignoring unknown filter key '{}'", other);
                }
            }
        }

        if let (FilterParams::Geometry(data), Some(x), Some(y), Some(w), Some(h)) =
            (&mut self.params, crop_left, crop_top, crop_width, crop_height)
        {
            data.crop = Some(Rect::new(x, y, w, h));
        }
    }

    /// JSON object form of the key/value list.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (key, value) in self.serialize_representation() {
            object.insert(key, serde_json::Value::String(value));
        }
        serde_json::Value::Object(object)
    }

    /// Rebuild a representation from its JSON object form. Returns
    /// `None` for objects without a known `"Name"` tag; every other
    /// irregularity degrades to defaults.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let object = value.as_object()?;
        let name = object.get(NAME_TAG)?.as_str()?;
        let mut rep = Self::from_serialization_name(name)?;
        let kv: Vec<(String, String)> = object
            .iter()
            .map(|(k, v)| {
                let raw = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), raw)
            })
            .collect();
        rep.deserialize_representation(&kv);
        Some(rep)
    }
}

fn mirror_tag(mirror: Mirror) -> &'static str {
    match mirror {
        Mirror::None => "NONE",
        Mirror::Horizontal => "HORIZONTAL",
        Mirror::Vertical => "VERTICAL",
        Mirror::Both => "BOTH",
    }
}

fn mirror_from_tag(tag: &str) -> Option<Mirror> {
    match tag {
        "NONE" => Some(Mirror::None),
        "HORIZONTAL" => Some(Mirror::Horizontal),
        "VERTICAL" => Some(Mirror::Vertical),
        "BOTH" => Some(Mirror::Both),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_ignores_values_equals_does_not() {
        let a = FilterRepresentation::sharpen();
        let mut b = FilterRepresentation::sharpen();
        b.set_value(50);
        assert!(a.same(&b));
        assert_ne!(a, b);
        assert!(!a.same(&FilterRepresentation::contrast()));
    }

    #[test]
    fn set_value_clamps_to_declared_range() {
        let mut rep = FilterRepresentation::sharpen();
        rep.set_value(1000);
        assert_eq!(rep.value(), 100);
        rep.set_value(-1000);
        assert_eq!(rep.value(), -100);
    }

    #[test]
    fn use_parameters_from_requires_same_type() {
        let mut sharpen = FilterRepresentation::sharpen();
        let mut other = FilterRepresentation::sharpen();
        other.set_value(42);
        sharpen.use_parameters_from(&other);
        assert_eq!(sharpen.value(), 42);

        let contrast = FilterRepresentation::contrast();
        sharpen.use_parameters_from(&contrast);
        assert_eq!(sharpen.value(), 42);
    }

    #[test]
    fn kv_round_trip_is_equal() {
        let mut rep = FilterRepresentation::sharpen();
        rep.set_value(-30);
        let kv = rep.serialize_representation();
        assert_eq!(kv[0], ("Name".to_string(), "SHARPEN".to_string()));

        let mut restored = FilterRepresentation::sharpen();
        restored.deserialize_representation(&kv);
        assert_eq!(rep, restored);
    }

    #[test]
    fn geometry_json_round_trip() {
        let mut data = GeometryData::with_crop(Rect::new(4, 8, 15, 16));
        data.rotation = Rotation::Ninety;
        data.straighten = 12.5;
        data.mirror = Mirror::Horizontal;
        let rep = FilterRepresentation::geometry(data);

        let restored = FilterRepresentation::from_json(&rep.to_json()).unwrap();
        assert_eq!(rep, restored);
    }

    #[test]
    fn unknown_and_malformed_keys_are_ignored() {
        let mut rep = FilterRepresentation::sharpen();
        rep.deserialize_representation(&[
            ("Wavelength".to_string(), "9000".to_string()),
            ("Value".to_string(), "not-a-number".to_string()),
        ]);
        assert_eq!(rep, FilterRepresentation::sharpen());
    }

    #[test]
    fn missing_keys_leave_defaults() {
        let mut rep = FilterRepresentation::white_balance();
        rep.deserialize_representation(&[("Name".to_string(), "WBALANCE".to_string())]);
        assert_eq!(rep, FilterRepresentation::white_balance());
    }

    #[test]
    fn registry_rejects_unknown_names() {
        assert!(FilterRepresentation::from_serialization_name("SHARPEN").is_some());
        assert!(FilterRepresentation::from_serialization_name("FROBNICATE").is_none());
    }

    #[test]
    fn singleton_flags() {
        assert!(FilterRepresentation::geometry(GeometryData::default())
            .allows_single_instance_only());
        assert!(FilterRepresentation::white_balance().allows_single_instance_only());
        assert!(!FilterRepresentation::sharpen().allows_single_instance_only());
    }
}
