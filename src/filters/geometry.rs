/// Geometry state for the crop/rotate/straighten/mirror filter.
///
/// A `GeometryData` describes the whole geometric edit as one value,
/// applied in a fixed order: crop (in input coordinates), then 90-degree
/// rotation, then mirror, then straighten. Consecutive geometry edits can
/// usually be collapsed into one value; `can_merge_with` reports whether
/// the composition is exact, and `ImagePreset` only merges when it is.
use cgmath::Rotation as _;
use cgmath::{Basis2, Deg, Rad, Rotation2, Vector2};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersection of two rects; `None` when they do not overlap.
    /// Edges are computed in u64 so coordinates near `u32::MAX`, which
    /// deserialization accepts, cannot overflow.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x) as u64;
        let y0 = self.y.max(other.y) as u64;
        let x1 = (self.x as u64 + self.width as u64).min(other.x as u64 + other.width as u64);
        let y1 = (self.y as u64 + self.height as u64).min(other.y as u64 + other.height as u64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rotation in quarter turns, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Zero,
    Ninety,
    OneEighty,
    TwoSeventy,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Ninety,
            180 => Rotation::OneEighty,
            270 => Rotation::TwoSeventy,
            _ => Rotation::Zero,
        }
    }

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Zero => 0,
            Rotation::Ninety => 90,
            Rotation::OneEighty => 180,
            Rotation::TwoSeventy => 270,
        }
    }

    fn quarters(self) -> i32 {
        self.degrees() / 90
    }

    fn from_quarters(q: i32) -> Self {
        Self::from_degrees(q.rem_euclid(4) * 90)
    }

    pub fn inverse(self) -> Self {
        Self::from_quarters(-self.quarters())
    }

    /// True when the rotation swaps width and height.
    pub fn swaps_axes(self) -> bool {
        matches!(self, Rotation::Ninety | Rotation::TwoSeventy)
    }

    /// Map a rect through this rotation. `(w, h)` are the dimensions of
    /// the space `rect` lives in, before rotating.
    pub fn map_rect(self, rect: Rect, w: u32, h: u32) -> Rect {
        match self {
            Rotation::Zero => rect,
            // (x, y) -> (h - 1 - y, x): top-left of the rotated rect
            Rotation::Ninety => Rect::new(
                h.saturating_sub(rect.y).saturating_sub(rect.height),
                rect.x,
                rect.height,
                rect.width,
            ),
            Rotation::OneEighty => Rect::new(
                w.saturating_sub(rect.x).saturating_sub(rect.width),
                h.saturating_sub(rect.y).saturating_sub(rect.height),
                rect.width,
                rect.height,
            ),
            Rotation::TwoSeventy => Rect::new(
                rect.y,
                w.saturating_sub(rect.x).saturating_sub(rect.width),
                rect.height,
                rect.width,
            ),
        }
    }
}

/// Mirror applied after the 90-degree rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Mirror {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl Mirror {
    fn flips(self) -> (bool, bool) {
        match self {
            Mirror::None => (false, false),
            Mirror::Horizontal => (true, false),
            Mirror::Vertical => (false, true),
            Mirror::Both => (true, true),
        }
    }

    fn from_flips(h: bool, v: bool) -> Self {
        match (h, v) {
            (false, false) => Mirror::None,
            (true, false) => Mirror::Horizontal,
            (false, true) => Mirror::Vertical,
            (true, true) => Mirror::Both,
        }
    }

    /// Map a rect through this mirror within a `(w, h)` space.
    /// Mirrors are their own inverse. A rect reaching past the space
    /// clamps to its edge; a later intersection trims it.
    pub fn map_rect(self, rect: Rect, w: u32, h: u32) -> Rect {
        let (fh, fv) = self.flips();
        let x = if fh {
            w.saturating_sub(rect.x).saturating_sub(rect.width)
        } else {
            rect.x
        };
        let y = if fv {
            h.saturating_sub(rect.y).saturating_sub(rect.height)
        } else {
            rect.y
        };
        Rect::new(x, y, rect.width, rect.height)
    }
}

/// Maximum straighten angle in degrees, either direction.
pub const MAX_STRAIGHTEN: f32 = 45.0;

/// One combined geometric edit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeometryData {
    /// Crop rect in the coordinates of this filter's input.
    pub crop: Option<Rect>,
    /// Quarter-turn rotation, applied after the crop.
    pub rotation: Rotation,
    /// Mirror, applied after the rotation.
    pub mirror: Mirror,
    /// Fine rotation in degrees, applied last. The output is cropped to
    /// the largest axis-aligned rect inscribed in the rotated bounds, so
    /// no transparent wedges ever reach the next pipeline stage.
    pub straighten: f32,
}

impl GeometryData {
    pub fn with_crop(crop: Rect) -> Self {
        Self {
            crop: Some(crop),
            ..Self::default()
        }
    }

    pub fn with_rotation(rotation: Rotation) -> Self {
        Self {
            rotation,
            ..Self::default()
        }
    }

    pub fn with_mirror(mirror: Mirror) -> Self {
        Self {
            mirror,
            ..Self::default()
        }
    }

    pub fn with_straighten(degrees: f32) -> Self {
        Self {
            straighten: degrees.clamp(-MAX_STRAIGHTEN, MAX_STRAIGHTEN),
            ..Self::default()
        }
    }

    pub fn is_identity(&self) -> bool {
        self.crop.is_none()
            && self.rotation == Rotation::Zero
            && self.mirror == Mirror::None
            && self.straighten == 0.0
    }

    fn orientation_is_identity(&self) -> bool {
        self.rotation == Rotation::Zero && self.mirror == Mirror::None
    }

    /// Whether composing `later` onto `self` is exact. Merging is refused
    /// when a coordinate remap would need information we do not have
    /// (an un-cropped input of unknown size under a non-trivial
    /// orientation) or when the later edit cannot slide past an existing
    /// straighten.
    pub fn can_merge_with(&self, later: &GeometryData) -> bool {
        if self.straighten != 0.0 {
            // The fine rotation is already this edit's last step. Quarter
            // turns and the double flip (a half turn) commute with it; a
            // single flip conjugates it to its negative, and a crop or a
            // second straighten would need the resampled intermediate.
            let (fh, fv) = later.mirror.flips();
            return later.crop.is_none() && !(fh ^ fv) && later.straighten == 0.0;
        }
        if later.crop.is_none() {
            return true;
        }
        self.crop.is_some() || self.orientation_is_identity()
    }

    /// Collapse `later` onto `self` so that applying the merged value
    /// equals applying `self` then `later`. Caller must have checked
    /// `can_merge_with`.
    pub fn merge(&mut self, later: &GeometryData) {
        if let Some(c2) = later.crop {
            // Map the later crop back through our orientation into our
            // input coordinates, then under our own crop offset.
            let mapped = match self.crop {
                Some(c1) => {
                    let (mw, mh) = if self.rotation.swaps_axes() {
                        (c1.height, c1.width)
                    } else {
                        (c1.width, c1.height)
                    };
                    let mid = self.mirror.map_rect(c2, mw, mh);
                    let pre = self.rotation.inverse().map_rect(mid, mw, mh);
                    Rect::new(
                        c1.x.saturating_add(pre.x),
                        c1.y.saturating_add(pre.y),
                        pre.width,
                        pre.height,
                    )
                }
                // Orientation is identity here (can_merge_with), so the
                // later crop is already in our input coordinates.
                None => c2,
            };
            self.crop = match self.crop {
                Some(c1) => c1.intersect(&mapped),
                None => Some(mapped),
            };
        }

        // Dihedral composition of (rotation, mirror) pairs. A mirror in
        // the first edit reverses the sense of the second edit's rotation.
        let (f1h, f1v) = self.mirror.flips();
        let flipped_once = f1h ^ f1v;
        let q2 = if flipped_once {
            -later.rotation.quarters()
        } else {
            later.rotation.quarters()
        };
        self.rotation = Rotation::from_quarters(self.rotation.quarters() + q2);
        let (f2h, f2v) = later.mirror.flips();
        self.mirror = Mirror::from_flips(f1h ^ f2h, f1v ^ f2v);

        self.straighten =
            (self.straighten + later.straighten).clamp(-MAX_STRAIGHTEN, MAX_STRAIGHTEN);
    }

    /// Map input bounds through this transform. `width`/`height` of the
    /// result are the output dimensions and are authoritative; `x`/`y`
    /// are the crop origin in input coordinates and are not remapped
    /// through the rotation or mirror.
    pub fn apply_to_bounds(&self, width: u32, height: u32) -> Rect {
        let full = Rect::new(0, 0, width, height);
        let cropped = match self.crop {
            Some(c) => full.intersect(&c).unwrap_or(Rect::new(0, 0, 0, 0)),
            None => full,
        };
        if cropped.is_empty() {
            return cropped;
        }
        let (w, h) = if self.rotation.swaps_axes() {
            (cropped.height, cropped.width)
        } else {
            (cropped.width, cropped.height)
        };
        if self.straighten == 0.0 {
            return Rect::new(cropped.x, cropped.y, w, h);
        }
        let (iw, ih) = inscribed_rect(w, h, self.straighten);
        Rect::new(cropped.x, cropped.y, iw, ih)
    }

    /// Output dimensions for an input of the given size.
    pub fn output_size(&self, width: u32, height: u32) -> (u32, u32) {
        let bounds = self.apply_to_bounds(width, height);
        (bounds.width, bounds.height)
    }
}

/// Largest axis-aligned rectangle that fits entirely inside a `w` x `h`
/// rect rotated by `degrees`, so straightening never shows blank corners.
pub fn inscribed_rect(w: u32, h: u32, degrees: f32) -> (u32, u32) {
    if w == 0 || h == 0 || degrees == 0.0 {
        return (w, h);
    }
    let rot: Basis2<f32> = Rotation2::from_angle(Rad::from(Deg(degrees)));
    // Rotate the half-diagonal corners to find sin/cos magnitudes without
    // worrying about the angle's sign.
    let ex = rot.rotate_vector(Vector2::new(1.0, 0.0));
    let (cos_a, sin_a) = (ex.x.abs(), ex.y.abs());

    let (wf, hf) = (w as f32, h as f32);
    let (long, short) = if wf >= hf { (wf, hf) } else { (hf, wf) };
    let (iw, ih) = if short <= 2.0 * sin_a * cos_a * long {
        // Thin input: two inscribed corners touch the same long side.
        let half = 0.5 * short;
        if wf >= hf {
            (half / sin_a, half / cos_a)
        } else {
            (half / cos_a, half / sin_a)
        }
    } else {
        let cos_2a = cos_a * cos_a - sin_a * sin_a;
        ((wf * cos_a - hf * sin_a) / cos_2a, (hf * cos_a - wf * sin_a) / cos_2a)
    };
    (iw.floor().max(1.0) as u32, ih.floor().max(1.0) as u32)
}
