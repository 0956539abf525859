/// Running bounding box over everything written to the graph.
///
/// Bounds are widened on every coordinate write and never shrink: removing
/// or moving a node does not re-derive them. Callers that need exact bounds
/// after such edits must recompute by scanning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox {
    /// Smallest latitude seen, in degrees.
    pub min_lat: f64,
    /// Largest latitude seen, in degrees.
    pub max_lat: f64,
    /// Smallest longitude seen, in degrees.
    pub min_lon: f64,
    /// Largest longitude seen, in degrees.
    pub max_lon: f64,
    /// Smallest elevation seen, in meters (3D graphs only).
    pub min_ele: f64,
    /// Largest elevation seen, in meters (3D graphs only).
    pub max_ele: f64,
}

impl BBox {
    /// An inverted box that any real coordinate will tighten.
    pub fn inverse() -> Self {
        Self {
            min_lat: f64::MAX,
            max_lat: -f64::MAX,
            min_lon: f64::MAX,
            max_lon: -f64::MAX,
            min_ele: f64::MAX,
            max_ele: -f64::MAX,
        }
    }

    /// Widens the box to include a coordinate.
    pub fn update(&mut self, lat: f64, lon: f64) {
        if lat < self.min_lat {
            self.min_lat = lat;
        }
        if lat > self.max_lat {
            self.max_lat = lat;
        }
        if lon < self.min_lon {
            self.min_lon = lon;
        }
        if lon > self.max_lon {
            self.max_lon = lon;
        }
    }

    /// Widens the elevation range.
    pub fn update_ele(&mut self, ele: f64) {
        if ele < self.min_ele {
            self.min_ele = ele;
        }
        if ele > self.max_ele {
            self.max_ele = ele;
        }
    }

    /// Whether any coordinate has been recorded yet.
    pub fn is_valid(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
    }

    /// Whether the box contains the coordinate.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverse_box_is_invalid_until_updated() {
        let mut bbox = BBox::inverse();
        assert!(!bbox.is_valid());
        bbox.update(48.1, 11.5);
        assert!(bbox.is_valid());
        assert_eq!(bbox.min_lat, 48.1);
        assert_eq!(bbox.max_lat, 48.1);
    }

    #[test]
    fn bounds_only_widen() {
        let mut bbox = BBox::inverse();
        bbox.update(10.0, 20.0);
        bbox.update(-5.0, 25.0);
        bbox.update(0.0, 22.0);
        assert_eq!(bbox.min_lat, -5.0);
        assert_eq!(bbox.max_lat, 10.0);
        assert_eq!(bbox.min_lon, 20.0);
        assert_eq!(bbox.max_lon, 25.0);
        assert!(bbox.contains(0.0, 22.0));
        assert!(!bbox.contains(11.0, 22.0));
    }
}
