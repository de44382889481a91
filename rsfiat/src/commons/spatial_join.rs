use geo::{Centroid, Geometry, Intersects, Point};
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::collect::vector::VectorLayer;
use crate::geo_core::BoundingBox;

type IndexedBox = GeomWithData<Rectangle<[f64; 2]>, usize>;
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// R-tree over the bounding boxes of a layer's features, refined with an
/// exact intersection test
pub struct FeatureIndex<'a> {
    layer: &'a VectorLayer,
    tree: RTree<IndexedBox>,
}

impl<'a> FeatureIndex<'a> {
    pub fn new(layer: &'a VectorLayer) -> Self {
        let boxes = layer
            .features
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| {
                BoundingBox::of(&f.geometry).map(|b| {
                    GeomWithData::new(
                        Rectangle::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]),
                        idx,
                    )
                })
            })
            .collect();
        FeatureIndex {
            layer,
            tree: RTree::bulk_load(boxes),
        }
    }

    /// Indices of the features intersecting `geometry`, in layer order
    pub fn intersecting(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let Some(b) = BoundingBox::of(geometry) else {
            return Vec::new();
        };
        let envelope = AABB::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|item| item.data)
            .filter(|idx| self.layer.features[*idx].geometry.intersects(geometry))
            .collect();
        hits.sort_unstable();
        hits
    }

    /// First feature (in layer order) that contains the centroid of `geometry`
    pub fn first_at_centroid(&self, geometry: &Geometry<f64>) -> Option<usize> {
        let centroid = geometry.centroid()?;
        self.intersecting(&Geometry::Point(centroid)).into_iter().next()
    }
}

/// R-tree over point features (centroids for other geometry types)
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(layer: &VectorLayer) -> Self {
        let points = layer
            .features
            .iter()
            .enumerate()
            .filter_map(|(idx, f)| {
                f.geometry
                    .centroid()
                    .map(|p| GeomWithData::new([p.x(), p.y()], idx))
            })
            .collect();
        PointIndex {
            tree: RTree::bulk_load(points),
        }
    }

    /// Nearest feature within `max_dist` (CRS units)
    pub fn nearest_within(&self, point: Point<f64>, max_dist: f64) -> Option<usize> {
        let query = [point.x(), point.y()];
        self.tree
            .nearest_neighbor(&query)
            .filter(|item| {
                let dx = item.geom()[0] - query[0];
                let dy = item.geom()[1] - query[1];
                dx * dx + dy * dy <= max_dist * max_dist
            })
            .map(|item| item.data)
    }
}
