// THEORY:
// A `Blob` is what the scan hands back for one connected region: the boundary
// pixels it discovered, in discovery order, plus a running bounding box.
//
// Key architectural principles:
// 1.  **Boundary, Not Contour**: The vertices are an unordered cloud of edge points.
//     They are not sorted around the shape and do not form a polygon.
// 2.  **Normalized Space**: Every vertex is divided by the dimensions of the image
//     the blob came from, so geometry is in `[0, 1]²` regardless of resolution.
// 3.  **Pseudo-Area**: `area` is the bounding-box area, not pixel coverage. Filters
//     built on it are cheap and scale-free.
// 4.  **Owned Output**: Once delivered, a blob belongs to the caller. The detector
//     keeps no reference to it.

/// An immutable point in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeVertex {
    pub x: f32,
    pub y: f32,
}

impl EdgeVertex {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The point halfway between `self` and `other`.
    pub fn midpoint(self, other: EdgeVertex) -> EdgeVertex {
        EdgeVertex::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl From<(f32, f32)> for EdgeVertex {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

/// The boundary points found for one connected region.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    x_min: f32,
    x_max: f32,
    y_min: f32,
    y_max: f32,
    edge_vertices: Vec<EdgeVertex>,
}

impl Default for Blob {
    fn default() -> Self {
        Self {
            x_min: f32::MAX,
            x_max: f32::MIN,
            y_min: f32::MAX,
            y_max: f32::MIN,
            edge_vertices: Vec::new(),
        }
    }
}

impl Blob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge_vertex(&mut self, vertex: EdgeVertex) {
        self.x_min = self.x_min.min(vertex.x);
        self.x_max = self.x_max.max(vertex.x);
        self.y_min = self.y_min.min(vertex.y);
        self.y_max = self.y_max.max(vertex.y);
        self.edge_vertices.push(vertex);
    }

    pub fn edge_count(&self) -> usize {
        self.edge_vertices.len()
    }

    /// The vertex at `index`, wrapping around past the end. `None` only for an empty blob.
    pub fn edge_vertex(&self, index: usize) -> Option<EdgeVertex> {
        if self.edge_vertices.is_empty() {
            return None;
        }
        Some(self.edge_vertices[index % self.edge_vertices.len()])
    }

    /// Vertices in discovery order.
    pub fn edge_vertices(&self) -> &[EdgeVertex] {
        &self.edge_vertices
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Bounding-box area in normalized units, i.e. a fraction of the image area.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Midpoint of the bounding box.
    pub fn center(&self) -> EdgeVertex {
        EdgeVertex::new((self.x_max + self.x_min) / 2.0, (self.y_max + self.y_min) / 2.0)
    }

    /// Top-left and bottom-right corners of the bounding box.
    pub fn bounding_box(&self) -> (EdgeVertex, EdgeVertex) {
        (
            EdgeVertex::new(self.x_min, self.y_min),
            EdgeVertex::new(self.x_max, self.y_max),
        )
    }
}

impl Extend<EdgeVertex> for Blob {
    fn extend<I: IntoIterator<Item = EdgeVertex>>(&mut self, vertices: I) {
        for vertex in vertices {
            self.add_edge_vertex(vertex);
        }
    }
}

impl FromIterator<EdgeVertex> for Blob {
    fn from_iter<I: IntoIterator<Item = EdgeVertex>>(vertices: I) -> Self {
        let mut blob = Blob::new();
        blob.extend(vertices);
        blob
    }
}
