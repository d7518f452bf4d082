//! Vector paths tessellated into batchable triangle meshes via lyon.

use glam::Affine2;
use lyon::math::point;
use lyon::path::Path as LyonPath;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, StrokeOptions,
    StrokeTessellator, StrokeVertex, VertexBuffers,
};

use crate::resources::texture::BaseTexture;
use crate::scene::{premultiply_tint, BatchElement};

/// Curve flattening tolerance in local units.
pub const DEFAULT_TOLERANCE: f32 = 0.01;

/// An indexed triangle list in local space.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    /// Vertex positions.
    pub vertices: Vec<[f32; 2]>,
    /// Triangle list indices.
    pub indices: Vec<u16>,
}

impl Mesh {
    /// Bounds of the vertices along `axis` (0 = X, 1 = Y) as `[min, max]`,
    /// `[0.0, 0.0]` when empty.
    pub fn bounds(&self, axis: usize) -> [f32; 2] {
        vertex_bounds(&self.vertices, axis)
    }

    /// Place the mesh in the world as a batch element.
    ///
    /// `texture` is stretched over the mesh's bounding box; pass a 1×1 white
    /// texture for a flat fill.
    pub fn to_batch_element(
        &self,
        texture: BaseTexture,
        transform: &Affine2,
        rgb: [f32; 3],
        alpha: f32,
    ) -> BatchElement {
        let [min_x, max_x] = self.bounds(0);
        let [min_y, max_y] = self.bounds(1);
        let span = |min: f32, max: f32| if max > min { max - min } else { 1.0 };
        let (width, height) = (span(min_x, max_x), span(min_y, max_y));
        BatchElement {
            vertices: self
                .vertices
                .iter()
                .map(|&v| transform.transform_point2(v.into()).to_array())
                .collect(),
            uvs: self
                .vertices
                .iter()
                .map(|&[x, y]| [(x - min_x) / width, (y - min_y) / height])
                .collect(),
            indices: self.indices.clone(),
            texture,
            tint: premultiply_tint(rgb, alpha),
            blend_mode: Default::default(),
        }
    }
}

/// Builds a path from drawing commands, then fills or strokes it.
pub struct PathBuilder {
    builder: lyon::path::path::Builder,
    open: bool,
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PathBuilder {
    /// An empty path.
    pub fn new() -> Self {
        Self {
            builder: LyonPath::builder(),
            open: false,
        }
    }

    /// Start a new sub-path at (`x`, `y`).
    pub fn move_to(&mut self, x: f32, y: f32) {
        if self.open {
            self.builder.end(false);
        }
        self.builder.begin(point(x, y));
        self.open = true;
    }

    /// Straight segment to (`x`, `y`).
    pub fn line_to(&mut self, x: f32, y: f32) {
        self.ensure_open(x, y);
        self.builder.line_to(point(x, y));
    }

    /// Quadratic curve through control point (`x1`, `y1`).
    pub fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.ensure_open(x1, y1);
        self.builder.quadratic_bezier_to(point(x1, y1), point(x, y));
    }

    /// Cubic curve through two control points.
    pub fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.ensure_open(x1, y1);
        self.builder
            .cubic_bezier_to(point(x1, y1), point(x2, y2), point(x, y));
    }

    /// Close the current sub-path.
    pub fn close(&mut self) {
        if self.open {
            self.builder.close();
            self.open = false;
        }
    }

    /// Axis-aligned rectangle as its own sub-path.
    pub fn rect(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.move_to(x, y);
        self.line_to(x + width, y);
        self.line_to(x + width, y + height);
        self.line_to(x, y + height);
        self.close();
    }

    fn ensure_open(&mut self, x: f32, y: f32) {
        if !self.open {
            self.move_to(x, y);
        }
    }

    fn build(mut self) -> LyonPath {
        if self.open {
            self.builder.end(false);
        }
        self.builder.build()
    }

    /// Tessellate the interior with the non-zero rule.
    pub fn fill(self, tolerance: f32) -> Option<Mesh> {
        tessellate_fill(&self.build(), tolerance)
    }

    /// Tessellate an outline `width` units wide.
    pub fn stroke(self, width: f32, tolerance: f32) -> Option<Mesh> {
        tessellate_stroke(&self.build(), width, tolerance)
    }
}

/// Tessellate the interior of a lyon path.
pub fn tessellate_fill(path: &LyonPath, tolerance: f32) -> Option<Mesh> {
    let mut geometry: VertexBuffers<[f32; 2], u16> = VertexBuffers::new();
    let result = FillTessellator::new().tessellate_path(
        path,
        &FillOptions::tolerance(tolerance).with_fill_rule(FillRule::NonZero),
        &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
            vertex.position().to_array()
        }),
    );
    finish(result.is_ok(), geometry)
}

/// Tessellate the outline of a lyon path.
pub fn tessellate_stroke(path: &LyonPath, width: f32, tolerance: f32) -> Option<Mesh> {
    let mut geometry: VertexBuffers<[f32; 2], u16> = VertexBuffers::new();
    let result = StrokeTessellator::new().tessellate_path(
        path,
        &StrokeOptions::tolerance(tolerance).with_line_width(width),
        &mut BuffersBuilder::new(&mut geometry, |vertex: StrokeVertex| {
            vertex.position().to_array()
        }),
    );
    finish(result.is_ok(), geometry)
}

fn finish(ok: bool, geometry: VertexBuffers<[f32; 2], u16>) -> Option<Mesh> {
    if ok && !geometry.vertices.is_empty() {
        Some(Mesh {
            vertices: geometry.vertices,
            indices: geometry.indices,
        })
    } else {
        None
    }
}

fn vertex_bounds(vertices: &[[f32; 2]], axis: usize) -> [f32; 2] {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for v in vertices {
        min = min.min(v[axis]);
        max = max.max(v[axis]);
    }
    if max < min {
        [0.0, 0.0]
    } else {
        [min, max]
    }
}
