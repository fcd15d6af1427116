// src/models.rs
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::circuit::Canvas;
use crate::color::Color;

// Unit quad every circle instance is stretched over
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
}

impl Vertex2D {
    pub const QUAD_VERTICES: [Self; 4] = [
        Vertex2D { position: [-0.5, -0.5] },
        Vertex2D { position: [ 0.5, -0.5] },
        Vertex2D { position: [ 0.5,  0.5] },
        Vertex2D { position: [-0.5,  0.5] },
    ];

    // Two triangles. Screen space has y pointing down, so these wind clockwise
    // on screen; the circle pipeline does not cull.
    pub const QUAD_INDICES: [u16; 6] = [
        0, 1, 2,
        0, 2, 3,
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x2,
            }],
        }
    }
}

/// One filled disc or stroked ring, drawn instanced over [`Vertex2D::QUAD_VERTICES`].
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct CircleInstance {
    pub position: [f32; 2],
    pub radius: f32,
    /// 0 for a filled disc, otherwise the ring thickness.
    pub stroke_width: f32,
    pub color: [f32; 4], // linear RGBA
}

impl CircleInstance {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        1 => Float32x2,
        2 => Float32,
        3 => Float32,
        4 => Float32x4,
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LineVertex {
    pub position: [f32; 2],
    pub color: [f32; 4], // linear RGBA
}

impl LineVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x2,
        1 => Float32x4,
    ];

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// GPU-ready geometry for one frame. The animator draws into it through
/// [`Canvas`]; the renderer uploads `circles` and `lines` as they are.
#[derive(Debug)]
pub struct FrameBatch {
    pub circles: Vec<CircleInstance>,
    pub lines: Vec<LineVertex>,
    /// Multiplies the alpha of everything drawn. Applied per primitive, so
    /// overlapping rings and edges come out brighter than one faded layer.
    pub opacity: f32,
}

impl FrameBatch {
    pub fn new(opacity: f32) -> Self {
        Self { circles: Vec::new(), lines: Vec::new(), opacity }
    }

    fn linear(&self, color: Color) -> [f32; 4] {
        color.fade(self.opacity).into_linear_rgba()
    }
}

impl Canvas for FrameBatch {
    fn clear(&mut self) {
        self.circles.clear();
        self.lines.clear();
    }

    fn fill_circle(&mut self, center: Vec2, radius: f32, color: Color) {
        if radius <= 0.0 {
            return;
        }
        self.circles.push(CircleInstance {
            position: center.into(),
            radius,
            stroke_width: 0.0,
            color: self.linear(color),
        });
    }

    fn stroke_circle(&mut self, center: Vec2, radius: f32, width: f32, color: Color) {
        if radius <= 0.0 || width <= 0.0 {
            return;
        }
        self.circles.push(CircleInstance {
            position: center.into(),
            radius,
            stroke_width: width,
            color: self.linear(color),
        });
    }

    fn line(&mut self, from: Vec2, to: Vec2, color: Color) {
        // 避免长度为零的线段
        if from.distance_squared(to) < f32::EPSILON {
            return;
        }
        let color = self.linear(color);
        self.lines.push(LineVertex { position: from.into(), color });
        self.lines.push(LineVertex { position: to.into(), color });
    }
}
